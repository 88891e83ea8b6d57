use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::RetryConfig;
use crate::db::models::{NotificationStatus, RetryRecord};
use crate::db::repository::NotificationRepository;
use crate::delivery::{self, DeliveryMode};
use crate::providers::Provider;
use crate::queue::{RetryEnqueuer, RetryReader};
use crate::AppState;

/// Run the retry worker loop until the shutdown broadcast fires.
///
/// A `tokio::sync::broadcast::Receiver` is polled between blocking operations
/// so an in-flight message is allowed to finish before the task exits.
pub async fn run(
    state: std::sync::Arc<AppState>,
    consumer_id: String,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    if let Err(e) = state.queue.ensure_group().await {
        tracing::error!(error = ?e, "failed to create consumer group, retry worker exiting");
        return;
    }

    tracing::info!(consumer_id, "retry worker started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("retry worker shutting down");
                break;
            }
            result = state.queue.read_one(&consumer_id) => {
                match result {
                    Ok(Some(message)) => {
                        let outcome = process_message(
                            &state.db,
                            &state.config.retry,
                            &state.providers,
                            &state.queue,
                            &message.record,
                        )
                        .await;

                        if let Err(e) = outcome {
                            tracing::warn!(error = ?e, "retry processing failed, leaving message unacked");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                            continue;
                        }
                        if let Err(e) = state.queue.ack(&message.id).await {
                            tracing::warn!(error = ?e, "failed to ack retry message");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = ?e, "error reading from retry queue");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Run one retry round for `record`: backoff, reload, skip if already sent,
/// re-run the delivery engine in retry mode, and re-enqueue under the cap.
///
/// Takes its collaborators as plain references rather than `&AppState` so it
/// can run against an in-memory store and a fake queue in tests, without a
/// live Redis consumer group.
async fn process_message(
    db: &SqlitePool,
    retry_config: &RetryConfig,
    providers: &HashMap<&'static str, Arc<dyn Provider>>,
    queue: &dyn RetryEnqueuer,
    record: &RetryRecord,
) -> anyhow::Result<()> {
    let delay = backoff_delay(retry_config, record.attempt);
    tracing::info!(
        notification_id = %record.notification_id,
        attempt = record.attempt,
        delay_seconds = delay.as_secs_f64(),
        "processing retry"
    );
    tokio::time::sleep(delay).await;

    let Some(notification) = NotificationRepository::load(db, record.notification_id).await? else {
        tracing::warn!(notification_id = %record.notification_id, "notification not found for retry, dropping");
        return Ok(());
    };

    if notification.status == NotificationStatus::Sent {
        tracing::info!(notification_id = %record.notification_id, "already sent, skipping retry");
        return Ok(());
    }

    NotificationRepository::mark_pending(db, record.notification_id).await?;

    let status = delivery::deliver(
        db,
        providers,
        queue,
        record.notification_id,
        &notification.recipient,
        &notification.message,
        &record.channels,
        DeliveryMode::Retry,
    )
    .await?;

    if should_reenqueue(status, record.attempt, retry_config.max_attempts) {
        let next = RetryRecord {
            notification_id: record.notification_id,
            channels: record.channels.clone(),
            attempt: record.attempt + 1,
        };
        queue.enqueue(&next).await?;
        tracing::info!(notification_id = %record.notification_id, attempt = next.attempt, "re-enqueued retry");
    }

    Ok(())
}

/// Whether a retry round that just finished should be escalated into another one.
fn should_reenqueue(status: NotificationStatus, attempt: u32, max_attempts: u32) -> bool {
    status == NotificationStatus::Failed && attempt < max_attempts
}

fn backoff_delay(config: &RetryConfig, attempt: u32) -> std::time::Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let seconds = config.backoff_base.powi(exponent);
    std::time::Duration::from_secs_f64(seconds.max(0.0))
}
