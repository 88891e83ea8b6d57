use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{Attempt, NotificationStatus, RetryRecord};
use crate::db::repository::NotificationRepository;
use crate::error::AppResult;
use crate::providers::Provider;
use crate::queue::RetryEnqueuer;

/// Which call path invoked the engine. Only the initial call path auto-enqueues
/// an `attempt=1` retry record on total failure; a retry round's re-enqueue
/// (with the incremented attempt counter and the cap check) is entirely the
/// retry worker's own responsibility, so the engine must not also enqueue
/// behind its back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Initial,
    Retry,
}

/// Drives a notification through its ordered channel list, recording every
/// attempt, and terminates on first success or total failure.
///
/// On total failure during an `Initial` call this also enqueues the
/// `attempt=1` retry record. A `Retry` call never enqueues on its own.
pub async fn deliver(
    pool: &SqlitePool,
    registry: &HashMap<&'static str, Arc<dyn Provider>>,
    queue: &dyn RetryEnqueuer,
    notification_id: Uuid,
    recipient: &str,
    message: &str,
    channels: &[String],
    mode: DeliveryMode,
) -> AppResult<NotificationStatus> {
    for (idx, channel) in channels.iter().enumerate() {
        let is_last = idx == channels.len() - 1;

        let outcome = match registry.get(channel.as_str()) {
            None => Err(format!("no provider for {channel}")),
            Some(provider) => provider
                .send(recipient, message)
                .await
                .map_err(|e| e.0),
        };

        match outcome {
            Ok(()) => {
                let attempt = Attempt {
                    channel: channel.clone(),
                    timestamp: Utc::now(),
                    success: true,
                    error_message: None,
                };
                NotificationRepository::append_attempt_and_transition(
                    pool,
                    notification_id,
                    &attempt,
                    Some(NotificationStatus::Sent),
                    Some(channel),
                )
                .await?;
                return Ok(NotificationStatus::Sent);
            }
            Err(cause) => {
                let attempt = Attempt {
                    channel: channel.clone(),
                    timestamp: Utc::now(),
                    success: false,
                    error_message: Some(cause),
                };
                let new_status = is_last.then_some(NotificationStatus::Failed);
                NotificationRepository::append_attempt_and_transition(
                    pool,
                    notification_id,
                    &attempt,
                    new_status,
                    None,
                )
                .await?;
            }
        }
    }

    if mode == DeliveryMode::Initial {
        let retry_record = RetryRecord {
            notification_id,
            channels: channels.to_vec(),
            attempt: 1,
        };
        if let Err(e) = queue.enqueue(&retry_record).await {
            tracing::error!(notification_id = %notification_id, error = ?e, "failed to enqueue retry record");
        }
    }

    Ok(NotificationStatus::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CreateNotificationRequest;
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::sync::Mutex;

    struct AlwaysFail(&'static str);
    struct AlwaysSucceed(&'static str);

    #[async_trait]
    impl Provider for AlwaysFail {
        fn channel(&self) -> &'static str {
            self.0
        }
        async fn send(&self, _recipient: &str, _message: &str) -> Result<(), ProviderError> {
            Err(ProviderError("boom".to_string()))
        }
    }

    #[async_trait]
    impl Provider for AlwaysSucceed {
        fn channel(&self) -> &'static str {
            self.0
        }
        async fn send(&self, _recipient: &str, _message: &str) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeQueue {
        enqueued: Mutex<Vec<RetryRecord>>,
    }

    #[async_trait]
    impl RetryEnqueuer for FakeQueue {
        async fn enqueue(&self, record: &RetryRecord) -> AppResult<()> {
            self.enqueued.lock().await.push(record.clone());
            Ok(())
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn happy_path_single_channel_succeeds_on_first_try() {
        let pool = test_pool().await;
        let mut registry: HashMap<&'static str, Arc<dyn Provider>> = HashMap::new();
        registry.insert("email", Arc::new(AlwaysSucceed("email")));
        let queue = FakeQueue::default();

        let notification = NotificationRepository::create(
            &pool,
            &CreateNotificationRequest {
                recipient: "a@b.c".to_string(),
                message: "hi".to_string(),
                channels: vec!["email".to_string()],
                metadata: None,
            },
        )
        .await
        .unwrap();

        let status = deliver(
            &pool,
            &registry,
            &queue,
            notification.id,
            &notification.recipient,
            &notification.message,
            &["email".to_string()],
            DeliveryMode::Initial,
        )
        .await
        .unwrap();

        assert_eq!(status, NotificationStatus::Sent);
        assert!(queue.enqueued.lock().await.is_empty());

        let reloaded = NotificationRepository::load(&pool, notification.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.channel_used.as_deref(), Some("email"));
        assert_eq!(reloaded.attempts.len(), 1);
        assert!(reloaded.attempts[0].success);
    }

    #[tokio::test]
    async fn fallback_succeeds_on_second_channel() {
        let pool = test_pool().await;
        let mut registry: HashMap<&'static str, Arc<dyn Provider>> = HashMap::new();
        registry.insert("email", Arc::new(AlwaysFail("email")));
        registry.insert("sms", Arc::new(AlwaysSucceed("sms")));
        let queue = FakeQueue::default();

        let notification = NotificationRepository::create(
            &pool,
            &CreateNotificationRequest {
                recipient: "a@b.c".to_string(),
                message: "hi".to_string(),
                channels: vec!["email".to_string(), "sms".to_string()],
                metadata: None,
            },
        )
        .await
        .unwrap();

        let status = deliver(
            &pool,
            &registry,
            &queue,
            notification.id,
            &notification.recipient,
            &notification.message,
            &["email".to_string(), "sms".to_string()],
            DeliveryMode::Initial,
        )
        .await
        .unwrap();

        assert_eq!(status, NotificationStatus::Sent);
        assert!(queue.enqueued.lock().await.is_empty());

        let reloaded = NotificationRepository::load(&pool, notification.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.channel_used.as_deref(), Some("sms"));
        assert_eq!(reloaded.attempts.len(), 2);
        assert!(!reloaded.attempts[0].success);
        assert!(reloaded.attempts[1].success);
    }

    #[tokio::test]
    async fn all_channels_failing_enqueues_one_retry_record() {
        let pool = test_pool().await;
        let mut registry: HashMap<&'static str, Arc<dyn Provider>> = HashMap::new();
        registry.insert("email", Arc::new(AlwaysFail("email")));
        registry.insert("sms", Arc::new(AlwaysFail("sms")));
        let queue = FakeQueue::default();

        let notification = NotificationRepository::create(
            &pool,
            &CreateNotificationRequest {
                recipient: "a@b.c".to_string(),
                message: "hi".to_string(),
                channels: vec!["email".to_string(), "sms".to_string()],
                metadata: None,
            },
        )
        .await
        .unwrap();

        let channels = vec!["email".to_string(), "sms".to_string()];
        let status = deliver(
            &pool,
            &registry,
            &queue,
            notification.id,
            &notification.recipient,
            &notification.message,
            &channels,
            DeliveryMode::Initial,
        )
        .await
        .unwrap();

        assert_eq!(status, NotificationStatus::Failed);
        let enqueued = queue.enqueued.lock().await;
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].attempt, 1);
        assert_eq!(enqueued[0].channels, channels);

        let reloaded = NotificationRepository::load(&pool, notification.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, NotificationStatus::Failed);
        assert_eq!(reloaded.attempts.len(), 2);
        assert!(reloaded.attempts.iter().all(|a| !a.success));
    }

    #[tokio::test]
    async fn missing_provider_records_failure_and_continues_cascade() {
        let pool = test_pool().await;
        let mut registry: HashMap<&'static str, Arc<dyn Provider>> = HashMap::new();
        registry.insert("sms", Arc::new(AlwaysSucceed("sms")));
        let queue = FakeQueue::default();

        let notification = NotificationRepository::create(
            &pool,
            &CreateNotificationRequest {
                recipient: "a@b.c".to_string(),
                message: "hi".to_string(),
                channels: vec!["carrier_pigeon".to_string(), "sms".to_string()],
                metadata: None,
            },
        )
        .await
        .unwrap();

        let status = deliver(
            &pool,
            &registry,
            &queue,
            notification.id,
            &notification.recipient,
            &notification.message,
            &["carrier_pigeon".to_string(), "sms".to_string()],
            DeliveryMode::Initial,
        )
        .await
        .unwrap();

        assert_eq!(status, NotificationStatus::Sent);
        let reloaded = NotificationRepository::load(&pool, notification.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.attempts[0].error_message.as_deref(), Some("no provider for carrier_pigeon"));
    }

    #[tokio::test]
    async fn retry_mode_does_not_auto_enqueue_on_total_failure() {
        let pool = test_pool().await;
        let mut registry: HashMap<&'static str, Arc<dyn Provider>> = HashMap::new();
        registry.insert("email", Arc::new(AlwaysFail("email")));
        let queue = FakeQueue::default();

        let notification = NotificationRepository::create(
            &pool,
            &CreateNotificationRequest {
                recipient: "a@b.c".to_string(),
                message: "hi".to_string(),
                channels: vec!["email".to_string()],
                metadata: None,
            },
        )
        .await
        .unwrap();

        let status = deliver(
            &pool,
            &registry,
            &queue,
            notification.id,
            &notification.recipient,
            &notification.message,
            &["email".to_string()],
            DeliveryMode::Retry,
        )
        .await
        .unwrap();

        assert_eq!(status, NotificationStatus::Failed);
        assert!(
            queue.enqueued.lock().await.is_empty(),
            "a retry-mode call must leave re-enqueuing entirely to the caller"
        );
    }
}
