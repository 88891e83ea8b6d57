use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{
    Attempt, AttemptRow, CreateNotificationRequest, Notification, NotificationRow,
    NotificationStatus,
};
use crate::error::{AppError, AppResult};

/// Repository for the notifications store: notifications and their attempt history.
///
/// `append_attempt_and_transition` is the one write path that matters for correctness:
/// it appends an attempt row and moves the notification's status in a single
/// transaction, so a crash between the two never leaves an attempt that doesn't
/// match the notification's final state.
pub struct NotificationRepository;

impl NotificationRepository {
    pub async fn create(
        pool: &SqlitePool,
        req: &CreateNotificationRequest,
    ) -> AppResult<Notification> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let metadata = req
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient, message, status, channel_used, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&req.recipient)
        .bind(&req.message)
        .bind(NotificationStatus::Pending.as_str())
        .bind(metadata)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::load(pool, id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("notification vanished after insert")))
    }

    pub async fn load(pool: &SqlitePool, id: Uuid) -> AppResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, recipient, message, status, channel_used, metadata, created_at, updated_at
            FROM notifications WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let attempt_rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT id, notification_id, channel, timestamp, success, error_message
            FROM notification_attempts WHERE notification_id = ? ORDER BY id ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(Some(row_to_notification(row, attempt_rows)?))
    }

    /// Append one attempt row and transition the notification's status, atomically.
    ///
    /// `new_status = None` leaves the status column untouched (used when a
    /// cascade round is still in progress and the caller will issue a final
    /// transition call after the last attempt).
    pub async fn append_attempt_and_transition(
        pool: &SqlitePool,
        notification_id: Uuid,
        attempt: &Attempt,
        new_status: Option<NotificationStatus>,
        channel_used: Option<&str>,
    ) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO notification_attempts (notification_id, channel, timestamp, success, error_message)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(notification_id.to_string())
        .bind(&attempt.channel)
        .bind(attempt.timestamp.naive_utc())
        .bind(attempt.success)
        .bind(&attempt.error_message)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        if let Some(status) = new_status {
            sqlx::query(
                r#"
                UPDATE notifications SET status = ?, channel_used = ?, updated_at = ?
                WHERE id = ? AND status != ?
                "#,
            )
            .bind(status.as_str())
            .bind(channel_used)
            .bind(now)
            .bind(notification_id.to_string())
            .bind(NotificationStatus::Sent.as_str())
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    /// Move a `failed` notification back to `pending` ahead of a retry round.
    ///
    /// Guarded against an already-`sent` row: a retry round that loaded the
    /// notification before a concurrent success committed must not downgrade it.
    pub async fn mark_pending(pool: &SqlitePool, notification_id: Uuid) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query("UPDATE notifications SET status = ?, updated_at = ? WHERE id = ? AND status != ?")
            .bind(NotificationStatus::Pending.as_str())
            .bind(now)
            .bind(notification_id.to_string())
            .bind(NotificationStatus::Sent.as_str())
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}

fn row_to_notification(row: NotificationRow, attempts: Vec<AttemptRow>) -> AppResult<Notification> {
    let id = Uuid::parse_str(&row.id).map_err(|e| AppError::Internal(e.into()))?;
    let status = row
        .status
        .parse::<NotificationStatus>()
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

    Ok(Notification {
        id,
        recipient: row.recipient,
        message: row.message,
        status,
        channel_used: row.channel_used,
        attempts: attempts.into_iter().map(Attempt::from).collect(),
        created_at: chrono::DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        updated_at: chrono::DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
    })
}
