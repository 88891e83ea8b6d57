use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of a notification. Stored as its lower-case string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

/// Row as stored in the `notifications` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub recipient: String,
    pub message: String,
    pub status: String,
    pub channel_used: Option<String>,
    pub metadata: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Row as stored in the `notification_attempts` table.
#[derive(Debug, Clone, FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub notification_id: String,
    pub channel: String,
    pub timestamp: NaiveDateTime,
    pub success: bool,
    pub error_message: Option<String>,
}

/// A single delivery attempt, as surfaced over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub channel: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl From<AttemptRow> for Attempt {
    fn from(row: AttemptRow) -> Self {
        Attempt {
            channel: row.channel,
            timestamp: chrono::DateTime::from_naive_utc_and_offset(row.timestamp, Utc),
            success: row.success,
            error_message: row.error_message,
        }
    }
}

/// A notification and its full attempt history, as surfaced over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    pub message: String,
    pub status: NotificationStatus,
    pub channel_used: Option<String>,
    pub attempts: Vec<Attempt>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

/// Input to create a new notification; `channels` is the caller's requested
/// cascade order and is not itself persisted as a column.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient: String,
    pub message: String,
    pub channels: Vec<String>,
    pub metadata: Option<std::collections::HashMap<String, String>>,
}

/// A durable retry-queue record, as carried on the wire inside the `payload` field
/// of a Redis Stream entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub notification_id: Uuid,
    pub channels: Vec<String>,
    pub attempt: u32,
}
