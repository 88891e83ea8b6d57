use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;

use crate::config::QueueConfig;
use crate::db::models::RetryRecord;
use crate::error::{AppError, AppResult};

/// One unacknowledged entry read off the retry stream.
pub struct QueueMessage {
    pub id: String,
    pub record: RetryRecord,
}

/// The delivery engine's view of the retry queue: append-only, fire-and-forget
/// from the caller's perspective. Split out as a trait so the delivery engine's
/// tests can swap in an in-process fake instead of dialing Redis.
#[async_trait]
pub trait RetryEnqueuer: Send + Sync {
    async fn enqueue(&self, record: &RetryRecord) -> AppResult<()>;
}

/// The retry worker's view of the queue: pull the next unacknowledged entry
/// and acknowledge it once processed. Split out for the same reason as
/// `RetryEnqueuer` — so the worker's state machine can be tested against an
/// in-process fake instead of a live Redis consumer group.
#[async_trait]
pub trait RetryReader: Send + Sync {
    async fn read_one(&self, consumer: &str) -> AppResult<Option<QueueMessage>>;
    async fn ack(&self, id: &str) -> AppResult<()>;
}

/// Durable retry queue backed by a Redis Stream and a consumer group.
///
/// Competing workers share the consumer group so each retry record is
/// delivered to exactly one live worker at a time; an un-acked entry becomes
/// eligible for redelivery to another consumer.
#[derive(Clone)]
pub struct RetryQueue {
    conn: ConnectionManager,
    config: QueueConfig,
}

impl RetryQueue {
    pub fn new(conn: ConnectionManager, config: QueueConfig) -> Self {
        Self { conn, config }
    }

    /// Create the consumer group if it doesn't already exist. Idempotent.
    pub async fn ensure_group(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(AppError::Queue(e)),
        }
    }
}

#[async_trait]
impl RetryEnqueuer for RetryQueue {
    /// Append a retry record to the stream.
    async fn enqueue(&self, record: &RetryRecord) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record).map_err(|e| AppError::Internal(e.into()))?;
        let _: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(AppError::Queue)?;
        Ok(())
    }
}

#[async_trait]
impl RetryReader for RetryQueue {
    /// Block for up to one second waiting for a single new entry.
    async fn read_one(&self, consumer: &str) -> AppResult<Option<QueueMessage>> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(&self.config.consumer_group, consumer)
            .count(1)
            .block(1000);

        let reply: StreamReadReply = conn
            .xread_options(&[self.config.stream_name.as_str()], &[">"], &opts)
            .await
            .map_err(AppError::Queue)?;

        for stream_key in reply.keys {
            for id_entry in stream_key.ids {
                let payload = id_entry
                    .map
                    .get("payload")
                    .ok_or_else(|| AppError::Internal(anyhow::anyhow!("retry entry missing payload field")))?;

                let payload_str = match payload {
                    redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
                    redis::Value::SimpleString(s) => s.clone(),
                    other => {
                        return Err(AppError::Internal(anyhow::anyhow!(
                            "unexpected payload value type: {other:?}"
                        )))
                    }
                };

                let record: RetryRecord =
                    serde_json::from_str(&payload_str).map_err(|e| AppError::Internal(e.into()))?;

                return Ok(Some(QueueMessage {
                    id: id_entry.id,
                    record,
                }));
            }
        }

        Ok(None)
    }

    async fn ack(&self, id: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(&self.config.stream_name, &self.config.consumer_group, &[id])
            .await
            .map_err(AppError::Queue)?;
        Ok(())
    }
}
