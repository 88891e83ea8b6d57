use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateNotificationRequest, Notification};
use crate::db::repository::NotificationRepository;
use crate::delivery::{self, DeliveryMode};
use crate::error::{AppError, AppResult};
use crate::providers::Provider;
use crate::queue::RetryEnqueuer;
use crate::AppState;

/// Orchestrates the store and the delivery engine for the two request paths
/// the HTTP adapter exposes: create-and-send, and read-by-id.
pub struct NotificationService {
    pool: SqlitePool,
    registry: HashMap<&'static str, Arc<dyn Provider>>,
    queue: Arc<dyn RetryEnqueuer>,
}

impl NotificationService {
    pub fn new(
        pool: SqlitePool,
        registry: HashMap<&'static str, Arc<dyn Provider>>,
        queue: Arc<dyn RetryEnqueuer>,
    ) -> Self {
        Self {
            pool,
            registry,
            queue,
        }
    }

    /// Build a facade over shared application state, cloning the cheap handles
    /// (pool, provider registry, queue connection) it needs per request.
    pub fn for_state(state: &AppState) -> Self {
        Self::new(
            state.db.clone(),
            state.providers.clone(),
            Arc::new(state.queue.clone()),
        )
    }

    pub async fn create_and_send(&self, req: CreateNotificationRequest) -> AppResult<Notification> {
        let notification = NotificationRepository::create(&self.pool, &req).await?;

        tracing::info!(notification_id = %notification.id, "notification created");

        delivery::deliver(
            &self.pool,
            &self.registry,
            self.queue.as_ref(),
            notification.id,
            &notification.recipient,
            &notification.message,
            &req.channels,
            DeliveryMode::Initial,
        )
        .await?;

        self.get_by_id(notification.id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("notification vanished after delivery")))
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Notification>> {
        NotificationRepository::load(&self.pool, id).await
    }
}
