pub mod health;
pub mod notifications;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1/notifications", notifications::router())
}
