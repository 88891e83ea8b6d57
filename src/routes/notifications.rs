use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::db::models::{CreateNotificationRequest, Notification};
use crate::error::{AppError, AppResult};
use crate::service::NotificationService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_notification))
        .route("/:id", get(get_notification))
}

fn validate(body: &CreateNotificationRequest) -> AppResult<()> {
    if body.recipient.is_empty() || body.recipient.chars().count() > 255 {
        return Err(AppError::Validation(
            "recipient must be 1..=255 characters".to_string(),
        ));
    }
    let message_len = body.message.chars().count();
    if message_len < 1 || message_len > 10_000 {
        return Err(AppError::Validation(
            "message must be 1..=10000 characters".to_string(),
        ));
    }
    if body.channels.is_empty() {
        return Err(AppError::Validation(
            "channels must contain at least one entry".to_string(),
        ));
    }
    Ok(())
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateNotificationRequest>,
) -> AppResult<(axum::http::StatusCode, Json<Notification>)> {
    validate(&body)?;

    let service = NotificationService::for_state(&state);
    let notification = service.create_and_send(body).await?;

    Ok((axum::http::StatusCode::CREATED, Json(notification)))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Notification>> {
    let service = NotificationService::for_state(&state);
    let notification = service
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

    Ok(Json(notification))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> CreateNotificationRequest {
        CreateNotificationRequest {
            recipient: "a@b.c".to_string(),
            message: "hi".to_string(),
            channels: vec!["email".to_string()],
            metadata: None,
        }
    }

    #[test]
    fn rejects_empty_channels() {
        let mut req = base_request();
        req.channels.clear();
        assert!(matches!(validate(&req), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_over_long_message() {
        let mut req = base_request();
        req.message = "x".repeat(10_001);
        assert!(matches!(validate(&req), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_over_long_recipient() {
        let mut req = base_request();
        req.recipient = "x".repeat(256);
        assert!(matches!(validate(&req), Err(AppError::Validation(_))));
    }

    #[test]
    fn accepts_well_formed_request() {
        assert!(validate(&base_request()).is_ok());
    }
}
