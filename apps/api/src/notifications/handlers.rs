use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::notifications::Notification;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub marked: usize,
}

/// GET /api/v1/notifications/:user_id?unread_only=&limit=
pub async fn handle_list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ListNotificationsQuery>,
) -> Json<Vec<Notification>> {
    Json(
        state
            .inbox
            .list(user_id, query.unread_only, query.limit)
            .await,
    )
}

/// POST /api/v1/notifications/:user_id/:notification_id/read
pub async fn handle_mark_read(
    State(state): State<AppState>,
    Path((user_id, notification_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    if state.inbox.mark_read(user_id, notification_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "Notification {notification_id} not found"
        )))
    }
}

/// POST /api/v1/notifications/:user_id/read-all
pub async fn handle_mark_all_read(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Json<MarkAllReadResponse> {
    Json(MarkAllReadResponse {
        marked: state.inbox.mark_all_read(user_id).await,
    })
}
