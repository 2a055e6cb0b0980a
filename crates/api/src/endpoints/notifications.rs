//! Notification inbox endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use campusdesk_common::AppResult;
use campusdesk_core::{NotificationPage, PageRequest};
use serde::{Deserialize, Serialize};

use crate::{extractors::AuthUser, middleware::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/read-all", patch(mark_all_read))
        .route("/{id}/read", patch(mark_read))
}

/// Inbox query.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

async fn list(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
) -> AppResult<Json<NotificationPage>> {
    let page = state
        .notifications
        .list(
            actor.id(),
            query.unread_only,
            PageRequest::new(query.page, query.limit),
        )
        .await?;
    Ok(Json(page))
}

async fn unread_count(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UnreadCountResponse>> {
    let unread_count = state.notifications.unread_count(actor.id()).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

/// Mark one notification read. Only the recipient can.
async fn mark_read(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.notifications.mark_read(actor.id(), &id).await?;
    Ok(Json(serde_json::json!({ "id": id, "isRead": true })))
}

async fn mark_all_read(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<MarkAllReadResponse>> {
    let updated = state.notifications.mark_all_read(actor.id()).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
