//! Audit trail endpoints. Admins only.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use campusdesk_common::AppResult;
use campusdesk_core::{AuditLogView, AuditPage, AuditQuery, AuditStats};
use chrono::Utc;

use crate::{
    extractors::{AuthUser, RequestMeta},
    middleware::AppState,
    response::CsvAttachment,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/logs", get(list_logs))
        .route("/logs/{id}", get(show_log))
        .route("/export", get(export))
        .route("/stats", get(stats))
}

async fn list_logs(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<AuditPage>> {
    let page = state.audit.list(&actor, &query, &ctx).await?;
    Ok(Json(page))
}

async fn show_log(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<AuditLogView>> {
    let entry = state.audit.get(&actor, &id, &ctx).await?;
    Ok(Json(entry))
}

/// Filtered entries as a CSV download.
async fn export(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<CsvAttachment> {
    let body = state.audit.export_csv(&actor, &query, &ctx).await?;
    let filename = format!("audit-logs-{}.csv", Utc::now().format("%Y-%m-%d"));
    Ok(CsvAttachment::new(filename, body))
}

async fn stats(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
) -> AppResult<Json<AuditStats>> {
    let stats = state.audit.stats(&actor, &ctx, Utc::now()).await?;
    Ok(Json(stats))
}
