//! Complaint endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use campusdesk_common::AppResult;
use campusdesk_core::{
    AddRemarkInput, AssignInput, ComplaintListQuery, ComplaintPage, ComplaintView,
    CreateComplaintInput, UpdateStatusInput, VerifyResolutionInput,
};

use crate::{
    extractors::{AuthUser, RequestMeta},
    middleware::AppState,
    response::no_content,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/{id}", get(show).delete(remove))
        .route("/{id}/status", patch(update_status))
        .route("/{id}/verify", patch(verify))
        .route("/{id}/assign", patch(assign))
        .route("/{id}/remarks", post(add_remark))
}

/// File a complaint.
async fn create(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Json(input): Json<CreateComplaintInput>,
) -> AppResult<(StatusCode, Json<ComplaintView>)> {
    let view = state
        .orchestrator
        .create_complaint(&actor, input, &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// The caller's scoped list.
async fn list(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ComplaintListQuery>,
) -> AppResult<Json<ComplaintPage>> {
    let page = state.orchestrator.list_complaints(&actor, &query).await?;
    Ok(Json(page))
}

async fn show(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ComplaintView>> {
    let view = state.orchestrator.get_complaint(&actor, &id, &ctx).await?;
    Ok(Json(view))
}

async fn update_status(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateStatusInput>,
) -> AppResult<Json<ComplaintView>> {
    let view = state
        .orchestrator
        .update_status(&actor, &id, input, &ctx)
        .await?;
    Ok(Json(view))
}

/// Submitter confirms or reopens a resolution.
async fn verify(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<VerifyResolutionInput>,
) -> AppResult<Json<ComplaintView>> {
    let view = state
        .orchestrator
        .verify_resolution(&actor, &id, input, &ctx)
        .await?;
    Ok(Json(view))
}

async fn assign(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<AssignInput>,
) -> AppResult<Json<ComplaintView>> {
    let view = state.orchestrator.assign(&actor, &id, input, &ctx).await?;
    Ok(Json(view))
}

async fn add_remark(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<AddRemarkInput>,
) -> AppResult<Json<ComplaintView>> {
    let view = state
        .orchestrator
        .add_remark(&actor, &id, input, &ctx)
        .await?;
    Ok(Json(view))
}

/// Purge a confirmed resolution. Admins only.
async fn remove(
    AuthUser(actor): AuthUser,
    RequestMeta(ctx): RequestMeta,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state
        .orchestrator
        .delete_complaint(&actor, &id, &ctx)
        .await?;
    Ok(no_content())
}
