//! HTTP API layer for campusdesk.
//!
//! - **Endpoints**: complaints, audit trail, notification inbox
//! - **Extractors**: authenticated actor, request metadata
//! - **Middleware**: bearer authentication, correlation IDs
//! - **Real-time**: WebSocket hub with per-user and role channels
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod realtime;
pub mod response;

use axum::Router;

pub use endpoints::router;
pub use middleware::AppState;
pub use realtime::RealtimeHub;

/// The API router with authentication applied and state attached.
pub fn app(state: AppState) -> Router {
    router()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}
