//! API endpoints.

mod audit;
mod complaints;
mod notifications;

use axum::{Router, routing::get};

use crate::middleware::AppState;
use crate::realtime::realtime_handler;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/complaints", complaints::router())
        .nest("/audit", audit::router())
        .nest("/notifications", notifications::router())
        .route("/realtime", get(realtime_handler))
}
