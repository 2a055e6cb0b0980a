//! API middleware and shared state.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use campusdesk_core::{
    Actor, AuditRecord, AuditTrailRecorder, NotificationFanout, RequestContext, TokenVerifier,
    UserDirectory, WorkflowOrchestrator,
};
use campusdesk_db::entities::audit_log::{AuditAction, AuditResource, AuditStatus};
use chrono::Utc;

use crate::extractors::{CORRELATION_HEADER, bearer_token, request_context};
use crate::realtime::RealtimeHub;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: WorkflowOrchestrator,
    pub audit: AuditTrailRecorder,
    pub notifications: NotificationFanout,
    pub users: Arc<dyn UserDirectory>,
    pub tokens: TokenVerifier,
    pub realtime: RealtimeHub,
}

/// Why a presented credential was refused.
#[derive(Debug, Clone)]
pub struct AuthFailure {
    /// Account the token named, when it could be resolved
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
    pub reason: &'static str,
}

impl AuthFailure {
    const fn anonymous(reason: &'static str) -> Self {
        Self {
            actor_id: None,
            actor_role: None,
            reason,
        }
    }

    /// The `LOGIN_FAILURE` entry for this refusal.
    #[must_use]
    pub fn audit_record(&self, ctx: &RequestContext) -> AuditRecord {
        let mut record = AuditRecord::new(
            AuditAction::LoginFailure,
            AuditResource::Auth,
            AuditStatus::Failure,
        )
        .details(self.reason)
        .context(ctx);
        if let Some(id) = &self.actor_id {
            record = record.resource_id(id.clone());
        }
        record.actor_id.clone_from(&self.actor_id);
        record.actor_role.clone_from(&self.actor_role);
        record
    }
}

/// Resolve a bearer token to an actor.
pub async fn authenticate(state: &AppState, token: &str) -> Result<Actor, AuthFailure> {
    let claims = state
        .tokens
        .verify(token, Utc::now())
        .map_err(|_| AuthFailure::anonymous("Invalid or expired token"))?;

    let user = match state.users.find(&claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(AuthFailure::anonymous("Unknown token subject")),
        Err(e) => {
            tracing::error!(error = %e, "User lookup failed during authentication");
            return Err(AuthFailure::anonymous("Account lookup failed"));
        }
    };

    Actor::from_user(&user).map_err(|_| AuthFailure {
        actor_id: Some(user.id.clone()),
        actor_role: Some(user.role.as_str().to_string()),
        reason: if user.can_act() {
            "Staff account has no department"
        } else {
            "Account is inactive or not approved"
        },
    })
}

/// Authentication middleware.
///
/// Attaches the request context and, for a valid bearer token, the actor.
/// A refused token is recorded as `LOGIN_FAILURE`; the request continues
/// unauthenticated and protected handlers reject it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let ctx = request_context(req.headers(), req.extensions());

    if let Some(token) = bearer_token(req.headers()).map(str::to_owned) {
        match authenticate(&state, &token).await {
            Ok(actor) => {
                req.extensions_mut().insert(actor);
            }
            Err(failure) => {
                tracing::info!(
                    reason = failure.reason,
                    actor_id = ?failure.actor_id,
                    correlation_id = ?ctx.correlation_id,
                    "Bearer token rejected"
                );
                state.audit.record_detached(failure.audit_record(&ctx));
            }
        }
    }

    let correlation_id = ctx.correlation_id.clone();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    if let Some(value) = correlation_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
