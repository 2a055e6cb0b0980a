//! Real-time WebSocket hub.
//!
//! One broadcast channel per connected user plus the `admins` and `staff`
//! role channels. Frames are `{event, data}` JSON text messages. Nothing is
//! queued for users who are not connected.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    Extension,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use campusdesk_common::AppError;
use campusdesk_core::{Actor, AuditRecord, RealtimeFrame, RealtimePublisher, RoleChannel};
use campusdesk_db::entities::audit_log::{AuditAction, AuditResource, AuditStatus};
use futures::{
    SinkExt, StreamExt,
    stream::{self, SplitSink, SplitStream},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::extractors::{RequestMeta, bearer_token};
use crate::middleware::{AppState, AuthFailure, authenticate};

/// Frames buffered per channel before slow receivers start lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Handshake query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct RealtimeQuery {
    pub token: Option<String>,
}

struct HubInner {
    users: RwLock<HashMap<String, broadcast::Sender<String>>>,
    admins: broadcast::Sender<String>,
    staff: broadcast::Sender<String>,
}

/// In-process fan-out to connected sockets.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

/// Receivers for one connection.
pub struct Subscription {
    pub user: broadcast::Receiver<String>,
    pub role: Option<broadcast::Receiver<String>>,
}

impl RealtimeHub {
    #[must_use]
    pub fn new() -> Self {
        let (admins, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (staff, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(HubInner {
                users: RwLock::new(HashMap::new()),
                admins,
                staff,
            }),
        }
    }

    /// Join the actor's own channel and, for staff and admins, their role channel.
    pub fn subscribe(&self, actor: &Actor) -> Subscription {
        let user = {
            let mut users = self
                .inner
                .users
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            users
                .entry(actor.id().to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };
        let role = match actor {
            Actor::Admin { .. } => Some(self.inner.admins.subscribe()),
            Actor::Staff { .. } => Some(self.inner.staff.subscribe()),
            Actor::Student { .. } => None,
        };
        Subscription { user, role }
    }

    /// Drop the user's channel once its last receiver is gone.
    pub fn release(&self, user_id: &str) {
        let mut users = self
            .inner
            .users
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if users.get(user_id).is_some_and(|tx| tx.receiver_count() == 0) {
            users.remove(user_id);
        }
    }

    #[must_use]
    pub fn is_connected(&self, user_id: &str) -> bool {
        self.inner
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .is_some_and(|tx| tx.receiver_count() > 0)
    }

    fn role_sender(&self, channel: RoleChannel) -> &broadcast::Sender<String> {
        match channel {
            RoleChannel::Admins => &self.inner.admins,
            RoleChannel::Staff => &self.inner.staff,
        }
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(frame: &RealtimeFrame) -> Option<String> {
    serde_json::to_string(frame)
        .map_err(|e| warn!(error = %e, event = %frame.event, "Failed to encode frame"))
        .ok()
}

impl RealtimePublisher for RealtimeHub {
    fn publish_to_user(&self, user_id: &str, frame: &RealtimeFrame) -> bool {
        let users = self
            .inner
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = users.get(user_id) else {
            return false;
        };
        encode(frame).is_some_and(|text| tx.send(text).is_ok())
    }

    fn publish_to_role(&self, channel: RoleChannel, frame: &RealtimeFrame) -> bool {
        encode(frame).is_some_and(|text| self.role_sender(channel).send(text).is_ok())
    }
}

/// `GET /realtime`: authenticate, then upgrade.
///
/// The token comes from the `Authorization` header or, when no bearer
/// header is sent, from `?token=`. Every attempt is recorded once, as
/// `LOGIN_SUCCESS` or `LOGIN_FAILURE`. A bearer header has already been
/// checked by the auth middleware, which records its own refusals, so the
/// query token is ignored in that case.
pub async fn realtime_handler(
    State(state): State<AppState>,
    RequestMeta(ctx): RequestMeta,
    Query(query): Query<RealtimeQuery>,
    headers: HeaderMap,
    authenticated: Option<Extension<Actor>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let actor = if bearer_token(&headers).is_some() {
        authenticated.map(|Extension(actor)| actor).ok_or(None)
    } else {
        match query.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => authenticate(&state, token).await.map_err(Some),
            None => Err(Some(AuthFailure {
                actor_id: None,
                actor_role: None,
                reason: "Missing realtime token",
            })),
        }
    };

    let actor = match actor {
        Ok(actor) => actor,
        Err(failure) => {
            if let Some(failure) = failure {
                debug!(reason = failure.reason, "Realtime handshake refused");
                state.audit.record(failure.audit_record(&ctx)).await;
            }
            return AppError::Unauthorized.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    state
        .audit
        .record(
            AuditRecord::new(
                AuditAction::LoginSuccess,
                AuditResource::Auth,
                AuditStatus::Success,
            )
            .resource_id(actor.id())
            .actor(&actor)
            .details("Realtime connection established")
            .context(&ctx),
        )
        .await;

    let hub = state.realtime.clone();
    ws.on_upgrade(move |socket| serve(socket, hub, actor))
}

async fn serve(socket: WebSocket, hub: RealtimeHub, actor: Actor) {
    let (mut sender, mut receiver) = socket.split();
    let Subscription { user, role } = hub.subscribe(&actor);
    info!(user_id = %actor.id(), role = actor.role().as_str(), "Realtime connection opened");

    pump(&mut sender, &mut receiver, user, role, actor.id()).await;

    hub.release(actor.id());
    info!(user_id = %actor.id(), "Realtime connection closed");
}

/// Forward frames to the client until either side goes away.
async fn pump(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    user: broadcast::Receiver<String>,
    role: Option<broadcast::Receiver<String>>,
    user_id: &str,
) {
    let role_stream = stream::iter(role).flat_map(BroadcastStream::new);
    let frames = stream::select(BroadcastStream::new(user), role_stream);
    tokio::pin!(frames);

    let hello = json!({ "event": "connected", "data": { "userId": user_id } }).to_string();
    if sender.send(Message::Text(hello.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket receive failed");
                    break;
                }
            },
            frame = frames.next() => match frame {
                Some(Ok(text)) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(user_id, error = %e, "Realtime receiver lagged");
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn student(id: &str) -> Actor {
        Actor::Student { id: id.to_string() }
    }

    #[tokio::test]
    async fn test_user_frames_reach_only_that_user() {
        let hub = RealtimeHub::new();
        let mut alice = hub.subscribe(&student("alice"));
        let mut bob = hub.subscribe(&student("bob"));

        let frame = RealtimeFrame::new("notification", json!({ "id": "n1" }));
        assert!(hub.publish_to_user("alice", &frame));

        let text = alice.user.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "notification");
        assert_eq!(value["data"]["id"], "n1");
        assert!(bob.user.try_recv().is_err());
    }

    #[test]
    fn test_absent_user_is_not_delivered() {
        let hub = RealtimeHub::new();
        let frame = RealtimeFrame::new("notification", json!({}));
        assert!(!hub.publish_to_user("nobody", &frame));
        assert!(!hub.publish_to_role(RoleChannel::Admins, &frame));
    }

    #[tokio::test]
    async fn test_role_channels() {
        let hub = RealtimeHub::new();
        let mut staff = hub.subscribe(&Actor::Staff {
            id: "s1".to_string(),
            department_key: "computer science".to_string(),
        });
        let admin = hub.subscribe(&Actor::Admin {
            id: "a1".to_string(),
        });
        let student = hub.subscribe(&student("st1"));
        assert!(student.role.is_none());

        let frame = RealtimeFrame::new("complaint_created", json!({ "id": "c1" }));
        assert!(hub.publish_to_role(RoleChannel::Staff, &frame));

        let staff_rx = staff.role.as_mut().unwrap();
        assert!(staff_rx.recv().await.is_ok());
        assert!(admin.role.unwrap().try_recv().is_err());
    }

    #[test]
    fn test_release_prunes_idle_channels() {
        let hub = RealtimeHub::new();
        let first = hub.subscribe(&student("alice"));
        let second = hub.subscribe(&student("alice"));
        assert!(hub.is_connected("alice"));

        drop(first);
        hub.release("alice");
        assert!(hub.is_connected("alice"));

        drop(second);
        hub.release("alice");
        assert!(!hub.is_connected("alice"));
        assert!(hub.inner.users.read().unwrap().is_empty());
    }
}
