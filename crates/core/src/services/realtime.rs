//! Real-time push abstraction.
//!
//! The WebSocket hub in the api crate implements this. Delivery is
//! best-effort: nothing is queued for users who are not connected.

use std::sync::Arc;

use serde::Serialize;

/// Coarse broadcast channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleChannel {
    Admins,
    Staff,
}

impl RoleChannel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admins => "admins",
            Self::Staff => "staff",
        }
    }
}

/// A `{event, data}` frame pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl RealtimeFrame {
    #[must_use]
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Pushes frames to connected clients.
pub trait RealtimePublisher: Send + Sync {
    /// Returns whether the user currently has a live connection.
    fn publish_to_user(&self, user_id: &str, frame: &RealtimeFrame) -> bool;

    /// Returns whether anyone is listening on the channel.
    fn publish_to_role(&self, channel: RoleChannel, frame: &RealtimeFrame) -> bool;
}

/// Type alias for a shared real-time publisher.
pub type RealtimePublisherService = Arc<dyn RealtimePublisher>;

/// Publisher that delivers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRealtimePublisher;

impl RealtimePublisher for NoOpRealtimePublisher {
    fn publish_to_user(&self, _user_id: &str, _frame: &RealtimeFrame) -> bool {
        false
    }

    fn publish_to_role(&self, _channel: RoleChannel, _frame: &RealtimeFrame) -> bool {
        false
    }
}
