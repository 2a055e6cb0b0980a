//! Workflow events and the in-process bus that delivers them.
//!
//! The orchestrator publishes one event per committed change. Each
//! subscriber handles it in its own task, so a slow, failing or panicking
//! subscriber cannot affect another one or the request that caused it.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use campusdesk_db::entities::{
    audit_log::AuditAction,
    complaint::{self, ComplaintStatus},
    complaint_remark,
};
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use super::access_policy::Actor;

/// Where a request came from, carried into audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// What happened.
#[derive(Debug, Clone)]
pub enum WorkflowEventKind {
    Created {
        complaint: complaint::Model,
    },
    StatusUpdated {
        complaint: complaint::Model,
        old: ComplaintStatus,
        new: ComplaintStatus,
    },
    RemarkAdded {
        complaint: complaint::Model,
        remark: complaint_remark::Model,
    },
    ResolutionConfirmed {
        complaint: complaint::Model,
        comment: Option<String>,
    },
    ComplaintReopened {
        complaint: complaint::Model,
        comment: Option<String>,
    },
    Assigned {
        complaint: complaint::Model,
        assignee_id: String,
    },
    Deleted {
        complaint: complaint::Model,
    },
    /// A refused attempt. Nothing changed.
    AccessDenied {
        action: AuditAction,
        complaint_id: Option<String>,
        reason: String,
    },
}

impl WorkflowEventKind {
    /// Event name used in logs and real-time frames.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "complaint_created",
            Self::StatusUpdated { .. } => "status_updated",
            Self::RemarkAdded { .. } => "remark_added",
            Self::ResolutionConfirmed { .. } => "resolution_confirmed",
            Self::ComplaintReopened { .. } => "complaint_reopened",
            Self::Assigned { .. } => "complaint_assigned",
            Self::Deleted { .. } => "complaint_deleted",
            Self::AccessDenied { .. } => "access_denied",
        }
    }

    /// Complaint snapshot after the change.
    #[must_use]
    pub const fn complaint(&self) -> Option<&complaint::Model> {
        match self {
            Self::Created { complaint }
            | Self::StatusUpdated { complaint, .. }
            | Self::RemarkAdded { complaint, .. }
            | Self::ResolutionConfirmed { complaint, .. }
            | Self::ComplaintReopened { complaint, .. }
            | Self::Assigned { complaint, .. }
            | Self::Deleted { complaint } => Some(complaint),
            Self::AccessDenied { .. } => None,
        }
    }
}

/// One workflow event.
#[derive(Debug, Clone)]
pub struct WorkflowEvent {
    pub kind: WorkflowEventKind,
    pub actor: Actor,
    pub context: RequestContext,
    pub occurred_at: DateTime<Utc>,
}

impl WorkflowEvent {
    #[must_use]
    pub fn new(kind: WorkflowEventKind, actor: &Actor, context: &RequestContext) -> Self {
        Self {
            kind,
            actor: actor.clone(),
            context: context.clone(),
            occurred_at: Utc::now(),
        }
    }
}

/// Consumer of workflow events.
///
/// Implementations swallow their own failures; there is nobody to report to.
#[async_trait]
pub trait WorkflowSubscriber: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &WorkflowEvent);
}

struct BusInner {
    subscribers: Vec<Arc<dyn WorkflowSubscriber>>,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Fan-out of workflow events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// Decrements the in-flight count even if the subscriber task panics.
struct InFlight(Arc<BusInner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl EventBus {
    /// Create a bus with a fixed set of subscribers.
    #[must_use]
    pub fn new(subscribers: Vec<Arc<dyn WorkflowSubscriber>>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// A bus nobody listens to.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::new(Vec::new())
    }

    /// Hand `event` to every subscriber and return immediately.
    pub fn publish(&self, event: WorkflowEvent) {
        let event = Arc::new(event);
        tracing::debug!(
            event = event.kind.name(),
            actor_id = %event.actor.id(),
            correlation_id = ?event.context.correlation_id,
            "Publishing workflow event"
        );

        for subscriber in &self.inner.subscribers {
            self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
            let guard = InFlight(Arc::clone(&self.inner));
            let subscriber = Arc::clone(subscriber);
            let event = Arc::clone(&event);

            tokio::spawn(async move {
                let _guard = guard;
                let name = subscriber.name();
                let event_name = event.kind.name();
                let handle = tokio::spawn(async move { subscriber.handle(&event).await });
                if let Err(e) = handle.await {
                    tracing::error!(
                        subscriber = name,
                        event = event_name,
                        error = %e,
                        "Workflow subscriber crashed"
                    );
                }
            });
        }
    }

    /// Number of deliveries still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Wait until every delivery published so far has finished.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
