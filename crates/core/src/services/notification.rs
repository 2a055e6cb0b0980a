//! Notification fanout and the per-user inbox.
//!
//! Each recipient of an event gets a persisted notification, a real-time
//! push if connected, and an email attempt. The three steps are independent
//! of each other, and recipients are independent of each other.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use campusdesk_common::{AppError, AppResult, IdGenerator};
use campusdesk_db::entities::{
    complaint::{self, ComplaintStatus},
    notification::{self, NotificationType},
};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;

use super::email::EmailTransportService;
use super::events::{WorkflowEvent, WorkflowEventKind, WorkflowSubscriber};
use super::pagination::{PageRequest, Pagination};
use super::realtime::{RealtimeFrame, RealtimePublisherService, RoleChannel};
use super::store::{NotificationStore, UserDirectory};

/// A notification as returned to its recipient.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complaint_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

impl From<notification::Model> for NotificationView {
    fn from(n: notification::Model) -> Self {
        Self {
            id: n.id,
            complaint_id: n.complaint_id,
            notification_type: n.notification_type,
            message: n.message,
            is_read: n.is_read,
            metadata: n.metadata,
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

/// One page of a user's inbox.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<NotificationView>,
    pub unread_count: u64,
    pub pagination: Pagination,
}

#[derive(Debug, Clone)]
struct Recipient {
    id: String,
    email: Option<String>,
}

/// What to send for one event, before per-recipient delivery.
#[derive(Debug, Clone)]
struct Dispatch {
    notification_type: NotificationType,
    complaint_id: String,
    subject: &'static str,
    message: String,
    metadata: serde_json::Value,
    recipients: Vec<Recipient>,
}

/// Which channels a single delivery reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub persisted: bool,
    pub pushed: bool,
    pub emailed: bool,
}

/// Resolves recipients for workflow events and delivers to each of them.
#[derive(Clone)]
pub struct NotificationFanout {
    store: Arc<dyn NotificationStore>,
    users: Arc<dyn UserDirectory>,
    realtime: RealtimePublisherService,
    email: EmailTransportService,
    id_gen: IdGenerator,
    instance_name: String,
}

impl NotificationFanout {
    #[must_use]
    pub fn new(
        store: Arc<dyn NotificationStore>,
        users: Arc<dyn UserDirectory>,
        realtime: RealtimePublisherService,
        email: EmailTransportService,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            users,
            realtime,
            email,
            id_gen: IdGenerator::new(),
            instance_name: instance_name.into(),
        }
    }

    /// Deliver `event` to everyone who should hear about it.
    ///
    /// Returns one outcome per recipient. Nothing here fails.
    pub async fn dispatch(&self, event: &WorkflowEvent) -> Vec<DeliveryOutcome> {
        if let WorkflowEventKind::Created { complaint } = &event.kind {
            self.announce_to_staff(complaint);
        }

        let Some(dispatch) = self.plan(event).await else {
            return Vec::new();
        };

        tracing::debug!(
            event = event.kind.name(),
            complaint_id = %dispatch.complaint_id,
            recipients = dispatch.recipients.len(),
            "Fanning out notification"
        );

        join_all(
            dispatch
                .recipients
                .iter()
                .map(|recipient| self.deliver(recipient, &dispatch)),
        )
        .await
    }

    /// Identity-free heads-up on the staff channel for a new complaint.
    fn announce_to_staff(&self, complaint: &complaint::Model) {
        let frame = RealtimeFrame::new(
            NotificationType::ComplaintCreated.as_str(),
            json!({
                "complaintId": complaint.id,
                "title": complaint.title,
                "category": complaint.category,
                "department": complaint.department,
                "priority": complaint.priority,
                "status": complaint.status,
            }),
        );
        self.realtime.publish_to_role(RoleChannel::Staff, &frame);
    }

    async fn plan(&self, event: &WorkflowEvent) -> Option<Dispatch> {
        let (notification_type, complaint, subject, message, metadata, audience) = match &event
            .kind
        {
            WorkflowEventKind::Created { complaint } => (
                NotificationType::ComplaintCreated,
                complaint,
                "New complaint submitted",
                format!("New complaint submitted: \"{}\"", complaint.title),
                json!({ "priority": complaint.priority, "department": complaint.department }),
                Audience::Admins { except: None },
            ),
            WorkflowEventKind::StatusUpdated { complaint, old, new } => (
                NotificationType::StatusUpdated,
                complaint,
                "Complaint status updated",
                status_message(complaint, *old, *new),
                json!({ "oldStatus": old, "newStatus": new }),
                Audience::Creator,
            ),
            WorkflowEventKind::RemarkAdded { complaint, remark } => (
                NotificationType::RemarkAdded,
                complaint,
                "New remark on your complaint",
                format!("A new remark was added to your complaint \"{}\"", complaint.title),
                json!({ "remarkId": remark.id }),
                Audience::Creator,
            ),
            WorkflowEventKind::ResolutionConfirmed { complaint, comment } => (
                NotificationType::ResolutionConfirmed,
                complaint,
                "Resolution confirmed",
                format!(
                    "The submitter confirmed the resolution of complaint \"{}\"",
                    complaint.title
                ),
                json!({ "comment": comment }),
                Audience::Admins {
                    except: Some(event.actor.id()),
                },
            ),
            WorkflowEventKind::ComplaintReopened { complaint, comment } => (
                NotificationType::ComplaintReopened,
                complaint,
                "Complaint reopened",
                format!(
                    "The submitter rejected the resolution and reopened complaint \"{}\"",
                    complaint.title
                ),
                json!({ "comment": comment }),
                Audience::Admins {
                    except: Some(event.actor.id()),
                },
            ),
            WorkflowEventKind::Assigned {
                complaint,
                assignee_id,
            } => (
                NotificationType::ComplaintAssigned,
                complaint,
                "Complaint assigned to you",
                format!("Complaint \"{}\" was assigned to you", complaint.title),
                json!({ "assignedBy": event.actor.id() }),
                Audience::User(assignee_id.as_str()),
            ),
            WorkflowEventKind::Deleted { .. } | WorkflowEventKind::AccessDenied { .. } => {
                return None;
            }
        };

        let recipients = self.resolve(audience, complaint).await;
        Some(Dispatch {
            notification_type,
            complaint_id: complaint.id.clone(),
            subject,
            message,
            metadata,
            recipients,
        })
    }

    async fn resolve(&self, audience: Audience<'_>, complaint: &complaint::Model) -> Vec<Recipient> {
        let mut recipients = match audience {
            Audience::Creator => vec![self.lookup(&complaint.creator_id).await],
            Audience::User(id) => vec![self.lookup(id).await],
            Audience::Admins { except } => match self.users.active_admins().await {
                Ok(admins) => admins
                    .into_iter()
                    .filter(|a| except != Some(a.id.as_str()))
                    .map(|a| Recipient {
                        id: a.id,
                        email: Some(a.email),
                    })
                    .collect(),
                Err(e) => {
                    tracing::error!(
                        complaint_id = %complaint.id,
                        error = %e,
                        "Failed to resolve admin recipients"
                    );
                    Vec::new()
                }
            },
        };

        let mut seen = HashSet::new();
        recipients.retain(|r| seen.insert(r.id.clone()));
        recipients
    }

    async fn lookup(&self, user_id: &str) -> Recipient {
        let email = match self.users.find(user_id).await {
            Ok(user) => user.map(|u| u.email),
            Err(e) => {
                tracing::warn!(recipient_id = %user_id, error = %e, "Failed to look up recipient");
                None
            }
        };
        Recipient {
            id: user_id.to_string(),
            email,
        }
    }

    async fn deliver(&self, recipient: &Recipient, dispatch: &Dispatch) -> DeliveryOutcome {
        let mut outcome = DeliveryOutcome::default();

        let model = notification::Model {
            id: self.id_gen.generate(),
            recipient_id: recipient.id.clone(),
            complaint_id: Some(dispatch.complaint_id.clone()),
            notification_type: dispatch.notification_type,
            message: dispatch.message.clone(),
            is_read: false,
            metadata: Some(dispatch.metadata.clone()),
            created_at: Utc::now().into(),
        };

        let frame_data = match self.store.create(model.clone()).await {
            Ok(saved) => {
                outcome.persisted = true;
                serde_json::to_value(NotificationView::from(saved))
            }
            Err(e) => {
                tracing::warn!(
                    recipient_id = %recipient.id,
                    complaint_id = %dispatch.complaint_id,
                    error = %e,
                    "Failed to persist notification"
                );
                serde_json::to_value(NotificationView::from(model))
            }
        };

        match frame_data {
            Ok(data) => {
                let frame = RealtimeFrame::new(dispatch.notification_type.as_str(), data);
                outcome.pushed = self.realtime.publish_to_user(&recipient.id, &frame);
            }
            Err(e) => {
                tracing::warn!(recipient_id = %recipient.id, error = %e, "Failed to encode frame");
            }
        }

        if let Some(address) = &recipient.email {
            let subject = format!("[{}] {}", self.instance_name, dispatch.subject);
            let body = format!(
                "{}\n\nComplaint reference: {}\n",
                dispatch.message, dispatch.complaint_id
            );
            outcome.emailed = self.email.send(address, &subject, &body).await;
            if !outcome.emailed {
                tracing::warn!(
                    recipient_id = %recipient.id,
                    complaint_id = %dispatch.complaint_id,
                    "Notification email not delivered"
                );
            }
        }

        outcome
    }

    /// A page of the user's notifications, newest first.
    pub async fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        page: PageRequest,
    ) -> AppResult<NotificationPage> {
        let (items, total) = self
            .store
            .list(user_id, unread_only, page.limit, page.offset())
            .await?;
        let unread_count = self.store.count_unread(user_id).await?;

        Ok(NotificationPage {
            notifications: items.into_iter().map(Into::into).collect(),
            unread_count,
            pagination: page.paginate(total),
        })
    }

    pub async fn unread_count(&self, user_id: &str) -> AppResult<u64> {
        self.store.count_unread(user_id).await
    }

    /// Mark one notification read. Someone else's notification is reported as missing.
    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        if self.store.mark_read(notification_id, user_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "Notification {notification_id} not found"
            )))
        }
    }

    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.store.mark_all_read(user_id).await
    }
}

enum Audience<'a> {
    Creator,
    User(&'a str),
    Admins { except: Option<&'a str> },
}

fn status_message(complaint: &complaint::Model, old: ComplaintStatus, new: ComplaintStatus) -> String {
    let mut message = format!(
        "Your complaint \"{}\" moved from {old} to {new}",
        complaint.title
    );
    if new == ComplaintStatus::Rejected
        && let Some(reason) = &complaint.rejection_reason
    {
        message.push_str(&format!(". Reason: {reason}"));
    }
    message
}

#[async_trait]
impl WorkflowSubscriber for NotificationFanout {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, event: &WorkflowEvent) {
        self.dispatch(event).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::access_policy::Actor;
    use crate::services::events::RequestContext;
    use crate::testing::{
        InMemoryNotificationStore, InMemoryUserDirectory, RecordingEmailTransport,
        RecordingRealtime, complaint_fixture, user_fixture,
    };
    use campusdesk_db::entities::user::UserRole;

    struct Fixture {
        fanout: NotificationFanout,
        store: Arc<InMemoryNotificationStore>,
        users: Arc<InMemoryUserDirectory>,
        realtime: Arc<RecordingRealtime>,
        email: Arc<RecordingEmailTransport>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryNotificationStore::default());
        let users = Arc::new(InMemoryUserDirectory::default());
        let realtime = Arc::new(RecordingRealtime::default());
        let email = Arc::new(RecordingEmailTransport::default());
        users.insert(user_fixture("s1", UserRole::Student, None));
        users.insert(user_fixture("admin1", UserRole::Admin, None));
        users.insert(user_fixture("admin2", UserRole::Admin, None));

        Fixture {
            fanout: NotificationFanout::new(
                store.clone(),
                users.clone(),
                realtime.clone(),
                email.clone(),
                "CampusDesk",
            ),
            store,
            users,
            realtime,
            email,
        }
    }

    fn event(kind: WorkflowEventKind, actor: &Actor) -> WorkflowEvent {
        WorkflowEvent::new(kind, actor, &RequestContext::default())
    }

    fn student() -> Actor {
        Actor::Student {
            id: "s1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_status_update_goes_to_creator() {
        let f = fixture();
        f.realtime.connect("s1");
        let mut complaint = complaint_fixture("c1", "s1", "Physics");
        complaint.status = ComplaintStatus::Rejected;
        complaint.rejection_reason = Some("Duplicate of an earlier report".to_string());

        let outcomes = f
            .fanout
            .dispatch(&event(
                WorkflowEventKind::StatusUpdated {
                    complaint,
                    old: ComplaintStatus::PendingReview,
                    new: ComplaintStatus::Rejected,
                },
                &Actor::Staff {
                    id: "staff1".to_string(),
                    department_key: "physics".to_string(),
                },
            ))
            .await;

        assert_eq!(
            outcomes,
            vec![DeliveryOutcome {
                persisted: true,
                pushed: true,
                emailed: true
            }]
        );
        let saved = f.store.all();
        assert_eq!(saved[0].recipient_id, "s1");
        assert!(saved[0].message.contains("Duplicate of an earlier report"));
        assert_eq!(saved[0].metadata.as_ref().unwrap()["newStatus"], "rejected");

        let sent = f.email.sent();
        assert_eq!(sent[0].0, "s1@example.edu");
        assert!(sent[0].1.starts_with("[CampusDesk] "));
    }

    #[tokio::test]
    async fn test_created_notifies_admins_and_staff_channel() {
        let f = fixture();
        let mut complaint = complaint_fixture("c1", "s1", "Physics");
        complaint.is_anonymous = true;

        let outcomes = f
            .fanout
            .dispatch(&event(WorkflowEventKind::Created { complaint }, &student()))
            .await;

        assert_eq!(outcomes.len(), 2);
        let mut recipients: Vec<_> = f.store.all().into_iter().map(|n| n.recipient_id).collect();
        recipients.sort();
        assert_eq!(recipients, vec!["admin1", "admin2"]);

        let role_frames = f.realtime.role_frames();
        assert_eq!(role_frames.len(), 1);
        assert_eq!(role_frames[0].0, RoleChannel::Staff);
        let data = role_frames[0].1.data.to_string();
        assert!(!data.contains("s1"));
    }

    #[tokio::test]
    async fn test_verification_excludes_actor() {
        let f = fixture();
        // An admin account that also filed the complaint is not told about its own action
        let actor = Actor::Student {
            id: "admin2".to_string(),
        };
        let complaint = complaint_fixture("c1", "admin2", "Physics");

        f.fanout
            .dispatch(&event(
                WorkflowEventKind::ComplaintReopened {
                    complaint,
                    comment: None,
                },
                &actor,
            ))
            .await;

        let saved = f.store.all();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].recipient_id, "admin1");
        assert_eq!(saved[0].notification_type, NotificationType::ComplaintReopened);
    }

    #[tokio::test]
    async fn test_failures_are_independent() {
        let f = fixture();
        f.email.fail_for("admin1@example.edu");
        f.store.fail_for("admin2");

        let outcomes = f
            .fanout
            .dispatch(&event(
                WorkflowEventKind::ResolutionConfirmed {
                    complaint: complaint_fixture("c1", "s1", "Physics"),
                    comment: Some("Thanks".to_string()),
                },
                &student(),
            ))
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(f.store.all().len(), 1);
        assert_eq!(f.store.all()[0].recipient_id, "admin1");
        assert_eq!(f.email.sent().len(), 1);
        assert_eq!(f.email.sent()[0].0, "admin2@example.edu");
    }

    #[tokio::test]
    async fn test_deleted_notifies_nobody() {
        let f = fixture();
        let outcomes = f
            .fanout
            .dispatch(&event(
                WorkflowEventKind::Deleted {
                    complaint: complaint_fixture("c1", "s1", "Physics"),
                },
                &Actor::Admin {
                    id: "admin1".to_string(),
                },
            ))
            .await;
        assert!(outcomes.is_empty());
        assert!(f.store.all().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_creator_still_gets_inbox_entry() {
        let f = fixture();
        f.fanout
            .dispatch(&event(
                WorkflowEventKind::RemarkAdded {
                    complaint: complaint_fixture("c1", "ghost", "Physics"),
                    remark: campusdesk_db::entities::complaint_remark::Model {
                        id: "r1".to_string(),
                        complaint_id: "c1".to_string(),
                        author_id: "admin1".to_string(),
                        comment: "Looking into it".to_string(),
                        created_at: Utc::now().into(),
                    },
                },
                &Actor::Admin {
                    id: "admin1".to_string(),
                },
            ))
            .await;

        assert_eq!(f.store.all().len(), 1);
        assert!(f.email.sent().is_empty());
        assert!(f.users.find("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inbox() {
        let f = fixture();
        for _ in 0..3 {
            f.fanout
                .dispatch(&event(
                    WorkflowEventKind::Created {
                        complaint: complaint_fixture("c1", "s1", "Physics"),
                    },
                    &student(),
                ))
                .await;
        }

        let page = f
            .fanout
            .list("admin1", false, PageRequest::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.notifications.len(), 2);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.unread_count, 3);

        let id = page.notifications[0].id.clone();
        assert!(matches!(
            f.fanout.mark_read("admin2", &id).await,
            Err(AppError::NotFound(_))
        ));
        f.fanout.mark_read("admin1", &id).await.unwrap();
        assert_eq!(f.fanout.unread_count("admin1").await.unwrap(), 2);
        assert_eq!(f.fanout.mark_all_read("admin1").await.unwrap(), 2);
        assert_eq!(f.fanout.unread_count("admin1").await.unwrap(), 0);
    }
}
