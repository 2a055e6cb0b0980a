//! Business logic services.

pub mod access_policy;
pub mod audit;
pub mod auth;
pub mod email;
pub mod events;
pub mod notification;
pub mod orchestrator;
pub mod pagination;
pub mod realtime;
pub mod store;
pub mod verification;
pub mod views;
pub mod workflow;

pub use access_policy::{AccessPolicy, Actor};
pub use audit::{
    AuditLogView, AuditPage, AuditQuery, AuditRecord, AuditStats, AuditTrailRecorder,
};
pub use auth::{Claims, TokenVerifier};
pub use email::{EmailTransport, EmailTransportService, NoOpEmailTransport, SmtpEmailTransport};
pub use events::{EventBus, RequestContext, WorkflowEvent, WorkflowEventKind, WorkflowSubscriber};
pub use notification::{DeliveryOutcome, NotificationFanout, NotificationPage, NotificationView};
pub use orchestrator::{
    AddRemarkInput, AssignInput, ComplaintListQuery, ComplaintPage, CreateComplaintInput,
    UpdateStatusInput, VerifyResolutionInput, WorkflowOrchestrator,
};
pub use pagination::{PageRequest, Pagination};
pub use realtime::{
    NoOpRealtimePublisher, RealtimeFrame, RealtimePublisher, RealtimePublisherService,
    RoleChannel,
};
pub use store::{AuditStore, ComplaintStore, NotificationStore, UserDirectory};
pub use verification::{ResolutionVerificationEngine, VerificationAction};
pub use views::{ComplaintView, CreatorView, RemarkView, VerificationView};
pub use workflow::ComplaintWorkflowEngine;
