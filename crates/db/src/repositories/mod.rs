//! Repositories wrapping sea-orm queries.

mod audit_log;
mod complaint;
mod notification;
mod user;

pub use audit_log::{AuditLogFilter, AuditLogRepository};
pub use complaint::{ComplaintFilter, ComplaintRepository};
pub use notification::NotificationRepository;
pub use user::UserRepository;
