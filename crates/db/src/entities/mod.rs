//! Database entities.

pub mod audit_log;
pub mod complaint;
pub mod complaint_remark;
pub mod notification;
pub mod user;

pub use audit_log::Entity as AuditLog;
pub use complaint::Entity as Complaint;
pub use complaint_remark::Entity as ComplaintRemark;
pub use notification::Entity as Notification;
pub use user::Entity as User;
