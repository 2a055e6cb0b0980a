//! Audit log entity.
//!
//! Rows are append-only: nothing in the application updates or deletes them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(48))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    #[sea_orm(string_value = "LOGIN_SUCCESS")]
    LoginSuccess,
    #[sea_orm(string_value = "LOGIN_FAILURE")]
    LoginFailure,
    #[sea_orm(string_value = "COMPLAINT_CREATE")]
    ComplaintCreate,
    #[sea_orm(string_value = "COMPLAINT_VIEW")]
    ComplaintView,
    #[sea_orm(string_value = "COMPLAINT_STATUS_UPDATE")]
    ComplaintStatusUpdate,
    #[sea_orm(string_value = "COMPLAINT_RESOLUTION_CONFIRM")]
    ComplaintResolutionConfirm,
    #[sea_orm(string_value = "COMPLAINT_RESOLUTION_REOPEN")]
    ComplaintResolutionReopen,
    #[sea_orm(string_value = "COMPLAINT_REMARK_ADD")]
    ComplaintRemarkAdd,
    #[sea_orm(string_value = "COMPLAINT_ASSIGN")]
    ComplaintAssign,
    #[sea_orm(string_value = "COMPLAINT_DELETE")]
    ComplaintDelete,
    #[sea_orm(string_value = "AUDIT_EXPORT")]
    AuditExport,
    /// Only recorded for refused reads of the audit trail
    #[sea_orm(string_value = "AUDIT_VIEW")]
    AuditView,
}

impl AuditAction {
    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailure => "LOGIN_FAILURE",
            Self::ComplaintCreate => "COMPLAINT_CREATE",
            Self::ComplaintView => "COMPLAINT_VIEW",
            Self::ComplaintStatusUpdate => "COMPLAINT_STATUS_UPDATE",
            Self::ComplaintResolutionConfirm => "COMPLAINT_RESOLUTION_CONFIRM",
            Self::ComplaintResolutionReopen => "COMPLAINT_RESOLUTION_REOPEN",
            Self::ComplaintRemarkAdd => "COMPLAINT_REMARK_ADD",
            Self::ComplaintAssign => "COMPLAINT_ASSIGN",
            Self::ComplaintDelete => "COMPLAINT_DELETE",
            Self::AuditExport => "AUDIT_EXPORT",
            Self::AuditView => "AUDIT_VIEW",
        }
    }
}

/// Kind of resource an entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum AuditResource {
    #[sea_orm(string_value = "complaint")]
    Complaint,
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "registration")]
    Registration,
    #[sea_orm(string_value = "profile")]
    Profile,
    #[sea_orm(string_value = "auth")]
    Auth,
    #[sea_orm(string_value = "audit")]
    Audit,
}

impl AuditResource {
    /// Wire name of the resource kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complaint => "complaint",
            Self::User => "user",
            Self::Registration => "registration",
            Self::Profile => "profile",
            Self::Auth => "auth",
            Self::Audit => "audit",
        }
    }
}

/// Whether the audited attempt succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum AuditStatus {
    #[sea_orm(string_value = "Success")]
    Success,
    #[sea_orm(string_value = "Failure")]
    Failure,
}

impl AuditStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failure => "Failure",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Null when the actor could not be identified (e.g. a bad token)
    #[sea_orm(nullable)]
    pub actor_id: Option<String>,

    #[sea_orm(nullable)]
    pub actor_role: Option<String>,

    pub action: AuditAction,

    pub resource: AuditResource,

    #[sea_orm(nullable)]
    pub resource_id: Option<String>,

    /// Operator-facing id such as `CMP-2026-a1b2c3`
    #[sea_orm(nullable)]
    pub target_id_display: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub details: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<Json>,

    pub status: AuditStatus,

    #[sea_orm(nullable)]
    pub correlation_id: Option<String>,

    #[sea_orm(nullable)]
    pub ip_address: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
