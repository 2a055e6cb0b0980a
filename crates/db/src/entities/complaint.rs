//! Complaint entity.

use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum ComplaintStatus {
    #[sea_orm(string_value = "pending_review")]
    #[default]
    PendingReview,
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl ComplaintStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_review" => Some(Self::PendingReview),
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complaint category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum ComplaintCategory {
    #[sea_orm(string_value = "academic")]
    Academic,
    #[sea_orm(string_value = "administrative")]
    Administrative,
    #[sea_orm(string_value = "facilities")]
    Facilities,
    #[sea_orm(string_value = "hostel")]
    Hostel,
    #[sea_orm(string_value = "finance")]
    Finance,
    #[sea_orm(string_value = "harassment")]
    Harassment,
    #[sea_orm(string_value = "other")]
    Other,
}

impl ComplaintCategory {
    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "academic" => Some(Self::Academic),
            "administrative" => Some(Self::Administrative),
            "facilities" => Some(Self::Facilities),
            "hostel" => Some(Self::Hostel),
            "finance" => Some(Self::Finance),
            "harassment" => Some(Self::Harassment),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Complaint priority. Selects the SLA window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Priority {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    #[default]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
}

impl Priority {
    /// Wire name of the priority.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse a wire name, falling back to medium for anything unknown.
    #[must_use]
    pub fn parse_or_default(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            _ => Self::Medium,
        }
    }
}

/// Outcome of the submitter's post-resolution review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "reopened")]
    Reopened,
}

impl Model {
    /// Whether no further status transition can be requested directly.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ComplaintStatus::Resolved | ComplaintStatus::Rejected
        )
    }
}

/// Reference to a stored attachment. The file itself lives in object storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub path: String,
    pub content_type: String,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

/// JSON column holding the attachment list.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Attachments(pub Vec<Attachment>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "complaint")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub category: ComplaintCategory,

    /// Department as submitted
    pub department: String,

    /// Lowercased, whitespace-collapsed department used for scoping
    pub department_key: String,

    pub priority: Priority,

    #[sea_orm(column_type = "JsonBinary")]
    pub attachments: Attachments,

    #[sea_orm(default_value = false)]
    pub is_anonymous: bool,

    pub status: ComplaintStatus,

    /// Set only when status is rejected
    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,

    // Latest resolution verification. Present once the complaint has been resolved.
    #[sea_orm(nullable)]
    pub verification_status: Option<VerificationStatus>,
    #[sea_orm(column_type = "Text", nullable)]
    pub verification_comment: Option<String>,
    #[sea_orm(nullable)]
    pub verified_by: Option<String>,
    #[sea_orm(nullable)]
    pub verified_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub resolved_at: Option<DateTimeWithTimeZone>,

    /// Hours from creation to resolution
    #[sea_orm(nullable)]
    pub resolution_time_hours: Option<f64>,

    pub due_date: DateTimeWithTimeZone,

    #[sea_orm(default_value = false)]
    pub is_overdue: bool,

    pub hours_remaining: f64,

    pub creator_id: String,

    #[sea_orm(nullable)]
    pub assigned_to: Option<String>,

    /// Incremented on every write; writes are conditional on it
    pub version: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatorId",
        to = "super::user::Column::Id"
    )]
    Creator,

    #[sea_orm(has_many = "super::complaint_remark::Entity")]
    Remark,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl Related<super::complaint_remark::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Remark.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
