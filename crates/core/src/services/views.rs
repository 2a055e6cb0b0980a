//! Response shapes for complaints.
//!
//! Views are only built through [`crate::AccessPolicy::mask_if_anonymous`], so
//! every read path applies the same identity masking.

use campusdesk_db::entities::{
    complaint::{self, Attachment, ComplaintCategory, ComplaintStatus, Priority, VerificationStatus},
    complaint_remark, user,
};
use serde::Serialize;

/// A complaint as returned to a caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: ComplaintCategory,
    pub department: String,
    pub priority: Priority,
    pub attachments: Vec<Attachment>,
    pub is_anonymous: bool,
    pub status: ComplaintStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_verification: Option<VerificationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_time_hours: Option<f64>,
    pub due_date: String,
    pub is_overdue: bool,
    pub hours_remaining: f64,
    pub creator: CreatorView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<Vec<RemarkView>>,
    pub version: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// Creator identity. Only `id` survives masking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl CreatorView {
    /// Creator reduced to the internal ID.
    #[must_use]
    pub fn masked(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            email: None,
            student_id: None,
        }
    }

    /// Full creator identity, or just the ID when the account is unknown.
    #[must_use]
    pub fn identified(id: &str, user: Option<&user::Model>) -> Self {
        match user {
            Some(u) => Self {
                id: u.id.clone(),
                name: Some(u.name.clone()),
                email: Some(u.email.clone()),
                student_id: u.student_id.clone(),
            },
            None => Self::masked(id),
        }
    }
}

/// Latest resolution verification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationView {
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
}

impl VerificationView {
    pub(crate) fn from_complaint(c: &complaint::Model) -> Option<Self> {
        c.verification_status.map(|status| Self {
            status,
            comment: c.verification_comment.clone(),
            verified_by: c.verified_by.clone(),
            verified_at: c.verified_at.map(|t| t.to_rfc3339()),
        })
    }
}

/// A remark on a complaint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemarkView {
    pub id: String,
    pub author_id: String,
    pub comment: String,
    pub created_at: String,
}

impl From<complaint_remark::Model> for RemarkView {
    fn from(r: complaint_remark::Model) -> Self {
        Self {
            id: r.id,
            author_id: r.author_id,
            comment: r.comment,
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

impl ComplaintView {
    pub(crate) fn build(
        c: &complaint::Model,
        creator: CreatorView,
        remarks: Option<Vec<RemarkView>>,
    ) -> Self {
        Self {
            id: c.id.clone(),
            title: c.title.clone(),
            description: c.description.clone(),
            category: c.category,
            department: c.department.clone(),
            priority: c.priority,
            attachments: c.attachments.0.clone(),
            is_anonymous: c.is_anonymous,
            status: c.status,
            rejection_reason: c.rejection_reason.clone(),
            resolution_verification: VerificationView::from_complaint(c),
            resolved_at: c.resolved_at.map(|t| t.to_rfc3339()),
            resolution_time_hours: c.resolution_time_hours,
            due_date: c.due_date.to_rfc3339(),
            is_overdue: c.is_overdue,
            hours_remaining: c.hours_remaining,
            creator,
            assigned_to: c.assigned_to.clone(),
            remarks,
            version: c.version,
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}
