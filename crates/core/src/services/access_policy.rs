//! Role and department access rules.
//!
//! Every entry point asks this module, so the list filter and the detail
//! guard cannot drift apart.
//!
//! | role    | read                   | status | remark   | verify     |
//! |---------|------------------------|--------|----------|------------|
//! | student | own complaints         | no     | no       | own, resolved |
//! | staff   | own department         | yes    | in scope | no         |
//! | admin   | everything             | no     | yes      | no         |

use campusdesk_common::{AppError, AppResult};
use campusdesk_db::{
    entities::{
        complaint,
        user::{self, UserRole},
    },
    repositories::ComplaintFilter,
};

use super::views::{ComplaintView, CreatorView, RemarkView};

/// The caller of a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Student { id: String },
    Staff { id: String, department_key: String },
    Admin { id: String },
}

impl Actor {
    /// Build an actor from an account.
    ///
    /// Inactive or unapproved accounts are rejected as unauthenticated; a
    /// staff account without a department cannot be scoped and is refused.
    pub fn from_user(user: &user::Model) -> AppResult<Self> {
        if !user.can_act() {
            return Err(AppError::Unauthorized);
        }

        Ok(match user.role {
            UserRole::Student => Self::Student {
                id: user.id.clone(),
            },
            UserRole::Admin => Self::Admin {
                id: user.id.clone(),
            },
            UserRole::Staff => {
                let department_key = user
                    .department
                    .as_deref()
                    .map(normalize_department)
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| {
                        AppError::Forbidden("Staff account has no department".to_string())
                    })?;
                Self::Staff {
                    id: user.id.clone(),
                    department_key,
                }
            }
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Student { id } | Self::Staff { id, .. } | Self::Admin { id } => id,
        }
    }

    #[must_use]
    pub const fn role(&self) -> UserRole {
        match self {
            Self::Student { .. } => UserRole::Student,
            Self::Staff { .. } => UserRole::Staff,
            Self::Admin { .. } => UserRole::Admin,
        }
    }
}

/// Lowercase, trim and collapse inner whitespace.
#[must_use]
pub fn normalize_department(department: &str) -> String {
    department
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Access decisions for complaints and the audit trail.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    /// Whether `actor` may see `complaint` at all.
    #[must_use]
    pub fn can_access(actor: &Actor, complaint: &complaint::Model) -> bool {
        match actor {
            Actor::Admin { .. } => true,
            Actor::Student { id } => complaint.creator_id == *id,
            Actor::Staff { department_key, .. } => complaint.department_key == *department_key,
        }
    }

    /// Whether `actor` holds status authority. Only staff do.
    #[must_use]
    pub const fn can_mutate_status(actor: &Actor) -> bool {
        matches!(actor, Actor::Staff { .. })
    }

    /// Status authority plus department scope.
    #[must_use]
    pub fn can_transition(actor: &Actor, complaint: &complaint::Model) -> bool {
        Self::can_mutate_status(actor) && Self::can_access(actor, complaint)
    }

    /// Only students file complaints.
    #[must_use]
    pub const fn can_create(actor: &Actor) -> bool {
        matches!(actor, Actor::Student { .. })
    }

    /// Staff in scope, or any admin.
    #[must_use]
    pub fn can_add_remark(actor: &Actor, complaint: &complaint::Model) -> bool {
        match actor {
            Actor::Student { .. } => false,
            Actor::Staff { .. } | Actor::Admin { .. } => Self::can_access(actor, complaint),
        }
    }

    /// Only the student who filed the complaint.
    #[must_use]
    pub fn can_verify(actor: &Actor, complaint: &complaint::Model) -> bool {
        matches!(actor, Actor::Student { id } if *id == complaint.creator_id)
    }

    #[must_use]
    pub fn can_assign(actor: &Actor, complaint: &complaint::Model) -> bool {
        Self::can_transition(actor, complaint)
    }

    /// Role part of the purge rule. The state part lives in the orchestrator.
    #[must_use]
    pub const fn can_delete(actor: &Actor) -> bool {
        matches!(actor, Actor::Admin { .. })
    }

    #[must_use]
    pub const fn can_view_audit(actor: &Actor) -> bool {
        matches!(actor, Actor::Admin { .. })
    }

    /// Scope restriction for listings.
    #[must_use]
    pub fn list_filter(actor: &Actor) -> ComplaintFilter {
        match actor {
            Actor::Admin { .. } => ComplaintFilter::default(),
            Actor::Student { id } => ComplaintFilter {
                creator_id: Some(id.clone()),
                ..Default::default()
            },
            Actor::Staff { department_key, .. } => ComplaintFilter {
                department_key: Some(department_key.clone()),
                ..Default::default()
            },
        }
    }

    /// Build the view of `complaint` for `actor`.
    ///
    /// For an anonymous complaint seen by staff or an admin, the creator is
    /// reduced to the internal ID.
    #[must_use]
    pub fn mask_if_anonymous(
        actor: &Actor,
        complaint: &complaint::Model,
        creator: Option<&user::Model>,
        remarks: Option<Vec<RemarkView>>,
    ) -> ComplaintView {
        let masked = complaint.is_anonymous && !matches!(actor, Actor::Student { .. });
        let creator = if masked {
            CreatorView::masked(&complaint.creator_id)
        } else {
            CreatorView::identified(&complaint.creator_id, creator)
        };
        ComplaintView::build(complaint, creator, remarks)
    }
}
