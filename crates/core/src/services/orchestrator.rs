//! Entry point for every complaint workflow request.
//!
//! Each operation runs the same pipeline: validate the input, load the
//! complaint, ask [`AccessPolicy`], apply the engine, write conditionally on
//! the version that was read, then publish one event for the audit and
//! notification subscribers. Nothing is published for a request that fails
//! before the write, except refused attempts, which are published as
//! [`WorkflowEventKind::AccessDenied`].

use std::collections::HashMap;
use std::sync::Arc;

use campusdesk_common::{AppError, AppResult, IdGenerator};
use campusdesk_db::entities::{
    audit_log::AuditAction,
    complaint::{
        self, Attachment, Attachments, ComplaintCategory, ComplaintStatus, Priority,
        VerificationStatus,
    },
    complaint_remark, user,
};
use chrono::Utc;
use sea_orm::ActiveEnum;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::access_policy::{AccessPolicy, Actor};
use super::events::{EventBus, RequestContext, WorkflowEvent, WorkflowEventKind};
use super::pagination::{PageRequest, Pagination};
use super::store::{ComplaintStore, UserDirectory};
use super::verification::{ResolutionVerificationEngine, VerificationAction};
use super::views::{ComplaintView, RemarkView};
use super::workflow::{ComplaintWorkflowEngine, NewComplaint};

/// Body of `POST /complaints`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateComplaintInput {
    #[validate(length(min = 3, max = 200))]
    pub title: String,
    #[validate(length(min = 10, max = 5000))]
    pub description: String,
    pub category: String,
    #[validate(length(min = 1, max = 100))]
    pub department: String,
    pub priority: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Body of `PATCH /complaints/{id}/status`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusInput {
    #[validate(length(min = 1, max = 32))]
    pub status: String,
    #[validate(length(max = 1000))]
    pub rejection_reason: Option<String>,
}

/// Body of `PATCH /complaints/{id}/verify`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResolutionInput {
    #[validate(length(min = 1, max = 32))]
    pub action: String,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

/// Body of `POST /complaints/{id}/remarks`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddRemarkInput {
    #[validate(length(min = 1, max = 2000))]
    pub comment: String,
}

/// Body of `PATCH /complaints/{id}/assign`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignInput {
    #[validate(length(min = 1, max = 64))]
    pub assignee_id: String,
}

/// Query of `GET /complaints`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// One page of complaints visible to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ComplaintPage {
    pub complaints: Vec<ComplaintView>,
    pub pagination: Pagination,
}

/// Runs complaint workflow requests.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    complaints: Arc<dyn ComplaintStore>,
    users: Arc<dyn UserDirectory>,
    events: EventBus,
    id_gen: IdGenerator,
}

impl WorkflowOrchestrator {
    #[must_use]
    pub fn new(
        complaints: Arc<dyn ComplaintStore>,
        users: Arc<dyn UserDirectory>,
        events: EventBus,
    ) -> Self {
        Self {
            complaints,
            users,
            events,
            id_gen: IdGenerator::new(),
        }
    }

    /// File a new complaint. Students only.
    pub async fn create_complaint(
        &self,
        actor: &Actor,
        input: CreateComplaintInput,
        ctx: &RequestContext,
    ) -> AppResult<ComplaintView> {
        if !AccessPolicy::can_create(actor) {
            return Err(self.deny(
                actor,
                ctx,
                AuditAction::ComplaintCreate,
                None,
                "Only students can file complaints",
            ));
        }

        input.validate()?;
        require_text("title", &input.title, 3)?;
        require_text("description", &input.description, 10)?;
        require_text("department", &input.department, 1)?;
        let category = ComplaintCategory::parse(&input.category).ok_or_else(|| {
            AppError::Validation(format!("Unknown category '{}'", input.category.trim()))
        })?;

        let complaint = ComplaintWorkflowEngine::new_complaint(
            self.id_gen.generate(),
            actor.id().to_string(),
            NewComplaint {
                title: input.title,
                description: input.description,
                category,
                department: input.department,
                priority: Priority::parse_or_default(input.priority.as_deref()),
                is_anonymous: input.is_anonymous,
                attachments: Attachments(input.attachments),
            },
            Utc::now(),
        );
        let complaint = self.complaints.insert(complaint).await?;

        tracing::info!(
            complaint_id = %complaint.id,
            actor_id = %actor.id(),
            priority = complaint.priority.as_str(),
            "Complaint created"
        );

        let view = self.view(actor, &complaint, None).await;
        self.publish(
            WorkflowEventKind::Created { complaint },
            actor,
            ctx,
        );
        Ok(view)
    }

    /// One complaint with its remarks.
    pub async fn get_complaint(
        &self,
        actor: &Actor,
        id: &str,
        ctx: &RequestContext,
    ) -> AppResult<ComplaintView> {
        let complaint = self.load(id).await?;
        if !AccessPolicy::can_access(actor, &complaint) {
            return Err(self.deny(
                actor,
                ctx,
                AuditAction::ComplaintView,
                Some(id),
                "You do not have access to this complaint",
            ));
        }

        let remarks = self.remarks(id).await?;
        Ok(self.view(actor, &complaint, Some(remarks)).await)
    }

    /// Complaints in the caller's scope, newest first.
    pub async fn list_complaints(
        &self,
        actor: &Actor,
        query: &ComplaintListQuery,
    ) -> AppResult<ComplaintPage> {
        let mut filter = AccessPolicy::list_filter(actor);
        filter.status = query
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                ComplaintStatus::parse(s)
                    .ok_or_else(|| AppError::Validation(format!("Unknown status '{s}'")))
            })
            .transpose()?;
        filter.priority = query
            .priority
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Priority::try_from_value(&s.to_string())
                    .map_err(|_| AppError::Validation(format!("Unknown priority '{s}'")))
            })
            .transpose()?;

        let page = PageRequest::new(query.page, query.limit);
        let (items, total) = self
            .complaints
            .list(&filter, page.limit, page.offset())
            .await?;

        let mut creators: HashMap<String, Option<user::Model>> = HashMap::new();
        for c in &items {
            if !creators.contains_key(&c.creator_id) {
                let creator = self.creator(&c.creator_id).await;
                creators.insert(c.creator_id.clone(), creator);
            }
        }

        let complaints = items
            .iter()
            .map(|c| {
                let creator = creators.get(&c.creator_id).and_then(Option::as_ref);
                AccessPolicy::mask_if_anonymous(actor, c, creator, None)
            })
            .collect();

        Ok(ComplaintPage {
            complaints,
            pagination: page.paginate(total),
        })
    }

    /// Move a complaint along the status graph. Staff in scope only.
    pub async fn update_status(
        &self,
        actor: &Actor,
        id: &str,
        input: UpdateStatusInput,
        ctx: &RequestContext,
    ) -> AppResult<ComplaintView> {
        input.validate()?;
        let target = ComplaintStatus::parse(input.status.trim())
            .ok_or_else(|| AppError::Validation(format!("Unknown status '{}'", input.status)))?;

        let mut complaint = self.load(id).await?;
        if !AccessPolicy::can_transition(actor, &complaint) {
            let reason = if AccessPolicy::can_mutate_status(actor) {
                "Complaint is outside your department"
            } else {
                "Only department staff can change complaint status"
            };
            return Err(self.deny(
                actor,
                ctx,
                AuditAction::ComplaintStatusUpdate,
                Some(id),
                reason,
            ));
        }

        let now = Utc::now();
        let old = ComplaintWorkflowEngine::transition(
            &mut complaint,
            target,
            input.rejection_reason.as_deref(),
            now,
        )?;
        let complaint = self.save(complaint, now).await?;

        tracing::info!(
            complaint_id = %complaint.id,
            actor_id = %actor.id(),
            old = old.as_str(),
            new = target.as_str(),
            "Complaint status updated"
        );

        let view = self.view(actor, &complaint, None).await;
        self.publish(
            WorkflowEventKind::StatusUpdated {
                complaint,
                old,
                new: target,
            },
            actor,
            ctx,
        );
        Ok(view)
    }

    /// Confirm or reopen a resolution. The complaint's creator only.
    pub async fn verify_resolution(
        &self,
        actor: &Actor,
        id: &str,
        input: VerifyResolutionInput,
        ctx: &RequestContext,
    ) -> AppResult<ComplaintView> {
        input.validate()?;
        let action = VerificationAction::parse(&input.action)?;

        let mut complaint = self.load(id).await?;
        if !AccessPolicy::can_verify(actor, &complaint) {
            let audit_action = match action {
                VerificationAction::Confirm => AuditAction::ComplaintResolutionConfirm,
                VerificationAction::Reopen => AuditAction::ComplaintResolutionReopen,
            };
            return Err(self.deny(
                actor,
                ctx,
                audit_action,
                Some(id),
                "Only the student who filed this complaint can verify its resolution",
            ));
        }

        let now = Utc::now();
        ResolutionVerificationEngine::apply(
            &mut complaint,
            actor,
            action,
            input.comment.as_deref(),
            now,
        )?;
        let complaint = self.save(complaint, now).await?;
        let comment = complaint.verification_comment.clone();

        tracing::info!(
            complaint_id = %complaint.id,
            actor_id = %actor.id(),
            action = ?action,
            "Resolution verified"
        );

        let view = self.view(actor, &complaint, None).await;
        let kind = match action {
            VerificationAction::Confirm => {
                WorkflowEventKind::ResolutionConfirmed { complaint, comment }
            }
            VerificationAction::Reopen => WorkflowEventKind::ComplaintReopened { complaint, comment },
        };
        self.publish(kind, actor, ctx);
        Ok(view)
    }

    /// Add a remark. Staff in scope or any admin.
    pub async fn add_remark(
        &self,
        actor: &Actor,
        id: &str,
        input: AddRemarkInput,
        ctx: &RequestContext,
    ) -> AppResult<ComplaintView> {
        input.validate()?;
        require_text("comment", &input.comment, 1)?;

        let mut complaint = self.load(id).await?;
        if !AccessPolicy::can_add_remark(actor, &complaint) {
            return Err(self.deny(
                actor,
                ctx,
                AuditAction::ComplaintRemarkAdd,
                Some(id),
                "Only staff of this department or an admin can add remarks",
            ));
        }

        let now = Utc::now();
        let remark = complaint_remark::Model {
            id: self.id_gen.generate(),
            complaint_id: complaint.id.clone(),
            author_id: actor.id().to_string(),
            comment: input.comment.trim().to_string(),
            created_at: now.into(),
        };
        let expected = ComplaintWorkflowEngine::prepare_save(&mut complaint, now);
        let (complaint, remark) = self
            .complaints
            .save_with_remark(complaint, expected, remark)
            .await?;

        tracing::info!(
            complaint_id = %complaint.id,
            actor_id = %actor.id(),
            remark_id = %remark.id,
            "Remark added"
        );

        let remarks = self.remarks(id).await?;
        let view = self.view(actor, &complaint, Some(remarks)).await;
        self.publish(
            WorkflowEventKind::RemarkAdded { complaint, remark },
            actor,
            ctx,
        );
        Ok(view)
    }

    /// Hand a complaint to a staff member of its department.
    pub async fn assign(
        &self,
        actor: &Actor,
        id: &str,
        input: AssignInput,
        ctx: &RequestContext,
    ) -> AppResult<ComplaintView> {
        input.validate()?;
        let assignee_id = input.assignee_id.trim();

        let mut complaint = self.load(id).await?;
        if !AccessPolicy::can_assign(actor, &complaint) {
            return Err(self.deny(
                actor,
                ctx,
                AuditAction::ComplaintAssign,
                Some(id),
                "Only department staff can assign this complaint",
            ));
        }
        if complaint.is_terminal() {
            return Err(AppError::Validation(format!(
                "A {} complaint cannot be assigned",
                complaint.status
            )));
        }

        let assignee = self
            .users
            .find(assignee_id)
            .await?
            .ok_or_else(|| AppError::Validation(format!("Unknown assignee '{assignee_id}'")))?;
        match Actor::from_user(&assignee) {
            Ok(Actor::Staff { department_key, .. })
                if department_key == complaint.department_key => {}
            _ => {
                return Err(AppError::Validation(
                    "Assignee must be active staff of the complaint's department".to_string(),
                ));
            }
        }

        complaint.assigned_to = Some(assignee.id.clone());
        let complaint = self.save(complaint, Utc::now()).await?;

        tracing::info!(
            complaint_id = %complaint.id,
            actor_id = %actor.id(),
            assignee_id = %assignee.id,
            "Complaint assigned"
        );

        let view = self.view(actor, &complaint, None).await;
        self.publish(
            WorkflowEventKind::Assigned {
                complaint,
                assignee_id: assignee.id,
            },
            actor,
            ctx,
        );
        Ok(view)
    }

    /// Purge a resolved complaint whose resolution was confirmed. Admins only.
    pub async fn delete_complaint(
        &self,
        actor: &Actor,
        id: &str,
        ctx: &RequestContext,
    ) -> AppResult<()> {
        let complaint = self.load(id).await?;
        if !AccessPolicy::can_delete(actor) {
            return Err(self.deny(
                actor,
                ctx,
                AuditAction::ComplaintDelete,
                Some(id),
                "Only admins can delete complaints",
            ));
        }

        let confirmed = complaint.status == ComplaintStatus::Resolved
            && complaint.verification_status == Some(VerificationStatus::Confirmed);
        if !confirmed {
            return Err(AppError::Validation(
                "Only resolved complaints with a confirmed resolution can be deleted".to_string(),
            ));
        }

        self.complaints.delete(id, complaint.version).await?;

        tracing::info!(complaint_id = %id, actor_id = %actor.id(), "Complaint deleted");
        self.publish(WorkflowEventKind::Deleted { complaint }, actor, ctx);
        Ok(())
    }

    async fn load(&self, id: &str) -> AppResult<complaint::Model> {
        self.complaints
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Complaint {id} not found")))
    }

    /// Conditional write on the version that was read.
    async fn save(
        &self,
        mut complaint: complaint::Model,
        now: chrono::DateTime<Utc>,
    ) -> AppResult<complaint::Model> {
        let expected = ComplaintWorkflowEngine::prepare_save(&mut complaint, now);
        self.complaints.save(complaint, expected).await
    }

    async fn remarks(&self, id: &str) -> AppResult<Vec<RemarkView>> {
        Ok(self
            .complaints
            .remarks(id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    /// Creator account, or `None` if it cannot be loaded. The view then
    /// carries only the creator's ID.
    async fn creator(&self, creator_id: &str) -> Option<user::Model> {
        match self.users.find(creator_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(creator_id = %creator_id, error = %e, "Failed to load complaint creator");
                None
            }
        }
    }

    async fn view(
        &self,
        actor: &Actor,
        complaint: &complaint::Model,
        remarks: Option<Vec<RemarkView>>,
    ) -> ComplaintView {
        let creator = self.creator(&complaint.creator_id).await;
        AccessPolicy::mask_if_anonymous(actor, complaint, creator.as_ref(), remarks)
    }

    fn publish(&self, kind: WorkflowEventKind, actor: &Actor, ctx: &RequestContext) {
        self.events.publish(WorkflowEvent::new(kind, actor, ctx));
    }

    /// Publish the refused attempt and build the 403.
    fn deny(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        action: AuditAction,
        complaint_id: Option<&str>,
        reason: &str,
    ) -> AppError {
        tracing::info!(
            actor_id = %actor.id(),
            action = action.as_str(),
            complaint_id = ?complaint_id,
            correlation_id = ?ctx.correlation_id,
            "Workflow access denied"
        );
        self.publish(
            WorkflowEventKind::AccessDenied {
                action,
                complaint_id: complaint_id.map(str::to_string),
                reason: reason.to_string(),
            },
            actor,
            ctx,
        );
        AppError::Forbidden(reason.to_string())
    }
}

/// Length check on the trimmed value, so whitespace cannot pad a field.
fn require_text(field: &str, value: &str, min: usize) -> AppResult<()> {
    if value.trim().chars().count() < min {
        return Err(AppError::Validation(format!(
            "{field} must be at least {min} non-blank characters"
        )));
    }
    Ok(())
}
