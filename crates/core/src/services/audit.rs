//! Audit trail recording and querying.
//!
//! Recording never fails from the caller's point of view: storage errors are
//! logged here and go no further.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use campusdesk_common::{AppError, AppResult, IdGenerator};
use campusdesk_db::{
    entities::{
        audit_log::{self, AuditAction, AuditResource, AuditStatus},
        user,
    },
    repositories::AuditLogFilter,
};
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use sea_orm::ActiveEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::access_policy::{AccessPolicy, Actor};
use super::events::{RequestContext, WorkflowEvent, WorkflowEventKind, WorkflowSubscriber};
use super::pagination::{PageRequest, Pagination};
use super::store::{AuditStore, UserDirectory};

/// Most rows a single export returns.
pub const EXPORT_LIMIT: u64 = 10_000;

/// Metadata flag on entries whose actor is an anonymous complaint's creator.
const ANONYMOUS_ACTOR: &str = "anonymousActor";

const CSV_HEADER: [&str; 12] = [
    "Audit ID",
    "Timestamp (UTC, ISO-8601)",
    "Actor Name",
    "Actor Email",
    "Actor Role",
    "Action",
    "Target Entity",
    "Target ID",
    "Description",
    "Status",
    "IP Address",
    "Correlation ID",
];

/// Operator-facing ID: `{PREFIX}-{year}-{last 6 chars of id}`.
#[must_use]
pub fn target_id_display(resource: AuditResource, resource_id: &str, year: i32) -> String {
    let prefix = match resource {
        AuditResource::Complaint => "CMP",
        AuditResource::User | AuditResource::Profile => "USR",
        AuditResource::Registration => "REG",
        AuditResource::Auth => "AUTH",
        AuditResource::Audit => "RES",
    };
    let chars: Vec<char> = resource_id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(6)..].iter().collect();
    format!("{prefix}-{year}-{tail}")
}

/// An entry to append.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub resource: AuditResource,
    pub status: AuditStatus,
    pub resource_id: Option<String>,
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
    pub details: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub context: RequestContext,
}

impl AuditRecord {
    #[must_use]
    pub fn new(action: AuditAction, resource: AuditResource, status: AuditStatus) -> Self {
        Self {
            action,
            resource,
            status,
            resource_id: None,
            actor_id: None,
            actor_role: None,
            details: None,
            metadata: None,
            context: RequestContext::default(),
        }
    }

    #[must_use]
    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn actor(mut self, actor: &Actor) -> Self {
        self.actor_id = Some(actor.id().to_string());
        self.actor_role = Some(actor.role().as_str().to_string());
        self
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn context(mut self, context: &RequestContext) -> Self {
        self.context = context.clone();
        self
    }
}

/// Query parameters for listing and exporting.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub actor_role: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
}

/// An audit entry as returned to admins.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogView {
    pub id: String,
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<String>,
    pub target_id_display: Option<String>,
    pub details: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub status: AuditStatus,
    pub correlation_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

impl From<audit_log::Model> for AuditLogView {
    fn from(m: audit_log::Model) -> Self {
        Self {
            id: m.id,
            actor_id: m.actor_id,
            actor_role: m.actor_role,
            action: m.action,
            resource: m.resource,
            resource_id: m.resource_id,
            target_id_display: m.target_id_display,
            details: m.details,
            metadata: m.metadata,
            status: m.status,
            correlation_id: m.correlation_id,
            ip_address: m.ip_address,
            user_agent: m.user_agent,
            created_at: m.created_at.to_rfc3339(),
        }
    }
}

/// One page of audit entries.
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub logs: Vec<AuditLogView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionCount {
    pub action: AuditAction,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceCount {
    pub resource: AuditResource,
    pub count: i64,
}

/// Dashboard counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total_logs: u64,
    pub today_logs: u64,
    pub action_stats: Vec<ActionCount>,
    pub resource_stats: Vec<ResourceCount>,
}

/// Appends and serves the audit trail.
#[derive(Clone)]
pub struct AuditTrailRecorder {
    store: Arc<dyn AuditStore>,
    users: Arc<dyn UserDirectory>,
    id_gen: IdGenerator,
}

impl AuditTrailRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            store,
            users,
            id_gen: IdGenerator::new(),
        }
    }

    /// Append an entry. Storage failures are logged and swallowed.
    pub async fn record(&self, record: AuditRecord) {
        let now = Utc::now();
        let target_id_display = record
            .resource_id
            .as_deref()
            .map(|id| target_id_display(record.resource, id, now.year()));

        let entry = audit_log::Model {
            id: self.id_gen.generate(),
            actor_id: record.actor_id,
            actor_role: record.actor_role,
            action: record.action,
            resource: record.resource,
            resource_id: record.resource_id,
            target_id_display,
            details: record.details,
            metadata: record.metadata,
            status: record.status,
            correlation_id: record.context.correlation_id,
            ip_address: record.context.ip_address,
            user_agent: record.context.user_agent,
            created_at: now.into(),
        };
        let action = entry.action;
        let correlation_id = entry.correlation_id.clone();

        if let Err(e) = self.store.append(entry).await {
            tracing::error!(
                action = action.as_str(),
                correlation_id = ?correlation_id,
                error = %e,
                "Failed to write audit entry"
            );
        }
    }

    /// Record in the background without waiting.
    pub fn record_detached(&self, record: AuditRecord) {
        let this = self.clone();
        tokio::spawn(async move { this.record(record).await });
    }

    /// Admin gate for the audit surface. A refusal is itself recorded.
    pub async fn authorize(
        &self,
        actor: &Actor,
        action: AuditAction,
        context: &RequestContext,
    ) -> AppResult<()> {
        if AccessPolicy::can_view_audit(actor) {
            return Ok(());
        }

        self.record(
            AuditRecord::new(action, AuditResource::Audit, AuditStatus::Failure)
                .actor(actor)
                .details("Audit trail access denied")
                .context(context),
        )
        .await;

        Err(AppError::Forbidden(
            "Audit logs are restricted to administrators".to_string(),
        ))
    }

    /// A filtered page of entries, newest first.
    pub async fn list(
        &self,
        actor: &Actor,
        query: &AuditQuery,
        context: &RequestContext,
    ) -> AppResult<AuditPage> {
        self.authorize(actor, AuditAction::AuditView, context).await?;

        let filter = self.build_filter(query).await?;
        let page = PageRequest::new(query.page, query.limit);
        let (logs, total) = self
            .store
            .query(&filter, page.limit, page.offset())
            .await?;

        Ok(AuditPage {
            logs: logs.into_iter().map(Into::into).collect(),
            pagination: page.paginate(total),
        })
    }

    /// One entry by ID.
    pub async fn get(
        &self,
        actor: &Actor,
        id: &str,
        context: &RequestContext,
    ) -> AppResult<AuditLogView> {
        self.authorize(actor, AuditAction::AuditView, context).await?;

        self.store
            .find(id)
            .await?
            .map(Into::into)
            .ok_or_else(|| AppError::NotFound(format!("Audit entry {id} not found")))
    }

    /// Totals, today's count (since 00:00 UTC) and breakdowns.
    pub async fn stats(
        &self,
        actor: &Actor,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> AppResult<AuditStats> {
        self.authorize(actor, AuditAction::AuditView, context).await?;

        let (_, total_logs) = self.store.query(&AuditLogFilter::default(), 1, 0).await?;
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |t| t.and_utc());
        let today_logs = self.store.count_since(midnight).await?;

        let action_stats = self
            .store
            .count_by_action()
            .await?
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect();
        let resource_stats = self
            .store
            .count_by_resource()
            .await?
            .into_iter()
            .map(|(resource, count)| ResourceCount { resource, count })
            .collect();

        Ok(AuditStats {
            total_logs,
            today_logs,
            action_stats,
            resource_stats,
        })
    }

    /// Flat CSV of matching entries, newest first, with actors resolved.
    pub async fn export_csv(
        &self,
        actor: &Actor,
        query: &AuditQuery,
        context: &RequestContext,
    ) -> AppResult<String> {
        self.authorize(actor, AuditAction::AuditExport, context).await?;

        let filter = self.build_filter(query).await?;
        let (entries, total) = self.store.query(&filter, EXPORT_LIMIT, 0).await?;

        let mut actors: HashMap<String, Option<user::Model>> = HashMap::new();
        for id in entries.iter().filter_map(|e| e.actor_id.as_deref()) {
            if !actors.contains_key(id) {
                let found = self.users.find(id).await?;
                actors.insert(id.to_string(), found);
            }
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(CSV_HEADER)
            .map_err(|e| AppError::Internal(format!("CSV write failed: {e}")))?;

        for entry in &entries {
            let hide_identity = entry
                .metadata
                .as_ref()
                .and_then(|m| m.get(ANONYMOUS_ACTOR))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            let user = entry
                .actor_id
                .as_deref()
                .and_then(|id| actors.get(id))
                .and_then(Option::as_ref)
                .filter(|_| !hide_identity);

            writer
                .write_record([
                    entry.id.as_str(),
                    &entry
                        .created_at
                        .with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                    user.map_or("", |u| u.name.as_str()),
                    user.map_or("", |u| u.email.as_str()),
                    entry.actor_role.as_deref().unwrap_or(""),
                    entry.action.as_str(),
                    entry.resource.as_str(),
                    entry
                        .target_id_display
                        .as_deref()
                        .or(entry.resource_id.as_deref())
                        .unwrap_or(""),
                    entry.details.as_deref().unwrap_or(""),
                    entry.status.as_str(),
                    entry.ip_address.as_deref().unwrap_or(""),
                    entry.correlation_id.as_deref().unwrap_or(""),
                ])
                .map_err(|e| AppError::Internal(format!("CSV write failed: {e}")))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV flush failed: {e}")))?;
        let csv = String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("CSV is not UTF-8: {e}")))?;

        self.record(
            AuditRecord::new(
                AuditAction::AuditExport,
                AuditResource::Audit,
                AuditStatus::Success,
            )
            .actor(actor)
            .details(format!("Exported {} audit entries", entries.len()))
            .metadata(json!({
                "rows": entries.len(),
                "matched": total,
                "truncated": total > EXPORT_LIMIT,
            }))
            .context(context),
        )
        .await;

        Ok(csv)
    }

    async fn build_filter(&self, query: &AuditQuery) -> AppResult<AuditLogFilter> {
        let action = parse_enum::<AuditAction>(query.action.as_deref(), "action")?;
        let resource = parse_enum::<AuditResource>(query.resource.as_deref(), "resource")?;
        let status = parse_enum::<AuditStatus>(query.status.as_deref(), "status")?;
        let start = query
            .start_date
            .as_deref()
            .map(|s| parse_date(s, false))
            .transpose()?;
        let end = query
            .end_date
            .as_deref()
            .map(|s| parse_date(s, true))
            .transpose()?;

        let search = non_empty(query.search.as_deref());
        let search_actor_ids = match &search {
            Some(s) => self.users.ids_matching(s).await?,
            None => Vec::new(),
        };

        Ok(AuditLogFilter {
            actor_id: non_empty(query.user_id.as_deref()),
            action,
            resource,
            actor_role: non_empty(query.actor_role.as_deref()),
            status,
            start,
            end,
            search,
            search_actor_ids,
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_enum<E: ActiveEnum<Value = String>>(raw: Option<&str>, field: &str) -> AppResult<Option<E>> {
    match non_empty(raw) {
        None => Ok(None),
        Some(s) => E::try_from_value(&s)
            .map(Some)
            .map_err(|_| AppError::Validation(format!("Unknown {field} '{s}'"))),
    }
}

/// RFC 3339, or a bare `YYYY-MM-DD` taken as the start or end of that UTC day.
fn parse_date(raw: &str, end_of_day: bool) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid date '{raw}'")))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| AppError::Validation(format!("Invalid date '{raw}'")))
}

fn event_record(event: &WorkflowEvent) -> AuditRecord {
    let (action, status) = match &event.kind {
        WorkflowEventKind::Created { .. } => (AuditAction::ComplaintCreate, AuditStatus::Success),
        WorkflowEventKind::StatusUpdated { .. } => {
            (AuditAction::ComplaintStatusUpdate, AuditStatus::Success)
        }
        WorkflowEventKind::RemarkAdded { .. } => {
            (AuditAction::ComplaintRemarkAdd, AuditStatus::Success)
        }
        WorkflowEventKind::ResolutionConfirmed { .. } => {
            (AuditAction::ComplaintResolutionConfirm, AuditStatus::Success)
        }
        WorkflowEventKind::ComplaintReopened { .. } => {
            (AuditAction::ComplaintResolutionReopen, AuditStatus::Success)
        }
        WorkflowEventKind::Assigned { .. } => (AuditAction::ComplaintAssign, AuditStatus::Success),
        WorkflowEventKind::Deleted { .. } => (AuditAction::ComplaintDelete, AuditStatus::Success),
        WorkflowEventKind::AccessDenied { action, .. } => (*action, AuditStatus::Failure),
    };

    let mut record = AuditRecord::new(action, AuditResource::Complaint, status)
        .actor(&event.actor)
        .context(&event.context);

    let (details, mut metadata) = match &event.kind {
        WorkflowEventKind::Created { complaint } => (
            format!("Complaint created: {}", complaint.title),
            json!({
                "category": complaint.category,
                "priority": complaint.priority,
                "department": complaint.department,
                "isAnonymous": complaint.is_anonymous,
            }),
        ),
        WorkflowEventKind::StatusUpdated { complaint, old, new } => (
            format!("Status changed from {old} to {new}"),
            json!({
                "oldStatus": old,
                "newStatus": new,
                "rejectionReason": complaint.rejection_reason,
            }),
        ),
        WorkflowEventKind::RemarkAdded { remark, .. } => (
            "Remark added".to_string(),
            json!({ "remarkId": remark.id }),
        ),
        WorkflowEventKind::ResolutionConfirmed { comment, .. } => (
            "Resolution confirmed by submitter".to_string(),
            json!({ "comment": comment }),
        ),
        WorkflowEventKind::ComplaintReopened { comment, .. } => (
            "Resolution rejected, complaint reopened".to_string(),
            json!({ "comment": comment }),
        ),
        WorkflowEventKind::Assigned { assignee_id, .. } => (
            "Complaint assigned".to_string(),
            json!({ "assigneeId": assignee_id }),
        ),
        WorkflowEventKind::Deleted { complaint } => (
            "Complaint purged".to_string(),
            json!({ "status": complaint.status }),
        ),
        WorkflowEventKind::AccessDenied { reason, .. } => {
            (format!("Access denied: {reason}"), json!({}))
        }
    };

    match &event.kind {
        WorkflowEventKind::AccessDenied {
            complaint_id: Some(id),
            ..
        } => record = record.resource_id(id.clone()),
        kind => {
            if let Some(complaint) = kind.complaint() {
                record = record.resource_id(complaint.id.clone());
                if complaint.is_anonymous && complaint.creator_id == event.actor.id() {
                    metadata[ANONYMOUS_ACTOR] = json!(true);
                }
            }
        }
    }

    record.details(details).metadata(metadata)
}

#[async_trait]
impl WorkflowSubscriber for AuditTrailRecorder {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn handle(&self, event: &WorkflowEvent) {
        self.record(event_record(event)).await;
    }
}
