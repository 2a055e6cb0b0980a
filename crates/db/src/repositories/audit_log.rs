//! Audit log repository.
//!
//! Append and query only. There is no update or delete path.

use std::sync::Arc;

use crate::entities::{
    AuditLog,
    audit_log::{self, AuditAction, AuditResource, AuditStatus},
};
use campusdesk_common::{AppError, AppResult};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};

/// Query filter for audit entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub actor_id: Option<String>,
    pub action: Option<AuditAction>,
    pub resource: Option<AuditResource>,
    pub actor_role: Option<String>,
    pub status: Option<AuditStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Free text matched against the target display id
    pub search: Option<String>,
    /// Actor ids resolved from `search` through the user directory
    pub search_actor_ids: Vec<String>,
}

impl AuditLogFilter {
    fn apply(&self, mut query: Select<AuditLog>) -> Select<AuditLog> {
        if let Some(actor_id) = &self.actor_id {
            query = query.filter(audit_log::Column::ActorId.eq(actor_id.as_str()));
        }
        if let Some(action) = self.action {
            query = query.filter(audit_log::Column::Action.eq(action));
        }
        if let Some(resource) = self.resource {
            query = query.filter(audit_log::Column::Resource.eq(resource));
        }
        if let Some(role) = &self.actor_role {
            query = query.filter(audit_log::Column::ActorRole.eq(role.as_str()));
        }
        if let Some(status) = self.status {
            query = query.filter(audit_log::Column::Status.eq(status));
        }
        if let Some(start) = self.start {
            query = query.filter(audit_log::Column::CreatedAt.gte(start));
        }
        if let Some(end) = self.end {
            query = query.filter(audit_log::Column::CreatedAt.lte(end));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let mut condition =
                Condition::any().add(audit_log::Column::TargetIdDisplay.contains(search));
            if !self.search_actor_ids.is_empty() {
                condition = condition.add(
                    audit_log::Column::ActorId.is_in(self.search_actor_ids.iter().cloned()),
                );
            }
            query = query.filter(condition);
        }
        query
    }
}

/// Audit log repository for database operations.
#[derive(Clone)]
pub struct AuditLogRepository {
    db: Arc<DatabaseConnection>,
}

impl AuditLogRepository {
    /// Create a new audit log repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append an entry.
    pub async fn create(&self, model: audit_log::ActiveModel) -> AppResult<audit_log::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find an entry by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<audit_log::Model>> {
        AuditLog::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Entries matching `filter`, newest first.
    pub async fn find_filtered(
        &self,
        filter: &AuditLogFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<audit_log::Model>> {
        filter
            .apply(AuditLog::find())
            .order_by_desc(audit_log::Column::CreatedAt)
            .order_by_desc(audit_log::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count entries matching `filter`.
    pub async fn count_filtered(&self, filter: &AuditLogFilter) -> AppResult<u64> {
        filter
            .apply(AuditLog::find())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count entries created at or after `since`.
    pub async fn count_since(&self, since: DateTime<Utc>) -> AppResult<u64> {
        AuditLog::find()
            .filter(audit_log::Column::CreatedAt.gte(since))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Entry count per action, most frequent first.
    pub async fn count_by_action(&self) -> AppResult<Vec<(AuditAction, i64)>> {
        AuditLog::find()
            .select_only()
            .column(audit_log::Column::Action)
            .column_as(audit_log::Column::Id.count(), "count")
            .group_by(audit_log::Column::Action)
            .order_by_desc(audit_log::Column::Id.count())
            .into_tuple::<(AuditAction, i64)>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Entry count per resource kind, most frequent first.
    pub async fn count_by_resource(&self) -> AppResult<Vec<(AuditResource, i64)>> {
        AuditLog::find()
            .select_only()
            .column(audit_log::Column::Resource)
            .column_as(audit_log::Column::Id.count(), "count")
            .group_by(audit_log::Column::Resource)
            .order_by_desc(audit_log::Column::Id.count())
            .into_tuple::<(AuditResource, i64)>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, QueryTrait};

    fn create_test_entry(id: &str) -> audit_log::Model {
        audit_log::Model {
            id: id.to_string(),
            actor_id: Some("staff1".to_string()),
            actor_role: Some("staff".to_string()),
            action: AuditAction::ComplaintStatusUpdate,
            resource: AuditResource::Complaint,
            resource_id: Some("01j0000000000000000000abc123".to_string()),
            target_id_display: Some("CMP-2026-abc123".to_string()),
            details: Some("Status changed from open to in_progress".to_string()),
            metadata: None,
            status: AuditStatus::Success,
            correlation_id: Some("corr-1".to_string()),
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let entry = create_test_entry("a1");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[entry.clone()]])
                .into_connection(),
        );

        let repo = AuditLogRepository::new(db);
        let found = repo.find_by_id("a1").await.unwrap().unwrap();

        assert_eq!(found.action, AuditAction::ComplaintStatusUpdate);
        assert_eq!(found.target_id_display.as_deref(), Some("CMP-2026-abc123"));
    }

    #[tokio::test]
    async fn test_find_filtered() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_entry("a2"), create_test_entry("a1")]])
                .into_connection(),
        );

        let repo = AuditLogRepository::new(db);
        let filter = AuditLogFilter {
            status: Some(AuditStatus::Success),
            ..Default::default()
        };
        let entries = repo.find_filtered(&filter, 20, 0).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "a2");
    }

    #[test]
    fn test_search_matches_display_id_or_actor() {
        let filter = AuditLogFilter {
            search: Some("abc123".to_string()),
            search_actor_ids: vec!["u1".to_string(), "u2".to_string()],
            ..Default::default()
        };

        let sql = filter
            .apply(AuditLog::find())
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#""target_id_display" LIKE '%abc123%'"#));
        assert!(sql.contains(r#""actor_id" IN ('u1', 'u2')"#));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn test_empty_search_is_ignored() {
        let filter = AuditLogFilter {
            search: Some(String::new()),
            ..Default::default()
        };

        let sql = filter
            .apply(AuditLog::find())
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(!sql.contains("LIKE"));
    }
}
