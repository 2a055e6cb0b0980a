//! Complaint repository.

use std::sync::Arc;

use crate::entities::{
    Complaint, ComplaintRemark,
    complaint::{self, ComplaintStatus, Priority},
    complaint_remark,
};
use campusdesk_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
    TransactionTrait,
};

/// Listing filter. Scope fields are set by the caller's access policy.
#[derive(Debug, Clone, Default)]
pub struct ComplaintFilter {
    /// Restrict to complaints filed by this user
    pub creator_id: Option<String>,
    /// Restrict to this normalized department
    pub department_key: Option<String>,
    pub status: Option<ComplaintStatus>,
    pub priority: Option<Priority>,
}

impl ComplaintFilter {
    fn apply(&self, mut query: Select<Complaint>) -> Select<Complaint> {
        if let Some(creator_id) = &self.creator_id {
            query = query.filter(complaint::Column::CreatorId.eq(creator_id.as_str()));
        }
        if let Some(key) = &self.department_key {
            query = query.filter(complaint::Column::DepartmentKey.eq(key.as_str()));
        }
        if let Some(status) = self.status {
            query = query.filter(complaint::Column::Status.eq(status));
        }
        if let Some(priority) = self.priority {
            query = query.filter(complaint::Column::Priority.eq(priority));
        }
        query
    }
}

/// Complaint repository for database operations.
#[derive(Clone)]
pub struct ComplaintRepository {
    db: Arc<DatabaseConnection>,
}

impl ComplaintRepository {
    /// Create a new complaint repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a complaint by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<complaint::Model>> {
        Complaint::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a new complaint.
    pub async fn create(&self, model: complaint::Model) -> AppResult<complaint::Model> {
        let active: complaint::ActiveModel = model.into_active_model().reset_all();
        active
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write every column of `model`, provided the stored row is still at
    /// `expected_version`.
    ///
    /// Returns [`AppError::Conflict`] when another writer got there first.
    pub async fn update_versioned(
        &self,
        model: complaint::Model,
        expected_version: i32,
    ) -> AppResult<complaint::Model> {
        Self::conditional_update(self.db.as_ref(), model, expected_version).await
    }

    /// [`Self::update_versioned`] plus a remark insert, in one transaction.
    pub async fn update_versioned_with_remark(
        &self,
        model: complaint::Model,
        expected_version: i32,
        remark: complaint_remark::ActiveModel,
    ) -> AppResult<(complaint::Model, complaint_remark::Model)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let updated = Self::conditional_update(&txn, model, expected_version).await?;
        let remark = remark
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok((updated, remark))
    }

    async fn conditional_update<C: ConnectionTrait>(
        conn: &C,
        model: complaint::Model,
        expected_version: i32,
    ) -> AppResult<complaint::Model> {
        let id = model.id.clone();
        let active: complaint::ActiveModel = model.into_active_model().reset_all();

        Complaint::update(active)
            .filter(complaint::Column::Version.eq(expected_version))
            .exec(conn)
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => AppError::Conflict(format!(
                    "Complaint {id} was modified concurrently; reload and retry"
                )),
                other => AppError::Database(other.to_string()),
            })
    }

    /// List complaints matching `filter`, newest first.
    pub async fn find_filtered(
        &self,
        filter: &ComplaintFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<complaint::Model>> {
        filter
            .apply(Complaint::find())
            .order_by_desc(complaint::Column::CreatedAt)
            .order_by_desc(complaint::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count complaints matching `filter`.
    pub async fn count_filtered(&self, filter: &ComplaintFilter) -> AppResult<u64> {
        filter
            .apply(Complaint::find())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a complaint still at `expected_version`. Remarks go with it
    /// through the cascading key.
    ///
    /// Returns [`AppError::Conflict`] when the row changed or is already gone.
    pub async fn delete_versioned(&self, id: &str, expected_version: i32) -> AppResult<()> {
        let result = Complaint::delete_many()
            .filter(complaint::Column::Id.eq(id))
            .filter(complaint::Column::Version.eq(expected_version))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict(format!(
                "Complaint {id} was modified concurrently; reload and retry"
            )));
        }
        Ok(())
    }

    // ========== Remarks ==========

    /// Add a remark.
    pub async fn create_remark(
        &self,
        model: complaint_remark::ActiveModel,
    ) -> AppResult<complaint_remark::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Remarks on a complaint, oldest first.
    pub async fn find_remarks(&self, complaint_id: &str) -> AppResult<Vec<complaint_remark::Model>> {
        ComplaintRemark::find()
            .filter(complaint_remark::Column::ComplaintId.eq(complaint_id))
            .order_by_asc(complaint_remark::Column::CreatedAt)
            .order_by_asc(complaint_remark::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::complaint::{Attachments, ComplaintCategory};
    use chrono::{Duration, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Set};

    fn create_test_complaint(id: &str, version: i32) -> complaint::Model {
        let now = Utc::now();
        complaint::Model {
            id: id.to_string(),
            title: "Broken projector".to_string(),
            description: "The projector in room 204 has not worked for a week".to_string(),
            category: ComplaintCategory::Facilities,
            department: "Computer Science".to_string(),
            department_key: "computer science".to_string(),
            priority: Priority::Medium,
            attachments: Attachments::default(),
            is_anonymous: false,
            status: ComplaintStatus::PendingReview,
            rejection_reason: None,
            verification_status: None,
            verification_comment: None,
            verified_by: None,
            verified_at: None,
            resolved_at: None,
            resolution_time_hours: None,
            due_date: (now + Duration::hours(72)).into(),
            is_overdue: false,
            hours_remaining: 72.0,
            creator_id: "student1".to_string(),
            assigned_to: None,
            version,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[tokio::test]
    async fn test_create() {
        let complaint = create_test_complaint("c1", 1);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[complaint.clone()]])
                .into_connection(),
        );

        let repo = ComplaintRepository::new(db);
        let created = repo.create(complaint).await.unwrap();

        assert_eq!(created.id, "c1");
        assert_eq!(created.status, ComplaintStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_update_versioned_success() {
        let mut updated = create_test_complaint("c1", 2);
        updated.status = ComplaintStatus::Open;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[updated.clone()]])
                .into_connection(),
        );

        let repo = ComplaintRepository::new(db);
        let saved = repo.update_versioned(updated, 1).await.unwrap();

        assert_eq!(saved.status, ComplaintStatus::Open);
        assert_eq!(saved.version, 2);
    }

    #[tokio::test]
    async fn test_update_versioned_conflict() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<complaint::Model>::new()])
                .into_connection(),
        );

        let repo = ComplaintRepository::new(db);
        let result = repo
            .update_versioned(create_test_complaint("c1", 3), 2)
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_versioned() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = ComplaintRepository::new(db);
        repo.delete_versioned("c1", 5).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_versioned_conflict() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = ComplaintRepository::new(db);
        let result = repo.delete_versioned("c1", 5).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_with_remark_conflict_skips_remark() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<complaint::Model>::new()])
                .into_connection(),
        );

        // No result is queued for the remark insert, so reaching it would
        // surface as a database error rather than a conflict
        let repo = ComplaintRepository::new(db);
        let result = repo
            .update_versioned_with_remark(
                create_test_complaint("c1", 3),
                2,
                test_remark().into_active_model(),
            )
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_with_remark() {
        let updated = create_test_complaint("c1", 2);
        let remark = test_remark();

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[updated.clone()]])
                .append_query_results([[remark.clone()]])
                .into_connection(),
        );

        let repo = ComplaintRepository::new(db);
        let (saved, created) = repo
            .update_versioned_with_remark(updated, 1, remark.into_active_model())
            .await
            .unwrap();

        assert_eq!(saved.version, 2);
        assert_eq!(created.comment, "Technician scheduled");
    }

    fn test_remark() -> complaint_remark::Model {
        complaint_remark::Model {
            id: "r1".to_string(),
            complaint_id: "c1".to_string(),
            author_id: "staff1".to_string(),
            comment: "Technician scheduled".to_string(),
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_create_remark() {
        let remark = test_remark();

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[remark.clone()]])
                .into_connection(),
        );

        let repo = ComplaintRepository::new(db);
        let created = repo
            .create_remark(complaint_remark::ActiveModel {
                id: Set(remark.id.clone()),
                complaint_id: Set(remark.complaint_id.clone()),
                author_id: Set(remark.author_id.clone()),
                comment: Set(remark.comment.clone()),
                created_at: Set(remark.created_at),
            })
            .await
            .unwrap();

        assert_eq!(created.comment, "Technician scheduled");
    }
}
