//! Storage seams used by the workflow.
//!
//! The services depend on these traits rather than on concrete repositories
//! so tests can run against [`crate::testing`] fakes. The repository
//! implementations below are what the server wires in.

use async_trait::async_trait;
use campusdesk_common::AppResult;
use campusdesk_db::{
    entities::{
        audit_log::{self, AuditAction, AuditResource},
        complaint, complaint_remark, notification, user,
    },
    repositories::{
        AuditLogFilter, AuditLogRepository, ComplaintFilter, ComplaintRepository,
        NotificationRepository, UserRepository,
    },
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, IntoActiveModel};

/// Complaint persistence.
#[async_trait]
pub trait ComplaintStore: Send + Sync {
    /// Insert a new complaint.
    async fn insert(&self, complaint: complaint::Model) -> AppResult<complaint::Model>;

    /// Load a complaint by ID.
    async fn find(&self, id: &str) -> AppResult<Option<complaint::Model>>;

    /// Persist `complaint` if the stored row is still at `expected_version`.
    ///
    /// Fails with `AppError::Conflict` otherwise.
    async fn save(
        &self,
        complaint: complaint::Model,
        expected_version: i32,
    ) -> AppResult<complaint::Model>;

    /// A page of complaints plus the total number matching.
    async fn list(
        &self,
        filter: &ComplaintFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<complaint::Model>, u64)>;

    /// Delete a complaint and its remarks if the stored row is still at
    /// `expected_version`.
    ///
    /// Fails with `AppError::Conflict` otherwise.
    async fn delete(&self, id: &str, expected_version: i32) -> AppResult<()>;

    /// Save `complaint` and store `remark` as one unit. Neither is written
    /// when the version check fails.
    async fn save_with_remark(
        &self,
        complaint: complaint::Model,
        expected_version: i32,
        remark: complaint_remark::Model,
    ) -> AppResult<(complaint::Model, complaint_remark::Model)>;

    /// Remarks on a complaint, oldest first.
    async fn remarks(&self, complaint_id: &str) -> AppResult<Vec<complaint_remark::Model>>;
}

/// Append-only audit storage.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: audit_log::Model) -> AppResult<audit_log::Model>;

    async fn find(&self, id: &str) -> AppResult<Option<audit_log::Model>>;

    /// Newest first, with the total number matching.
    async fn query(
        &self,
        filter: &AuditLogFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<audit_log::Model>, u64)>;

    async fn count_since(&self, since: DateTime<Utc>) -> AppResult<u64>;

    async fn count_by_action(&self) -> AppResult<Vec<(AuditAction, i64)>>;

    async fn count_by_resource(&self) -> AppResult<Vec<(AuditResource, i64)>>;
}

/// Persisted notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: notification::Model) -> AppResult<notification::Model>;

    /// Newest first, with the total number matching.
    async fn list(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<notification::Model>, u64)>;

    /// Returns false when no notification with this ID belongs to the recipient.
    async fn mark_read(&self, id: &str, recipient_id: &str) -> AppResult<bool>;

    async fn mark_all_read(&self, recipient_id: &str) -> AppResult<u64>;

    async fn count_unread(&self, recipient_id: &str) -> AppResult<u64>;
}

/// Identity and role lookup.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find(&self, id: &str) -> AppResult<Option<user::Model>>;

    /// Active, approved admins.
    async fn active_admins(&self) -> AppResult<Vec<user::Model>>;

    /// IDs of users whose name or email contains `query`.
    async fn ids_matching(&self, query: &str) -> AppResult<Vec<String>>;
}

#[async_trait]
impl ComplaintStore for ComplaintRepository {
    async fn insert(&self, complaint: complaint::Model) -> AppResult<complaint::Model> {
        self.create(complaint).await
    }

    async fn find(&self, id: &str) -> AppResult<Option<complaint::Model>> {
        self.find_by_id(id).await
    }

    async fn save(
        &self,
        complaint: complaint::Model,
        expected_version: i32,
    ) -> AppResult<complaint::Model> {
        self.update_versioned(complaint, expected_version).await
    }

    async fn list(
        &self,
        filter: &ComplaintFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<complaint::Model>, u64)> {
        let items = self.find_filtered(filter, limit, offset).await?;
        let total = self.count_filtered(filter).await?;
        Ok((items, total))
    }

    async fn delete(&self, id: &str, expected_version: i32) -> AppResult<()> {
        self.delete_versioned(id, expected_version).await
    }

    async fn save_with_remark(
        &self,
        complaint: complaint::Model,
        expected_version: i32,
        remark: complaint_remark::Model,
    ) -> AppResult<(complaint::Model, complaint_remark::Model)> {
        self.update_versioned_with_remark(
            complaint,
            expected_version,
            remark.into_active_model().reset_all(),
        )
        .await
    }

    async fn remarks(&self, complaint_id: &str) -> AppResult<Vec<complaint_remark::Model>> {
        self.find_remarks(complaint_id).await
    }
}

#[async_trait]
impl AuditStore for AuditLogRepository {
    async fn append(&self, entry: audit_log::Model) -> AppResult<audit_log::Model> {
        self.create(entry.into_active_model().reset_all()).await
    }

    async fn find(&self, id: &str) -> AppResult<Option<audit_log::Model>> {
        self.find_by_id(id).await
    }

    async fn query(
        &self,
        filter: &AuditLogFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<audit_log::Model>, u64)> {
        let items = self.find_filtered(filter, limit, offset).await?;
        let total = self.count_filtered(filter).await?;
        Ok((items, total))
    }

    async fn count_since(&self, since: DateTime<Utc>) -> AppResult<u64> {
        Self::count_since(self, since).await
    }

    async fn count_by_action(&self) -> AppResult<Vec<(AuditAction, i64)>> {
        Self::count_by_action(self).await
    }

    async fn count_by_resource(&self) -> AppResult<Vec<(AuditResource, i64)>> {
        Self::count_by_resource(self).await
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(&self, notification: notification::Model) -> AppResult<notification::Model> {
        Self::create(self, notification.into_active_model().reset_all()).await
    }

    async fn list(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<notification::Model>, u64)> {
        let items = self
            .find_by_recipient(recipient_id, unread_only, limit, offset)
            .await?;
        let total = self.count_by_recipient(recipient_id, unread_only).await?;
        Ok((items, total))
    }

    async fn mark_read(&self, id: &str, recipient_id: &str) -> AppResult<bool> {
        self.mark_as_read(id, recipient_id).await
    }

    async fn mark_all_read(&self, recipient_id: &str) -> AppResult<u64> {
        self.mark_all_as_read(recipient_id).await
    }

    async fn count_unread(&self, recipient_id: &str) -> AppResult<u64> {
        Self::count_unread(self, recipient_id).await
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find(&self, id: &str) -> AppResult<Option<user::Model>> {
        self.find_by_id(id).await
    }

    async fn active_admins(&self) -> AppResult<Vec<user::Model>> {
        self.find_active_admins().await
    }

    async fn ids_matching(&self, query: &str) -> AppResult<Vec<String>> {
        self.find_ids_matching(query).await
    }
}
