//! Notification entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    #[sea_orm(string_value = "complaint_created")]
    ComplaintCreated,
    #[sea_orm(string_value = "status_updated")]
    StatusUpdated,
    #[sea_orm(string_value = "remark_added")]
    RemarkAdded,
    #[sea_orm(string_value = "resolution_confirmed")]
    ResolutionConfirmed,
    #[sea_orm(string_value = "complaint_reopened")]
    ComplaintReopened,
    #[sea_orm(string_value = "complaint_assigned")]
    ComplaintAssigned,
}

impl NotificationType {
    /// Wire name, also used as the real-time event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ComplaintCreated => "complaint_created",
            Self::StatusUpdated => "status_updated",
            Self::RemarkAdded => "remark_added",
            Self::ResolutionConfirmed => "resolution_confirmed",
            Self::ComplaintReopened => "complaint_reopened",
            Self::ComplaintAssigned => "complaint_assigned",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user receiving the notification
    pub recipient_id: String,

    /// Related complaint. Kept after the complaint is purged.
    #[sea_orm(nullable)]
    pub complaint_id: Option<String>,

    pub notification_type: NotificationType,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    #[sea_orm(default_value = false)]
    pub is_read: bool,

    /// e.g. old and new status
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<Json>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::RecipientId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Recipient,
}

impl ActiveModelBehavior for ActiveModel {}
