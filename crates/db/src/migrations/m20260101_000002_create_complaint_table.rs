//! Create complaint table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Complaint::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Complaint::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Complaint::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Complaint::Description).text().not_null())
                    .col(ColumnDef::new(Complaint::Category).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Complaint::Department)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Complaint::DepartmentKey)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Complaint::Priority)
                            .string_len(16)
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(Complaint::Attachments)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Complaint::IsAnonymous)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Complaint::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending_review"),
                    )
                    .col(ColumnDef::new(Complaint::RejectionReason).text())
                    .col(ColumnDef::new(Complaint::VerificationStatus).string_len(16))
                    .col(ColumnDef::new(Complaint::VerificationComment).text())
                    .col(ColumnDef::new(Complaint::VerifiedBy).string_len(32))
                    .col(ColumnDef::new(Complaint::VerifiedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Complaint::ResolvedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Complaint::ResolutionTimeHours).double())
                    .col(
                        ColumnDef::new(Complaint::DueDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Complaint::IsOverdue)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Complaint::HoursRemaining)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Complaint::CreatorId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Complaint::AssignedTo).string_len(32))
                    .col(
                        ColumnDef::new(Complaint::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Complaint::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Complaint::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_complaint_creator")
                            .from(Complaint::Table, Complaint::CreatorId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_complaint_assignee")
                            .from(Complaint::Table, Complaint::AssignedTo)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: creator_id (student's own complaints)
        manager
            .create_index(
                Index::create()
                    .name("idx_complaint_creator_id")
                    .table(Complaint::Table)
                    .col(Complaint::CreatorId)
                    .to_owned(),
            )
            .await?;

        // Index: (department_key, status) (staff queue)
        manager
            .create_index(
                Index::create()
                    .name("idx_complaint_department_status")
                    .table(Complaint::Table)
                    .col(Complaint::DepartmentKey)
                    .col(Complaint::Status)
                    .to_owned(),
            )
            .await?;

        // Index: created_at (for pagination)
        manager
            .create_index(
                Index::create()
                    .name("idx_complaint_created_at")
                    .table(Complaint::Table)
                    .col(Complaint::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Complaint::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Complaint {
    Table,
    Id,
    Title,
    Description,
    Category,
    Department,
    DepartmentKey,
    Priority,
    Attachments,
    IsAnonymous,
    Status,
    RejectionReason,
    VerificationStatus,
    VerificationComment,
    VerifiedBy,
    VerifiedAt,
    ResolvedAt,
    ResolutionTimeHours,
    DueDate,
    IsOverdue,
    HoursRemaining,
    CreatorId,
    AssignedTo,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
