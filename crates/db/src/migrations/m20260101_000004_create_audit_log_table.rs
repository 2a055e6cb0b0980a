//! Create audit log table migration.
//!
//! No foreign keys: entries must outlive the users and complaints they
//! mention.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuditLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuditLog::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuditLog::ActorId).string_len(32))
                    .col(ColumnDef::new(AuditLog::ActorRole).string_len(16))
                    .col(ColumnDef::new(AuditLog::Action).string_len(48).not_null())
                    .col(ColumnDef::new(AuditLog::Resource).string_len(32).not_null())
                    .col(ColumnDef::new(AuditLog::ResourceId).string_len(64))
                    .col(ColumnDef::new(AuditLog::TargetIdDisplay).string_len(64))
                    .col(ColumnDef::new(AuditLog::Details).text())
                    .col(ColumnDef::new(AuditLog::Metadata).json_binary())
                    .col(ColumnDef::new(AuditLog::Status).string_len(16).not_null())
                    .col(ColumnDef::new(AuditLog::CorrelationId).string_len(64))
                    .col(ColumnDef::new(AuditLog::IpAddress).string_len(64))
                    .col(ColumnDef::new(AuditLog::UserAgent).text())
                    .col(
                        ColumnDef::new(AuditLog::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: created_at (newest first listing, today's count)
        manager
            .create_index(
                Index::create()
                    .name("idx_audit_log_created_at")
                    .table(AuditLog::Table)
                    .col(AuditLog::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: actor_id (filter by actor)
        manager
            .create_index(
                Index::create()
                    .name("idx_audit_log_actor_id")
                    .table(AuditLog::Table)
                    .col(AuditLog::ActorId)
                    .to_owned(),
            )
            .await?;

        // Index: (resource, resource_id) (history of one complaint)
        manager
            .create_index(
                Index::create()
                    .name("idx_audit_log_resource")
                    .table(AuditLog::Table)
                    .col(AuditLog::Resource)
                    .col(AuditLog::ResourceId)
                    .to_owned(),
            )
            .await?;

        // Index: action (breakdown stats)
        manager
            .create_index(
                Index::create()
                    .name("idx_audit_log_action")
                    .table(AuditLog::Table)
                    .col(AuditLog::Action)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AuditLog {
    Table,
    Id,
    ActorId,
    ActorRole,
    Action,
    Resource,
    ResourceId,
    TargetIdDisplay,
    Details,
    Metadata,
    Status,
    CorrelationId,
    IpAddress,
    UserAgent,
    CreatedAt,
}
