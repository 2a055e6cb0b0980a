//! Create complaint remark table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ComplaintRemark::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ComplaintRemark::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ComplaintRemark::ComplaintId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ComplaintRemark::AuthorId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ComplaintRemark::Comment).text().not_null())
                    .col(
                        ColumnDef::new(ComplaintRemark::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_complaint_remark_complaint")
                            .from(ComplaintRemark::Table, ComplaintRemark::ComplaintId)
                            .to(Complaint::Table, Complaint::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_complaint_remark_complaint_id")
                    .table(ComplaintRemark::Table)
                    .col(ComplaintRemark::ComplaintId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ComplaintRemark::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ComplaintRemark {
    Table,
    Id,
    ComplaintId,
    AuthorId,
    Comment,
    CreatedAt,
}

#[derive(Iden)]
enum Complaint {
    Table,
    Id,
}
