use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Listing is newest-first, statistics group by action type.
        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_timestamp")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::Timestamp)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_action_type")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::ActionType)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_target_object")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::TargetObject)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_audit_logs_timestamp",
            "idx_audit_logs_action_type",
            "idx_audit_logs_target_object",
        ] {
            manager
                .drop_index(Index::drop().name(name).table(AuditLogs::Table).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(Iden)]
enum AuditLogs {
    Table,
    Timestamp,
    ActionType,
    TargetObject,
}
