use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProbeLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProbeLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProbeLogs::ModelId).integer().not_null())
                    .col(ColumnDef::new(ProbeLogs::EndpointType).string().not_null())
                    .col(ColumnDef::new(ProbeLogs::Success).boolean().not_null())
                    .col(
                        ColumnDef::new(ProbeLogs::LatencyMs)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ProbeLogs::UpstreamStatus).integer())
                    .col(ColumnDef::new(ProbeLogs::ErrorMessage).text())
                    .col(ColumnDef::new(ProbeLogs::ResponsePreview).text())
                    .col(
                        ColumnDef::new(ProbeLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_probe_logs_model_id")
                            .from(ProbeLogs::Table, ProbeLogs::ModelId)
                            .to(ChannelModels::Table, ChannelModels::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_probe_logs_model_id_created_at")
                    .table(ProbeLogs::Table)
                    .col(ProbeLogs::ModelId)
                    .col(ProbeLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_probe_logs_created_at")
                    .table(ProbeLogs::Table)
                    .col(ProbeLogs::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProbeLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProbeLogs {
    Table,
    Id,
    ModelId,
    EndpointType,
    Success,
    LatencyMs,
    UpstreamStatus,
    ErrorMessage,
    ResponsePreview,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ChannelModels {
    Table,
    Id,
}
