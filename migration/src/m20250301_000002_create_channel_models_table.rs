use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChannelModels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChannelModels::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChannelModels::ChannelId).integer().not_null())
                    .col(ColumnDef::new(ChannelModels::ModelName).string().not_null())
                    .col(
                        ColumnDef::new(ChannelModels::DetectedEndpoints)
                            .json()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChannelModels::LastStatus).boolean())
                    .col(ColumnDef::new(ChannelModels::LastLatencyMs).integer())
                    .col(ColumnDef::new(ChannelModels::LastCheckedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ChannelModels::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ChannelModels::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_channel_models_channel_id")
                            .from(ChannelModels::Table, ChannelModels::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uk_channel_models_channel_id_model_name")
                    .table(ChannelModels::Table)
                    .col(ChannelModels::ChannelId)
                    .col(ChannelModels::ModelName)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChannelModels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ChannelModels {
    Table,
    Id,
    ChannelId,
    ModelName,
    DetectedEndpoints,
    LastStatus,
    LastLatencyMs,
    LastCheckedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Channels {
    Table,
    Id,
}
