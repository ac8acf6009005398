use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SchedulerConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SchedulerConfigs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::Enabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::CronExpr)
                            .string()
                            .not_null()
                            .default("0 3 * * *"),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::Timezone)
                            .string()
                            .not_null()
                            .default("UTC"),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::ChannelConcurrency)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::GlobalConcurrency)
                            .integer()
                            .not_null()
                            .default(30),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::MinDelayMs)
                            .integer()
                            .not_null()
                            .default(3000),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::MaxDelayMs)
                            .integer()
                            .not_null()
                            .default(5000),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::ProbeAll)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::SelectedChannelIds)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::SelectedModelIds)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SchedulerConfigs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SchedulerConfigs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SchedulerConfigs {
    Table,
    Id,
    Enabled,
    CronExpr,
    Timezone,
    ChannelConcurrency,
    GlobalConcurrency,
    MinDelayMs,
    MaxDelayMs,
    ProbeAll,
    SelectedChannelIds,
    SelectedModelIds,
    UpdatedAt,
}
