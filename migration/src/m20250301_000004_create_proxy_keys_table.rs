use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProxyKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProxyKeys::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProxyKeys::Name).string().not_null())
                    .col(
                        ColumnDef::new(ProxyKeys::Key)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ProxyKeys::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ProxyKeys::AllowAllModels)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ProxyKeys::AllowedChannelIds)
                            .json()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProxyKeys::AllowedModelIds).json().not_null())
                    .col(ColumnDef::new(ProxyKeys::LastUsedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ProxyKeys::UsageCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProxyKeys::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProxyKeys::UpdatedAt)
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
            .drop_table(Table::drop().table(ProxyKeys::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProxyKeys {
    Table,
    Id,
    Name,
    Key,
    Enabled,
    AllowAllModels,
    AllowedChannelIds,
    AllowedModelIds,
    LastUsedAt,
    UsageCount,
    CreatedAt,
    UpdatedAt,
}
