pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_channels_table;
mod m20250301_000002_create_channel_models_table;
mod m20250301_000003_create_probe_logs_table;
mod m20250301_000004_create_proxy_keys_table;
mod m20250301_000005_create_scheduler_configs_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_channels_table::Migration),
            Box::new(m20250301_000002_create_channel_models_table::Migration),
            Box::new(m20250301_000003_create_probe_logs_table::Migration),
            Box::new(m20250301_000004_create_proxy_keys_table::Migration),
            Box::new(m20250301_000005_create_scheduler_configs_table::Migration),
        ]
    }
}
