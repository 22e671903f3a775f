pub use sea_orm_migration::prelude::*;

mod m20260612_000001_create_directory_tables;
mod m20260612_000002_create_campaign_tables;
mod m20260612_000003_create_delivery_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260612_000001_create_directory_tables::Migration),
            Box::new(m20260612_000002_create_campaign_tables::Migration),
            Box::new(m20260612_000003_create_delivery_tables::Migration),
        ]
    }
}
