pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_catalog_tables;
mod m20250301_000002_create_addresses_table;
mod m20250301_000003_create_cart_tables;
mod m20250301_000004_create_order_tables;
mod m20250301_000005_create_tracking_tables;
mod m20250301_000006_create_ticket_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_catalog_tables::Migration),
            Box::new(m20250301_000002_create_addresses_table::Migration),
            Box::new(m20250301_000003_create_cart_tables::Migration),
            Box::new(m20250301_000004_create_order_tables::Migration),
            Box::new(m20250301_000005_create_tracking_tables::Migration),
            Box::new(m20250301_000006_create_ticket_tables::Migration),
        ]
    }
}
