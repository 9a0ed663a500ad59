use sqlx::migrate::{MigrateError, Migrator};
use sqlx::SqliteConnection;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Tables and indexes the ERP schema is expected to carry.
pub const SCHEMA_OBJECTS: &[&str] =
    &["products", "inventory_logs", "idx_products_sku", "idx_inventory_logs_product"];

pub async fn run_pending(conn: &mut SqliteConnection) -> Result<(), MigrateError> {
    MIGRATOR.run(conn).await
}
