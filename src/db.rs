use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("marketplace_db")]
pub struct MarketplaceDb(sqlx::PgPool);

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
