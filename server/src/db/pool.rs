//! Database connection pool management.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Type alias for the database pool.
pub type Pool = PgPool;

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

fn options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

/// Connect a pool, failing fast when the database is unreachable.
pub async fn create_pool(database_url: &str) -> Result<Pool, sqlx::Error> {
    options().connect(database_url).await
}

/// Build a pool that connects on first use.
pub fn create_lazy_pool(database_url: &str) -> Result<Pool, sqlx::Error> {
    options().connect_lazy(database_url)
}

/// Apply the `records` table migrations.
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
