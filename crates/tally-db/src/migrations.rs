//! Embedded schema migrations.
//!
//! SQL files under `crates/tally-db/migrations/` are compiled into the binary
//! and applied in filename order on every connect. sqlx records each one in
//! `_sqlx_migrations` along with its checksum, so editing an applied file
//! fails startup. Schema changes go in a new `NNN_description.sql`.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Applies whatever the database hasn't seen yet.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    debug!(embedded = MIGRATOR.migrations.len(), "Applying migrations");
    MIGRATOR.run(pool).await?;
    info!("Schema up to date");
    Ok(())
}

/// Whether every embedded migration has been recorded as applied.
pub async fn is_up_to_date(pool: &SqlitePool) -> DbResult<bool> {
    let applied: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(applied as usize == MIGRATOR.migrations.len())
}
