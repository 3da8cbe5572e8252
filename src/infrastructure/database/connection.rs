use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use super::migrations::{all_embedded_migrations, Migrator};

/// Owns the SQLite connection pool. WAL mode is enabled so the worker and
/// heartbeat processes can run concurrently against one database file
/// (§5's "parallelism across processes is expected").
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("invalid sqlite connection string")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to connect to sqlite database")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<usize> {
        let migrator = Migrator::new(self.pool.clone());
        let applied = migrator
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .context("failed to run database migrations")?;
        Ok(applied)
    }
}
