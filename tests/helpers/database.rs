use conclave_core::infrastructure::database::DatabaseConnection;
use sqlx::SqlitePool;

/// Fresh in-memory SQLite database with migrations applied.
#[allow(dead_code)]
pub async fn setup_test_db() -> SqlitePool {
    let db_conn = DatabaseConnection::new("sqlite::memory:", 1)
        .await
        .expect("failed to create test database");

    db_conn.migrate().await.expect("failed to run migrations");

    db_conn.pool().clone()
}
