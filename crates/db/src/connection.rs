use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use unibox_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Open a SQLite pool sized from the database section of the app config.
///
/// Every connection gets foreign keys, WAL journaling, and a busy timeout
/// derived from the configured acquire timeout, so concurrent sync workers
/// queue on the write lock instead of failing with SQLITE_BUSY.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let timeout_secs = config.timeout_secs.max(1);
    let busy_timeout_ms = timeout_secs.saturating_mul(1000);
    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
}
