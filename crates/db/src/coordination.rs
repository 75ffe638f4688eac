//! Shared-store implementations of the coordination traits.
//!
//! Every counter and lock mutation is an atomic SQL statement so concurrent
//! workers on different nodes observe the same state; counter increments
//! also sweep buckets that have fallen behind the rate window.

use sqlx::Row;

use unibox_core::coordination::{CoordinationError, RateCounterStore, SyncLockStore};
use unibox_core::domain::interaction::TenantId;

use crate::DbPool;

pub struct SqlRateCounterStore {
    pool: DbPool,
}

impl SqlRateCounterStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RateCounterStore for SqlRateCounterStore {
    async fn increment(&self, tenant: &TenantId, minute: i64) -> Result<u32, CoordinationError> {
        // Only the current bucket is ever consulted; sweep everything older
        // than the previous minute so the table stays bounded.
        sqlx::query("DELETE FROM rate_counters WHERE minute < ?")
            .bind(minute - 1)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        let row = sqlx::query(
            "INSERT INTO rate_counters (tenant_id, minute, count)
             VALUES (?, ?, 1)
             ON CONFLICT(tenant_id, minute) DO UPDATE SET count = count + 1
             RETURNING count",
        )
        .bind(&tenant.0)
        .bind(minute)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let count = row.try_get::<i64, _>("count").map_err(backend)?;
        u32::try_from(count)
            .map_err(|_| CoordinationError::Backend(format!("counter out of range: {count}")))
    }

    async fn rollback(&self, tenant: &TenantId, minute: i64) -> Result<(), CoordinationError> {
        sqlx::query(
            "UPDATE rate_counters
             SET count = MAX(count - 1, 0)
             WHERE tenant_id = ? AND minute = ?",
        )
        .bind(&tenant.0)
        .bind(minute)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

pub struct SqlSyncLockStore {
    pool: DbPool,
}

impl SqlSyncLockStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SyncLockStore for SqlSyncLockStore {
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        holder: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, CoordinationError> {
        let now = chrono::Utc::now();
        let expires_at = now + ttl;

        // The conditional upsert only steals an existing row when its TTL
        // has lapsed; rows_affected tells us whether we won.
        let result = sqlx::query(
            "INSERT INTO sync_locks (tenant_id, holder, expires_at)
             VALUES (?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                holder = excluded.holder,
                expires_at = excluded.expires_at
             WHERE sync_locks.expires_at <= ?",
        )
        .bind(&tenant.0)
        .bind(holder)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, tenant: &TenantId, holder: &str) -> Result<(), CoordinationError> {
        sqlx::query("DELETE FROM sync_locks WHERE tenant_id = ? AND holder = ?")
            .bind(&tenant.0)
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(())
    }
}

fn backend(error: sqlx::Error) -> CoordinationError {
    CoordinationError::Backend(error.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use unibox_core::coordination::{RateCounterStore, SyncLockStore};
    use unibox_core::domain::interaction::TenantId;

    use super::{SqlRateCounterStore, SqlSyncLockStore};
    use crate::migrations;
    use crate::{connect, DbPool};

    async fn setup_pool() -> DbPool {
        let config = unibox_core::config::DatabaseConfig {
            url: "sqlite::memory:?cache=shared".to_string(),
            max_connections: 1,
            timeout_secs: 30,
        };
        let pool = connect(&config).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn tenant(id: &str) -> TenantId {
        TenantId(id.to_string())
    }

    #[tokio::test]
    async fn sql_counter_increments_per_tenant_and_minute() {
        let pool = setup_pool().await;
        let counter = SqlRateCounterStore::new(pool.clone());
        let a = tenant("t-a");
        let b = tenant("t-b");

        assert_eq!(counter.increment(&a, 100).await.unwrap(), 1);
        assert_eq!(counter.increment(&a, 100).await.unwrap(), 2);
        assert_eq!(counter.increment(&b, 100).await.unwrap(), 1);
        assert_eq!(counter.increment(&a, 101).await.unwrap(), 1);

        counter.rollback(&a, 100).await.unwrap();
        assert_eq!(counter.increment(&a, 100).await.unwrap(), 2);

        // Rolling back an untouched bucket is a no-op.
        counter.rollback(&a, 999).await.unwrap();

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_counter_sweeps_buckets_behind_the_window() {
        let pool = setup_pool().await;
        let counter = SqlRateCounterStore::new(pool.clone());
        let a = tenant("t-a");

        assert_eq!(counter.increment(&a, 100).await.unwrap(), 1);
        assert_eq!(counter.increment(&a, 100).await.unwrap(), 2);
        assert_eq!(counter.increment(&a, 102).await.unwrap(), 1);

        // Bucket 100 was swept: a fresh increment starts over at 1.
        assert_eq!(counter.increment(&a, 100).await.unwrap(), 1);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rate_counters")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_lock_is_exclusive_until_released_or_expired() {
        let pool = setup_pool().await;
        let lock = SqlSyncLockStore::new(pool.clone());
        let t = tenant("t-1");
        let ttl = Duration::seconds(60);

        assert!(lock.try_acquire(&t, "worker-1", ttl).await.unwrap());
        assert!(!lock.try_acquire(&t, "worker-2", ttl).await.unwrap());

        // A non-holder release must not free the lock.
        lock.release(&t, "worker-2").await.unwrap();
        assert!(!lock.try_acquire(&t, "worker-3", ttl).await.unwrap());

        lock.release(&t, "worker-1").await.unwrap();
        assert!(lock.try_acquire(&t, "worker-2", ttl).await.unwrap());

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_lock_with_lapsed_ttl_is_stealable() {
        let pool = setup_pool().await;
        let lock = SqlSyncLockStore::new(pool.clone());
        let t = tenant("t-1");

        assert!(lock.try_acquire(&t, "dead-worker", Duration::seconds(-1)).await.unwrap());
        assert!(lock.try_acquire(&t, "worker-2", Duration::seconds(60)).await.unwrap());

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_locks_are_tenant_scoped() {
        let pool = setup_pool().await;
        let lock = SqlSyncLockStore::new(pool.clone());
        let ttl = Duration::seconds(60);

        assert!(lock.try_acquire(&tenant("t-1"), "w", ttl).await.unwrap());
        assert!(lock.try_acquire(&tenant("t-2"), "w", ttl).await.unwrap());

        pool.close().await;
    }
}
