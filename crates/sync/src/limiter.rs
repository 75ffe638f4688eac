//! Per-tenant admission control for outbound marketplace requests.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use unibox_core::coordination::{minute_bucket, RateCounterStore, SyncLockStore};
use unibox_core::domain::interaction::TenantId;

use crate::error::SyncError;

/// Sliding-window limiter over a shared counter store. Admission increments
/// the (tenant, minute) bucket first; an over-budget increment is rolled back
/// and the caller parks until the window drains.
pub struct SlidingWindowRateLimiter {
    counter: Arc<dyn RateCounterStore>,
    budget: u32,
    wait: Duration,
}

impl SlidingWindowRateLimiter {
    pub fn new(counter: Arc<dyn RateCounterStore>, budget: u32, wait: Duration) -> Self {
        Self { counter, budget: budget.max(1), wait }
    }

    /// Block until the tenant has request budget. Tenants never wait on each
    /// other; only this tenant's bucket is consulted.
    pub async fn acquire(&self, tenant: &TenantId) -> Result<(), SyncError> {
        loop {
            let minute = minute_bucket(chrono::Utc::now());
            let count = self.counter.increment(tenant, minute).await?;
            if count <= self.budget {
                return Ok(());
            }

            self.counter.rollback(tenant, minute).await?;
            debug!(
                tenant = tenant.0,
                count,
                budget = self.budget,
                wait_ms = self.wait.as_millis() as u64,
                "rate budget exhausted, waiting"
            );
            tokio::time::sleep(self.wait).await;
        }
    }
}

/// Holder-tagged, TTL-bounded mutual exclusion for one tenant's sync runs.
pub struct TenantSyncLock {
    store: Arc<dyn SyncLockStore>,
    ttl: chrono::Duration,
}

impl TenantSyncLock {
    pub fn new(store: Arc<dyn SyncLockStore>, ttl: chrono::Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn try_acquire(&self, tenant: &TenantId, holder: &str) -> Result<bool, SyncError> {
        Ok(self.store.try_acquire(tenant, holder, self.ttl).await?)
    }

    pub async fn release(&self, tenant: &TenantId, holder: &str) -> Result<(), SyncError> {
        Ok(self.store.release(tenant, holder).await?)
    }
}
