//! Shared coordination primitives for concurrent sync workers.
//!
//! The rate counter and sync lock are modeled as explicit distributed
//! abstractions with pluggable backends: the in-process implementations here
//! serve single-node deployments and tests, and the db crate provides
//! shared-store implementations with an identical surface for multi-worker
//! setups. A process-local counter or mutex alone is incorrect with more
//! than one worker.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::domain::interaction::TenantId;

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("coordination backend failure: {0}")]
    Backend(String),
}

/// The epoch-minute bucket the sliding-window limiter counts against.
pub fn minute_bucket(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(60)
}

/// Shared counter keyed by (tenant, minute). Increment and rollback must be
/// atomic so two workers cannot both believe they have budget.
#[async_trait]
pub trait RateCounterStore: Send + Sync {
    /// Atomically increment and return the new value.
    async fn increment(
        &self,
        tenant: &TenantId,
        minute: i64,
    ) -> Result<u32, CoordinationError>;

    /// Undo one increment after an over-budget admission attempt.
    async fn rollback(&self, tenant: &TenantId, minute: i64) -> Result<(), CoordinationError>;
}

/// Time-boxed mutually-exclusive lock per tenant. `try_acquire` never blocks;
/// a dead holder's TTL bounds staleness.
#[async_trait]
pub trait SyncLockStore: Send + Sync {
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    /// Releasing a lock that was never acquired, or that another holder has
    /// since taken over, is a no-op.
    async fn release(&self, tenant: &TenantId, holder: &str) -> Result<(), CoordinationError>;
}

#[derive(Default)]
pub struct InProcessRateCounter {
    counts: Mutex<HashMap<(String, i64), u32>>,
}

impl InProcessRateCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCounterStore for InProcessRateCounter {
    async fn increment(
        &self,
        tenant: &TenantId,
        minute: i64,
    ) -> Result<u32, CoordinationError> {
        let mut counts = self.counts.lock().map_err(|_| poisoned())?;
        // The limiter only ever consults the current bucket; sweep anything
        // older than the previous minute so the map stays bounded.
        counts.retain(|(_, bucket), _| *bucket + 1 >= minute);
        let entry = counts.entry((tenant.0.clone(), minute)).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn rollback(&self, tenant: &TenantId, minute: i64) -> Result<(), CoordinationError> {
        let mut counts = self.counts.lock().map_err(|_| poisoned())?;
        if let Some(entry) = counts.get_mut(&(tenant.0.clone(), minute)) {
            *entry = entry.saturating_sub(1);
        }
        Ok(())
    }
}

struct LockEntry {
    holder: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InProcessSyncLock {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl InProcessSyncLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncLockStore for InProcessSyncLock {
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let now = Utc::now();
        let mut locks = self.locks.lock().map_err(|_| poisoned())?;
        match locks.get(&tenant.0) {
            Some(entry) if entry.expires_at > now => Ok(false),
            _ => {
                locks.insert(
                    tenant.0.clone(),
                    LockEntry { holder: holder.to_string(), expires_at: now + ttl },
                );
                Ok(true)
            }
        }
    }

    async fn release(&self, tenant: &TenantId, holder: &str) -> Result<(), CoordinationError> {
        let mut locks = self.locks.lock().map_err(|_| poisoned())?;
        if locks.get(&tenant.0).is_some_and(|entry| entry.holder == holder) {
            locks.remove(&tenant.0);
        }
        Ok(())
    }
}

fn poisoned() -> CoordinationError {
    CoordinationError::Backend("coordination state mutex poisoned".to_string())
}
