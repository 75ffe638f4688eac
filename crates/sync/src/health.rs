//! Process-memory registry of recent run outcomes.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use unibox_core::domain::interaction::{Channel, TenantId};
use unibox_core::domain::metrics::SyncMetrics;
use unibox_core::health::{derive_alerts, HealthAlert, HealthThresholds};

/// Runs retained per (tenant, channel).
pub const WINDOW_CAP: usize = 10;

#[derive(Clone, Debug)]
pub struct HealthReportEntry {
    pub tenant_id: TenantId,
    pub channel: Channel,
    pub runs: usize,
    pub alerts: Vec<HealthAlert>,
}

/// Ring buffers of the last [`WINDOW_CAP`] runs per (tenant, channel).
/// Memory only: after a restart every window is empty ("no data yet").
#[derive(Default)]
pub struct HealthRegistry {
    windows: Mutex<BTreeMap<(String, &'static str), VecDeque<SyncMetrics>>>,
    thresholds: HealthThresholds,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: HealthThresholds) -> Self {
        Self { windows: Mutex::new(BTreeMap::new()), thresholds }
    }

    pub fn record(&self, metrics: SyncMetrics) {
        let key = (metrics.tenant_id.0.clone(), metrics.channel.as_str());
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(key).or_default();
        if window.len() == WINDOW_CAP {
            window.pop_front();
        }
        window.push_back(metrics);
    }

    /// Retained runs for one (tenant, channel), oldest first.
    pub fn window(&self, tenant: &TenantId, channel: Channel) -> Vec<SyncMetrics> {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows
            .get(&(tenant.0.clone(), channel.as_str()))
            .map(|window| window.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn alerts(&self, tenant: &TenantId, channel: Channel, now: DateTime<Utc>) -> Vec<HealthAlert> {
        derive_alerts(&self.window(tenant, channel), now, &self.thresholds)
    }

    /// Alerts for every (tenant, channel) pair seen since startup.
    pub fn report(&self, now: DateTime<Utc>) -> Vec<HealthReportEntry> {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows
            .values()
            .filter_map(|window| {
                let latest = window.back()?;
                let runs: Vec<SyncMetrics> = window.iter().cloned().collect();
                Some(HealthReportEntry {
                    tenant_id: latest.tenant_id.clone(),
                    channel: latest.channel,
                    runs: runs.len(),
                    alerts: derive_alerts(&runs, now, &self.thresholds),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use unibox_core::domain::interaction::{Channel, TenantId};
    use unibox_core::domain::metrics::SyncMetrics;

    use super::{HealthRegistry, WINDOW_CAP};

    fn run(tenant: &str, channel: Channel, fetched: u64, errors: u64) -> SyncMetrics {
        let mut metrics = SyncMetrics::begin(TenantId(tenant.to_string()), channel);
        metrics.fetched = fetched;
        metrics.errors = errors;
        metrics.finish();
        metrics
    }

    #[test]
    fn window_is_bounded_and_ordered() {
        let registry = HealthRegistry::new();
        let tenant = TenantId("t-1".to_string());

        for index in 0..(WINDOW_CAP as u64 + 5) {
            registry.record(run("t-1", Channel::Review, index, 0));
        }

        let window = registry.window(&tenant, Channel::Review);
        assert_eq!(window.len(), WINDOW_CAP);
        assert_eq!(window.first().map(|m| m.fetched), Some(5));
        assert_eq!(window.last().map(|m| m.fetched), Some(WINDOW_CAP as u64 + 4));
    }

    #[test]
    fn windows_are_scoped_per_tenant_and_channel() {
        let registry = HealthRegistry::new();
        registry.record(run("t-1", Channel::Review, 1, 0));
        registry.record(run("t-1", Channel::Chat, 2, 0));
        registry.record(run("t-2", Channel::Review, 3, 0));

        assert_eq!(registry.window(&TenantId("t-1".to_string()), Channel::Review).len(), 1);
        assert_eq!(registry.window(&TenantId("t-1".to_string()), Channel::Chat).len(), 1);
        assert_eq!(registry.window(&TenantId("t-2".to_string()), Channel::Review).len(), 1);
        assert!(registry.window(&TenantId("t-2".to_string()), Channel::Chat).is_empty());
    }

    #[test]
    fn report_covers_every_seen_pair() {
        let registry = HealthRegistry::new();
        let now = Utc::now() + Duration::minutes(20);

        registry.record(run("t-1", Channel::Review, 10, 10));
        registry.record(run("t-2", Channel::Chat, 10, 0));

        let report = registry.report(now);
        assert_eq!(report.len(), 2);
        // Both windows are stale at `now`; the erroring one also alerts on
        // its error rate.
        let erroring = report
            .iter()
            .find(|entry| entry.tenant_id.0 == "t-1")
            .expect("t-1 entry present");
        assert!(erroring.alerts.iter().any(|alert| alert.code == "error_rate"));
    }
}
