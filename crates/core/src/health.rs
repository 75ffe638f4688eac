//! Sync health alert derivation.
//!
//! Alerts are pure functions of a bounded window of run outcomes, oldest
//! first. There is no mutable alert state anywhere; callers re-derive on
//! every read. An empty window means "no data yet" and raises nothing.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::metrics::SyncMetrics;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthAlert {
    pub severity: AlertSeverity,
    pub code: &'static str,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct HealthThresholds {
    pub stale_warning: Duration,
    pub stale_critical: Duration,
    pub error_rate_warning: f64,
    pub error_rate_critical: f64,
    pub rate_limited_lookback: usize,
    pub empty_fetch_runs: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            stale_warning: Duration::minutes(5),
            stale_critical: Duration::minutes(15),
            error_rate_warning: 0.2,
            error_rate_critical: 0.5,
            rate_limited_lookback: 3,
            empty_fetch_runs: 3,
        }
    }
}

pub fn derive_alerts(
    window: &[SyncMetrics],
    now: DateTime<Utc>,
    thresholds: &HealthThresholds,
) -> Vec<HealthAlert> {
    let mut alerts = Vec::new();
    let Some(latest) = window.last() else {
        return alerts;
    };

    let age = now - latest.finished_at;
    if age > thresholds.stale_critical {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Critical,
            code: "sync_stale",
            message: format!("last run finished {} minutes ago", age.num_minutes()),
        });
    } else if age > thresholds.stale_warning {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Warning,
            code: "sync_stale",
            message: format!("last run finished {} minutes ago", age.num_minutes()),
        });
    }

    let failed = window.iter().filter(|run| run.errors > 0).count() as f64;
    let error_rate = failed / window.len() as f64;
    if error_rate > thresholds.error_rate_critical {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Critical,
            code: "error_rate",
            message: format!("{:.0}% of recent runs failed", error_rate * 100.0),
        });
    } else if error_rate > thresholds.error_rate_warning {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Warning,
            code: "error_rate",
            message: format!("{:.0}% of recent runs failed", error_rate * 100.0),
        });
    }

    let lookback = window.len().saturating_sub(thresholds.rate_limited_lookback);
    if window[lookback..].iter().any(|run| run.rate_limited) {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Warning,
            code: "rate_limited",
            message: "a recent run hit the marketplace rate limit".to_string(),
        });
    }

    // fetched=0 with no errors can mean the upstream silently returns empty
    // pages; only consecutive trailing runs count.
    let empty_streak = window
        .iter()
        .rev()
        .take_while(|run| run.fetched == 0 && run.errors == 0)
        .count();
    if empty_streak >= thresholds.empty_fetch_runs {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Warning,
            code: "empty_fetches",
            message: format!("{empty_streak} consecutive runs fetched zero records"),
        });
    }

    alerts
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{derive_alerts, AlertSeverity, HealthThresholds};
    use crate::domain::interaction::{Channel, TenantId};
    use crate::domain::metrics::SyncMetrics;

    fn run(minutes_ago: i64, fetched: u64, errors: u64, rate_limited: bool) -> SyncMetrics {
        let mut metrics = SyncMetrics::begin(TenantId("t-1".to_string()), Channel::Review);
        metrics.started_at = Utc::now() - Duration::minutes(minutes_ago + 1);
        metrics.finished_at = Utc::now() - Duration::minutes(minutes_ago);
        metrics.fetched = fetched;
        metrics.errors = errors;
        metrics.rate_limited = rate_limited;
        metrics
    }

    fn codes(alerts: &[super::HealthAlert]) -> Vec<&'static str> {
        alerts.iter().map(|alert| alert.code).collect()
    }

    #[test]
    fn empty_window_raises_nothing() {
        let alerts = derive_alerts(&[], Utc::now(), &HealthThresholds::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn stale_runs_escalate_from_warning_to_critical() {
        let thresholds = HealthThresholds::default();

        let fresh = derive_alerts(&[run(1, 10, 0, false)], Utc::now(), &thresholds);
        assert!(!codes(&fresh).contains(&"sync_stale"));

        let warning = derive_alerts(&[run(8, 10, 0, false)], Utc::now(), &thresholds);
        let stale: Vec<_> =
            warning.iter().filter(|alert| alert.code == "sync_stale").collect();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].severity, AlertSeverity::Warning);

        let critical = derive_alerts(&[run(20, 10, 0, false)], Utc::now(), &thresholds);
        let stale: Vec<_> =
            critical.iter().filter(|alert| alert.code == "sync_stale").collect();
        assert_eq!(stale[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn error_rate_thresholds_apply_over_the_whole_window() {
        let thresholds = HealthThresholds::default();

        // 3 of 10 failed: 30% -> warning.
        let mut window: Vec<_> = (0..7).map(|_| run(1, 5, 0, false)).collect();
        window.extend((0..3).map(|_| run(1, 0, 1, false)));
        let alerts = derive_alerts(&window, Utc::now(), &thresholds);
        let error_alerts: Vec<_> =
            alerts.iter().filter(|alert| alert.code == "error_rate").collect();
        assert_eq!(error_alerts[0].severity, AlertSeverity::Warning);

        // 6 of 10 failed: 60% -> critical.
        let mut window: Vec<_> = (0..4).map(|_| run(1, 5, 0, false)).collect();
        window.extend((0..6).map(|_| run(1, 0, 1, false)));
        let alerts = derive_alerts(&window, Utc::now(), &thresholds);
        let error_alerts: Vec<_> =
            alerts.iter().filter(|alert| alert.code == "error_rate").collect();
        assert_eq!(error_alerts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn rate_limit_warning_looks_at_last_three_runs_only() {
        let thresholds = HealthThresholds::default();

        let window =
            vec![run(4, 5, 0, true), run(3, 5, 0, false), run(2, 5, 0, false), run(1, 5, 0, false)];
        let alerts = derive_alerts(&window, Utc::now(), &thresholds);
        assert!(!codes(&alerts).contains(&"rate_limited"));

        let window = vec![run(3, 5, 0, false), run(2, 5, 0, true), run(1, 5, 0, false)];
        let alerts = derive_alerts(&window, Utc::now(), &thresholds);
        assert!(codes(&alerts).contains(&"rate_limited"));
    }

    #[test]
    fn silent_empty_fetches_need_three_consecutive_runs() {
        let thresholds = HealthThresholds::default();

        let window = vec![run(3, 0, 0, false), run(2, 0, 0, false), run(1, 0, 0, false)];
        let alerts = derive_alerts(&window, Utc::now(), &thresholds);
        assert!(codes(&alerts).contains(&"empty_fetches"));

        // A non-empty run in between resets the streak.
        let window = vec![run(3, 0, 0, false), run(2, 4, 0, false), run(1, 0, 0, false)];
        let alerts = derive_alerts(&window, Utc::now(), &thresholds);
        assert!(!codes(&alerts).contains(&"empty_fetches"));

        // Empty runs with errors are counted by the error-rate rule instead.
        let window = vec![run(3, 0, 1, false), run(2, 0, 1, false), run(1, 0, 1, false)];
        let alerts = derive_alerts(&window, Utc::now(), &thresholds);
        assert!(!codes(&alerts).contains(&"empty_fetches"));
    }
}
