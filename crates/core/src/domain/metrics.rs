use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::interaction::{Channel, TenantId};

/// Error detail stored on a failed run is truncated to keep metrics bounded.
pub const ERROR_DETAIL_MAX: usize = 500;

/// Outcome of one ingestion run for a (tenant, channel) pair.
///
/// Held only in the process-memory health ring buffer; a restart means
/// "no data yet" for health purposes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub run_id: String,
    pub tenant_id: TenantId,
    pub channel: Channel,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub rate_limited: bool,
    pub error_detail: Option<String>,
}

impl SyncMetrics {
    pub fn begin(tenant_id: TenantId, channel: Channel) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            tenant_id,
            channel,
            started_at: now,
            finished_at: now,
            fetched: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            errors: 0,
            rate_limited: false,
            error_detail: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn record_failure(&mut self, detail: &str) {
        self.errors += 1;
        self.error_detail = Some(truncate_detail(detail));
        self.finish();
    }
}

pub fn truncate_detail(detail: &str) -> String {
    if detail.len() <= ERROR_DETAIL_MAX {
        return detail.to_string();
    }
    let mut cut = ERROR_DETAIL_MAX;
    while !detail.is_char_boundary(cut) {
        cut -= 1;
    }
    detail[..cut].to_string()
}
