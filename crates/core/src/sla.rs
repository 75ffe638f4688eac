//! Priority/SLA resolution.
//!
//! A hard-coded defaults table keyed by intent, partially overridden per
//! tenant. Resolution is a pure two-layer merge so it can be unit tested
//! independent of storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::interaction::{Channel, Priority};
use crate::intent::IntentLabel;

/// Chat is a real-time surface; its deadline never exceeds this cap.
pub const CHAT_SLA_CAP_MINUTES: u32 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub priority: Priority,
    pub sla_minutes: u32,
}

/// Per-tenant partial override blob. Unspecified intents keep the defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantSlaOverrides {
    pub by_intent: BTreeMap<IntentLabel, SlaPolicy>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlaResolution {
    pub priority: Priority,
    /// None when the record needs no response, so no deadline applies.
    pub sla_minutes: Option<u32>,
}

pub fn default_table() -> BTreeMap<IntentLabel, SlaPolicy> {
    BTreeMap::from([
        (
            IntentLabel::ComplianceSafety,
            SlaPolicy { priority: Priority::Urgent, sla_minutes: 60 },
        ),
        (
            IntentLabel::PostPurchaseIssue,
            SlaPolicy { priority: Priority::High, sla_minutes: 240 },
        ),
        (
            IntentLabel::AvailabilityDelivery,
            SlaPolicy { priority: Priority::High, sla_minutes: 480 },
        ),
        (IntentLabel::SizingFit, SlaPolicy { priority: Priority::Normal, sla_minutes: 720 }),
        (
            IntentLabel::SpecCompatibility,
            SlaPolicy { priority: Priority::Normal, sla_minutes: 720 },
        ),
        (
            IntentLabel::GeneralQuestion,
            SlaPolicy { priority: Priority::Normal, sla_minutes: 1440 },
        ),
    ])
}

/// Pure merge: tenant overrides win per intent, defaults fill the rest.
pub fn resolve_table(overrides: &TenantSlaOverrides) -> BTreeMap<IntentLabel, SlaPolicy> {
    let mut table = default_table();
    for (intent, policy) in &overrides.by_intent {
        table.insert(*intent, *policy);
    }
    table
}

/// Resolve the workflow policy for one record.
///
/// Records that need no response always resolve to low priority with no
/// deadline, regardless of intent.
pub fn resolve(
    channel: Channel,
    intent: IntentLabel,
    needs_response: bool,
    overrides: &TenantSlaOverrides,
) -> SlaResolution {
    if !needs_response {
        return SlaResolution { priority: Priority::Low, sla_minutes: None };
    }

    let table = resolve_table(overrides);
    let policy = table
        .get(&intent)
        .copied()
        .unwrap_or(SlaPolicy { priority: Priority::Normal, sla_minutes: 1440 });

    let sla_minutes = match channel {
        Channel::Chat => policy.sla_minutes.min(CHAT_SLA_CAP_MINUTES),
        Channel::Review | Channel::Question => policy.sla_minutes,
    };

    SlaResolution { priority: policy.priority, sla_minutes: Some(sla_minutes) }
}
