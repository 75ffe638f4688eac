pub mod config;
pub mod coordination;
pub mod domain;
pub mod guardrails;
pub mod health;
pub mod intent;
pub mod linking;
pub mod sla;

pub use coordination::{
    minute_bucket, CoordinationError, InProcessRateCounter, InProcessSyncLock, RateCounterStore,
    SyncLockStore,
};
pub use domain::event::InteractionEvent;
pub use domain::interaction::{
    content_fingerprint, Channel, ExtensionBag, IdentityKey, Interaction, InteractionId,
    InteractionStatus, Marketplace, Priority, ReplySource, TenantId,
};
pub use domain::link::{action_policy, ActionMode, LinkCandidate, LinkType};
pub use domain::metrics::SyncMetrics;
pub use guardrails::{sanitize, GuardrailValidator, RuleCategory, RuleFinding, ValidationOutcome};
pub use health::{derive_alerts, AlertSeverity, HealthAlert, HealthThresholds};
pub use intent::{ClassificationMethod, IntentLabel, RuleClassifier};
pub use linking::{LinkingConfig, LinkingEngine};
pub use sla::{default_table, resolve, resolve_table, SlaPolicy, SlaResolution, TenantSlaOverrides};
