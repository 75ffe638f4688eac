//! Ingestion and sync orchestration for unibox.
//!
//! This crate ties the channel connectors to the store: it runs the
//! per-tenant ingestion pipeline (rate limited, lock guarded, idempotent),
//! classifies intent, resolves priority and SLA deadlines, links related
//! interactions across channels, gates outbound replies behind guardrails,
//! and keeps an in-memory health window over recent runs.

pub mod classify;
pub mod error;
pub mod external;
pub mod health;
pub mod limiter;
pub mod llm;
pub mod pipeline;
pub mod reply;
pub mod service;

pub use classify::{Classifier, IntentLlm};
pub use error::SyncError;
pub use external::{CredentialStore, ProductContextProvider};
pub use health::{HealthRegistry, HealthReportEntry};
pub use limiter::{SlidingWindowRateLimiter, TenantSyncLock};
pub use llm::HttpIntentLlm;
pub use pipeline::{IngestionPipeline, PipelineDeps};
pub use reply::ReplySender;
pub use service::SyncService;
