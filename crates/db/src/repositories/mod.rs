use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use unibox_core::domain::event::InteractionEvent;
use unibox_core::domain::interaction::{IdentityKey, Interaction, InteractionId, TenantId};
use unibox_core::sla::TenantSlaOverrides;

pub mod event;
pub mod interaction;
pub mod memory;
pub mod sla_override;

pub use event::SqlEventRepository;
pub use interaction::SqlInteractionRepository;
pub use memory::{InMemoryEventRepository, InMemoryInteractionRepository, InMemorySlaOverrideRepository};
pub use sla_override::SqlSlaOverrideRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait InteractionRepository: Send + Sync {
    async fn find_by_id(&self, id: &InteractionId) -> Result<Option<Interaction>, RepositoryError>;

    /// Lookup by the upsert identity key. The unique index on
    /// (tenant, marketplace, channel, external_id) makes this the
    /// idempotency check for ingestion.
    async fn find_by_identity(
        &self,
        identity: &IdentityKey,
    ) -> Result<Option<Interaction>, RepositoryError>;

    /// Insert-or-update keyed on `id`.
    async fn save(&self, interaction: Interaction) -> Result<(), RepositoryError>;

    /// Tenant records that occurred at or after `since`, newest first.
    /// Feeds the cross-channel linking window.
    async fn list_recent(
        &self,
        tenant: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, RepositoryError>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn append(&self, event: InteractionEvent) -> Result<(), RepositoryError>;

    async fn list_for_interaction(
        &self,
        interaction_id: &InteractionId,
    ) -> Result<Vec<InteractionEvent>, RepositoryError>;
}

#[async_trait]
pub trait SlaOverrideRepository: Send + Sync {
    async fn get(&self, tenant: &TenantId) -> Result<Option<TenantSlaOverrides>, RepositoryError>;

    async fn set(
        &self,
        tenant: &TenantId,
        overrides: &TenantSlaOverrides,
    ) -> Result<(), RepositoryError>;
}
