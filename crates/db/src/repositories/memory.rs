use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use unibox_core::domain::event::InteractionEvent;
use unibox_core::domain::interaction::{IdentityKey, Interaction, InteractionId, TenantId};
use unibox_core::sla::TenantSlaOverrides;

use super::{
    EventRepository, InteractionRepository, RepositoryError, SlaOverrideRepository,
};

#[derive(Default)]
pub struct InMemoryInteractionRepository {
    interactions: RwLock<HashMap<String, Interaction>>,
}

#[async_trait::async_trait]
impl InteractionRepository for InMemoryInteractionRepository {
    async fn find_by_id(
        &self,
        id: &InteractionId,
    ) -> Result<Option<Interaction>, RepositoryError> {
        let interactions = self.interactions.read().await;
        Ok(interactions.get(&id.0).cloned())
    }

    async fn find_by_identity(
        &self,
        identity: &IdentityKey,
    ) -> Result<Option<Interaction>, RepositoryError> {
        let interactions = self.interactions.read().await;
        Ok(interactions.values().find(|candidate| &candidate.identity == identity).cloned())
    }

    async fn save(&self, interaction: Interaction) -> Result<(), RepositoryError> {
        let mut interactions = self.interactions.write().await;
        interactions.insert(interaction.id.0.clone(), interaction);
        Ok(())
    }

    async fn list_recent(
        &self,
        tenant: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let interactions = self.interactions.read().await;
        let mut recent: Vec<Interaction> = interactions
            .values()
            .filter(|candidate| {
                &candidate.identity.tenant_id == tenant && candidate.occurred_at >= since
            })
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(recent)
    }
}

#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<Vec<InteractionEvent>>,
}

#[async_trait::async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn append(&self, event: InteractionEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        events.push(event);
        Ok(())
    }

    async fn list_for_interaction(
        &self,
        interaction_id: &InteractionId,
    ) -> Result<Vec<InteractionEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| &event.interaction_id == interaction_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySlaOverrideRepository {
    overrides: RwLock<HashMap<String, TenantSlaOverrides>>,
}

#[async_trait::async_trait]
impl SlaOverrideRepository for InMemorySlaOverrideRepository {
    async fn get(&self, tenant: &TenantId) -> Result<Option<TenantSlaOverrides>, RepositoryError> {
        let overrides = self.overrides.read().await;
        Ok(overrides.get(&tenant.0).cloned())
    }

    async fn set(
        &self,
        tenant: &TenantId,
        overrides: &TenantSlaOverrides,
    ) -> Result<(), RepositoryError> {
        let mut stored = self.overrides.write().await;
        stored.insert(tenant.0.clone(), overrides.clone());
        Ok(())
    }
}
