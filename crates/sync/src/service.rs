//! The public facade over ingestion, linking, guardrails, replies, and
//! health. Callers (today the CLI, later a server surface) talk only to
//! [`SyncService`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use unibox_connectors::types::{ChannelConnector, ReplyAck};
use unibox_core::config::SyncConfig;
use unibox_core::domain::interaction::{Channel, InteractionId, TenantId};
use unibox_core::domain::link::LinkCandidate;
use unibox_core::domain::metrics::SyncMetrics;
use unibox_core::guardrails::{GuardrailValidator, ValidationOutcome};
use unibox_core::health::HealthAlert;
use unibox_core::intent::{ClassificationMethod, IntentLabel};
use unibox_core::linking::{LinkingConfig, LinkingEngine};
use unibox_db::repositories::InteractionRepository;

use crate::classify::Classifier;
use crate::error::SyncError;
use crate::health::{HealthRegistry, HealthReportEntry};
use crate::pipeline::{IngestionPipeline, PipelineDeps};
use crate::reply::ReplySender;

pub struct SyncService {
    interactions: Arc<dyn InteractionRepository>,
    pipeline: IngestionPipeline,
    reply: ReplySender,
    classifier: Arc<Classifier>,
    validator: GuardrailValidator,
    linker: LinkingEngine,
    linking: LinkingConfig,
    health: HealthRegistry,
    connectors: HashMap<Channel, Arc<dyn ChannelConnector>>,
}

impl SyncService {
    pub fn new(deps: PipelineDeps, config: &SyncConfig, linking: LinkingConfig) -> Self {
        let interactions = Arc::clone(&deps.interactions);
        let events = Arc::clone(&deps.events);
        let classifier = Arc::clone(&deps.classifier);
        let reply = ReplySender::new(Arc::clone(&interactions), events);
        let pipeline = IngestionPipeline::new(deps, config, linking.clone());
        Self {
            interactions,
            pipeline,
            reply,
            classifier,
            validator: GuardrailValidator::new(),
            linker: LinkingEngine::new(linking.clone()),
            linking,
            health: HealthRegistry::new(),
            connectors: HashMap::new(),
        }
    }

    /// One connector per channel; a later registration replaces the earlier.
    pub fn register_connector(&mut self, connector: Arc<dyn ChannelConnector>) {
        self.connectors.insert(connector.channel(), connector);
    }

    /// Run one sync for (tenant, channel). Idempotent; a concurrent second
    /// caller gets `AlreadyRunning` and no metrics entry is recorded for it.
    pub async fn sync(
        &self,
        tenant: &TenantId,
        channel: Channel,
    ) -> Result<SyncMetrics, SyncError> {
        let connector = self
            .connectors
            .get(&channel)
            .ok_or(SyncError::UnsupportedChannel(channel))?;
        let metrics = self.pipeline.run(tenant, connector.as_ref()).await?;
        self.health.record(metrics.clone());
        Ok(metrics)
    }

    /// Link candidates for one interaction, recomputed on demand against the
    /// tenant's recent window, ordered by confidence descending.
    pub async fn get_links(
        &self,
        interaction_id: &InteractionId,
    ) -> Result<Vec<LinkCandidate>, SyncError> {
        let interaction = self
            .interactions
            .find_by_id(interaction_id)
            .await?
            .ok_or_else(|| SyncError::UnknownInteraction(interaction_id.0.clone()))?;

        let now = Utc::now();
        let recent = self
            .interactions
            .list_recent(&interaction.identity.tenant_id, now - self.linking.recent_window)
            .await?;
        Ok(self.linker.candidates(&interaction, &recent, now))
    }

    pub fn validate_reply(
        &self,
        text: &str,
        channel: Channel,
        customer_text: Option<&str>,
    ) -> ValidationOutcome {
        self.validator.validate(text, channel, customer_text)
    }

    pub async fn classify(&self, text: &str) -> (IntentLabel, ClassificationMethod) {
        self.classifier.classify(text).await
    }

    pub async fn send_reply(
        &self,
        interaction_id: &InteractionId,
        text: &str,
    ) -> Result<ReplyAck, SyncError> {
        let interaction = self
            .interactions
            .find_by_id(interaction_id)
            .await?
            .ok_or_else(|| SyncError::UnknownInteraction(interaction_id.0.clone()))?;
        let channel = interaction.identity.channel;
        let connector = self
            .connectors
            .get(&channel)
            .ok_or(SyncError::UnsupportedChannel(channel))?;
        self.reply.send(connector.as_ref(), interaction_id, text).await
    }

    pub fn alerts(&self, tenant: &TenantId, channel: Channel) -> Vec<HealthAlert> {
        self.health.alerts(tenant, channel, Utc::now())
    }

    pub fn health_report(&self) -> Vec<HealthReportEntry> {
        self.health.report(Utc::now())
    }
}
