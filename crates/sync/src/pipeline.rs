//! The per-(tenant, channel) ingestion run.
//!
//! One run holds the tenant sync lock end to end, pages through the
//! connector under the rate limiter, and upserts each normalized record by
//! identity key. Exactly one metrics entry comes out of every run, aborted
//! runs included; `AlreadyRunning` is the only outcome with no entry.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use unibox_connectors::normalize::{normalize_item, NormalizedRecord};
use unibox_connectors::retry::{execute_with_retry, RetrySchedule};
use unibox_connectors::types::{ChannelConnector, ListFilters};
use unibox_core::config::SyncConfig;
use unibox_core::coordination::{RateCounterStore, SyncLockStore};
use unibox_core::domain::event::InteractionEvent;
use unibox_core::domain::interaction::{
    Channel, ExtensionBag, IdentityKey, Interaction, InteractionId, InteractionStatus,
    Marketplace, ReplySource, TenantId,
};
use unibox_core::domain::metrics::SyncMetrics;
use unibox_core::linking::{LinkingConfig, LinkingEngine};
use unibox_core::sla::{self, TenantSlaOverrides};
use unibox_db::repositories::{EventRepository, InteractionRepository, SlaOverrideRepository};

use crate::classify::Classifier;
use crate::error::SyncError;
use crate::external::{product_context_or_empty, CredentialStore, ProductContextProvider};
use crate::limiter::{SlidingWindowRateLimiter, TenantSyncLock};

pub struct PipelineDeps {
    pub interactions: Arc<dyn InteractionRepository>,
    pub events: Arc<dyn EventRepository>,
    pub sla_overrides: Arc<dyn SlaOverrideRepository>,
    pub rate_counter: Arc<dyn RateCounterStore>,
    pub sync_lock: Arc<dyn SyncLockStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub products: Arc<dyn ProductContextProvider>,
    pub classifier: Arc<Classifier>,
}

pub struct IngestionPipeline {
    interactions: Arc<dyn InteractionRepository>,
    events: Arc<dyn EventRepository>,
    sla_overrides: Arc<dyn SlaOverrideRepository>,
    limiter: SlidingWindowRateLimiter,
    lock: TenantSyncLock,
    credentials: Arc<dyn CredentialStore>,
    products: Arc<dyn ProductContextProvider>,
    classifier: Arc<Classifier>,
    linker: LinkingEngine,
    linking: LinkingConfig,
    retry: RetrySchedule,
    page_size: u32,
    pending_response_window: Duration,
}

impl IngestionPipeline {
    pub fn new(deps: PipelineDeps, config: &SyncConfig, linking: LinkingConfig) -> Self {
        let limiter = SlidingWindowRateLimiter::new(
            deps.rate_counter,
            config.requests_per_minute,
            std::time::Duration::from_secs(config.rate_limit_wait_secs),
        );
        let lock = TenantSyncLock::new(
            deps.sync_lock,
            Duration::seconds(config.lock_ttl_secs as i64),
        );
        Self {
            interactions: deps.interactions,
            events: deps.events,
            sla_overrides: deps.sla_overrides,
            limiter,
            lock,
            credentials: deps.credentials,
            products: deps.products,
            classifier: deps.classifier,
            linker: LinkingEngine::new(linking.clone()),
            linking,
            retry: RetrySchedule::default(),
            page_size: config.page_size,
            pending_response_window: Duration::minutes(config.pending_response_window_minutes),
        }
    }

    /// Run one full sync for the tenant against the given connector.
    ///
    /// Returns `Ok(metrics)` for completed and aborted runs alike (aborts
    /// carry `errors = 1` and a truncated detail); `AlreadyRunning` when the
    /// tenant lock is held elsewhere.
    #[instrument(skip_all, fields(tenant = tenant.0, channel = connector.channel().as_str()))]
    pub async fn run(
        &self,
        tenant: &TenantId,
        connector: &dyn ChannelConnector,
    ) -> Result<SyncMetrics, SyncError> {
        let holder = Uuid::new_v4().to_string();
        if !self.lock.try_acquire(tenant, &holder).await? {
            debug!("sync lock held elsewhere, skipping run");
            return Err(SyncError::AlreadyRunning(tenant.0.clone()));
        }

        let mut metrics = SyncMetrics::begin(tenant.clone(), connector.channel());
        let outcome = self.run_locked(tenant, connector, &mut metrics).await;

        if let Err(error) = self.lock.release(tenant, &holder).await {
            warn!(error = %error, "sync lock release failed; TTL will reclaim it");
        }

        match outcome {
            Ok(()) => {
                metrics.finish();
                info!(
                    fetched = metrics.fetched,
                    created = metrics.created,
                    updated = metrics.updated,
                    skipped = metrics.skipped,
                    "sync run complete"
                );
            }
            Err(error) => {
                warn!(error = %error, "sync run aborted");
                metrics.record_failure(&error.to_string());
            }
        }
        Ok(metrics)
    }

    async fn run_locked(
        &self,
        tenant: &TenantId,
        connector: &dyn ChannelConnector,
        metrics: &mut SyncMetrics,
    ) -> Result<(), SyncError> {
        // The connector was authenticated at construction; a failure here
        // means the tenant's credentials were revoked since, so stop before
        // any marketplace traffic.
        self.credentials
            .get_decrypted_credentials(tenant)
            .await
            .map_err(|error| SyncError::Credentials(error.to_string()))?;

        let overrides = self.sla_overrides.get(tenant).await?.unwrap_or_default();
        let since = Utc::now() - self.linking.recent_window;
        let mut recent = self.interactions.list_recent(tenant, since).await?;

        let marketplace = connector.marketplace().clone();
        let channel = connector.channel();
        let mut page: Option<String> = None;

        loop {
            self.limiter.acquire(tenant).await?;

            let filters = ListFilters {
                updated_since: None,
                page: page.clone(),
                page_size: self.page_size,
            };
            let (item_page, stats) =
                execute_with_retry("list_items", &self.retry, |auth| {
                    connector.list_items(&filters, auth)
                })
                .await?;
            if stats.rate_limited {
                metrics.rate_limited = true;
            }

            metrics.fetched += item_page.items.len() as u64;
            for item in &item_page.items {
                let record = match normalize_item(item, channel) {
                    Ok(record) => record,
                    Err(error) => {
                        warn!(error = %error, "record failed normalization, skipping");
                        metrics.skipped += 1;
                        continue;
                    }
                };
                self.apply_record(tenant, &marketplace, channel, record, &overrides, &mut recent, metrics)
                    .await?;
            }

            match item_page.next_page {
                Some(next) => page = Some(next),
                None => break,
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_record(
        &self,
        tenant: &TenantId,
        marketplace: &Marketplace,
        channel: Channel,
        record: NormalizedRecord,
        overrides: &TenantSlaOverrides,
        recent: &mut Vec<Interaction>,
        metrics: &mut SyncMetrics,
    ) -> Result<(), SyncError> {
        let identity = IdentityKey {
            tenant_id: tenant.clone(),
            marketplace: marketplace.clone(),
            channel,
            external_id: record.external_id.clone(),
        };

        match self.interactions.find_by_identity(&identity).await? {
            None => {
                let interaction = self.create_interaction(identity, record, overrides, recent).await?;
                recent.push(interaction);
                metrics.created += 1;
            }
            Some(existing) => {
                let updated = self.update_interaction(existing, record, overrides).await?;
                recent.retain(|candidate| candidate.id != updated.id);
                recent.push(updated);
                metrics.updated += 1;
            }
        }
        Ok(())
    }

    async fn create_interaction(
        &self,
        identity: IdentityKey,
        record: NormalizedRecord,
        overrides: &TenantSlaOverrides,
        recent: &[Interaction],
    ) -> Result<Interaction, SyncError> {
        let now = Utc::now();
        let channel = identity.channel;
        let (intent, method) = self
            .classifier
            .classify(&self.classification_input(&record).await)
            .await;
        let resolution = sla::resolve(channel, intent, record.needs_response, overrides);

        let mut extensions = ExtensionBag::default();
        extensions.set_intent(intent);
        extensions.set_classification_method(method);
        if let Some(minutes) = resolution.sla_minutes {
            extensions.set_sla_deadline(record.occurred_at + Duration::minutes(minutes as i64));
        }

        let mut interaction = Interaction {
            id: InteractionId(Uuid::new_v4().to_string()),
            customer_id: record.customer_id,
            order_id: record.order_id,
            product_id: record.product_id,
            thread_id: record.thread_id,
            subject: record.subject,
            text: record.text,
            rating: record.rating,
            status: InteractionStatus::Open,
            priority: resolution.priority,
            needs_response: record.needs_response,
            source: identity.marketplace.0.clone(),
            occurred_at: record.occurred_at,
            last_reply_source: None,
            last_reply_at: None,
            extensions,
            created_at: now,
            updated_at: now,
            identity,
        };

        let candidates = self.linker.candidates(&interaction, recent, now);
        if !candidates.is_empty() {
            interaction.extensions.set_link_candidates(&candidates);
        }

        self.interactions.save(interaction.clone()).await?;
        self.events
            .append(
                InteractionEvent::new(interaction.id.clone(), "created", "sync")
                    .with_detail("channel", channel.as_str())
                    .with_detail("intent", intent.as_str()),
            )
            .await?;
        Ok(interaction)
    }

    async fn update_interaction(
        &self,
        existing: Interaction,
        record: NormalizedRecord,
        overrides: &TenantSlaOverrides,
    ) -> Result<Interaction, SyncError> {
        let now = Utc::now();
        let channel = existing.identity.channel;
        let previous_fingerprint = existing.content_fingerprint();

        let mut updated = existing;
        updated.customer_id = record.customer_id;
        updated.order_id = record.order_id;
        updated.product_id = record.product_id;
        updated.thread_id = record.thread_id;
        updated.subject = record.subject;
        updated.text = record.text;
        updated.rating = record.rating;
        updated.occurred_at = record.occurred_at;

        // Upstream read-after-write lag: a fetch shortly after our own reply
        // may still claim the record awaits one. Inside the pending-response
        // window the local reply wins.
        let reply_pending_locally = updated.last_reply_source == Some(ReplySource::Local)
            && updated
                .last_reply_at
                .is_some_and(|at| now - at < self.pending_response_window);

        if record.needs_response && !reply_pending_locally {
            updated.needs_response = true;
            updated.status = InteractionStatus::Open;
        } else if !record.needs_response {
            updated.needs_response = false;
        }

        if updated.content_fingerprint() != previous_fingerprint {
            let (intent, method) = self
                .classifier
                .classify(&self.classification_input_for(&updated).await)
                .await;
            let resolution = sla::resolve(channel, intent, updated.needs_response, overrides);
            updated.priority = resolution.priority;
            updated.extensions.set_intent(intent);
            updated.extensions.set_classification_method(method);
            match resolution.sla_minutes {
                Some(minutes) => updated
                    .extensions
                    .set_sla_deadline(updated.occurred_at + Duration::minutes(minutes as i64)),
                None => updated.extensions.clear_sla_deadline(),
            }
        }

        updated.updated_at = now;
        self.interactions.save(updated.clone()).await?;
        Ok(updated)
    }

    async fn classification_input(&self, record: &NormalizedRecord) -> String {
        join_input(
            record.subject.as_deref(),
            record.text.as_deref(),
            &product_context_or_empty(self.products.as_ref(), record.product_id.as_deref()).await,
        )
    }

    async fn classification_input_for(&self, interaction: &Interaction) -> String {
        join_input(
            interaction.subject.as_deref(),
            interaction.text.as_deref(),
            &product_context_or_empty(self.products.as_ref(), interaction.product_id.as_deref())
                .await,
        )
    }
}

fn join_input(subject: Option<&str>, text: Option<&str>, product_context: &str) -> String {
    let mut input = String::new();
    for part in [subject.unwrap_or_default(), text.unwrap_or_default(), product_context] {
        if part.is_empty() {
            continue;
        }
        if !input.is_empty() {
            input.push(' ');
        }
        input.push_str(part);
    }
    input
}
