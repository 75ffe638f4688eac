//! Guardrail-gated outbound reply path.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use unibox_connectors::retry::{execute_with_retry, RetrySchedule};
use unibox_connectors::types::{ChannelConnector, ReplyAck};
use unibox_core::domain::event::InteractionEvent;
use unibox_core::domain::interaction::InteractionId;
use unibox_core::guardrails::GuardrailValidator;
use unibox_db::repositories::{EventRepository, InteractionRepository};

use crate::error::SyncError;

pub struct ReplySender {
    interactions: Arc<dyn InteractionRepository>,
    events: Arc<dyn EventRepository>,
    validator: GuardrailValidator,
    retry: RetrySchedule,
}

impl ReplySender {
    pub fn new(
        interactions: Arc<dyn InteractionRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            interactions,
            events,
            validator: GuardrailValidator::new(),
            retry: RetrySchedule::default(),
        }
    }

    /// Validate and send a reply, then mark the stored record as responded.
    ///
    /// Guardrail violations block the send entirely; warnings go through
    /// (they are surfaced to the operator by `validate_reply` beforehand).
    #[instrument(skip_all, fields(interaction = interaction_id.0))]
    pub async fn send(
        &self,
        connector: &dyn ChannelConnector,
        interaction_id: &InteractionId,
        text: &str,
    ) -> Result<ReplyAck, SyncError> {
        let mut interaction = self
            .interactions
            .find_by_id(interaction_id)
            .await?
            .ok_or_else(|| SyncError::UnknownInteraction(interaction_id.0.clone()))?;

        let channel = interaction.identity.channel;
        let outcome = self.validator.validate(text, channel, interaction.text.as_deref());
        if !outcome.valid {
            return Err(SyncError::GuardrailRejected { violations: outcome.violations });
        }

        let (ack, _stats) = execute_with_retry("send_reply", &self.retry, |auth| {
            connector.send_reply(&interaction.identity.external_id, text, auth)
        })
        .await?;

        let now = Utc::now();
        interaction.mark_replied_local(now);
        self.interactions.save(interaction.clone()).await?;
        self.events
            .append(
                InteractionEvent::new(interaction.id.clone(), "reply_sent", "reply-path")
                    .with_detail("channel", channel.as_str())
                    .with_detail("length", text.chars().count().to_string()),
            )
            .await?;

        info!(channel = channel.as_str(), "reply sent");
        Ok(ack)
    }
}
