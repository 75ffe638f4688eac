use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::interaction::InteractionId;

/// Append-only audit record owned by an Interaction. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub event_id: String,
    pub interaction_id: InteractionId,
    pub event_type: String,
    pub actor: String,
    pub detail: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn new(
        interaction_id: InteractionId,
        event_type: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            interaction_id,
            event_type: event_type.into(),
            actor: actor.into(),
            detail: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}
