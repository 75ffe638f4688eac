use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::link::LinkCandidate;
use crate::intent::{ClassificationMethod, IntentLabel};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marketplace(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub String);

/// A distinct communication surface with a marketplace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Review,
    Question,
    Chat,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Question => "question",
            Self::Chat => "chat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "review" => Some(Self::Review),
            "question" => Some(Self::Question),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }

    /// Reviews and questions are visible to every shopper; chat is 1:1.
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Review | Self::Question)
    }

    /// Upper bound on outbound reply length the marketplace will accept.
    pub fn reply_length_limit(&self) -> usize {
        match self {
            Self::Review => 4000,
            Self::Question => 2000,
            Self::Chat => 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Open,
    Responded,
    Closed,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Responded => "responded",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "responded" => Some(Self::Responded),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "urgent" => Some(Self::Urgent),
            "high" => Some(Self::High),
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Who produced the most recent reply on a record.
///
/// `Local` replies were sent through this system and must not be undone by a
/// slow duplicate fetch from the marketplace (read-after-write lag upstream).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Local,
    Upstream,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Upstream => "upstream",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "upstream" => Some(Self::Upstream),
            _ => None,
        }
    }
}

/// The upsert idempotency key: exactly one Interaction exists per key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub tenant_id: TenantId,
    pub marketplace: Marketplace,
    pub channel: Channel,
    pub external_id: String,
}

impl IdentityKey {
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.tenant_id.0,
            self.marketplace.0,
            self.channel.as_str(),
            self.external_id
        )
    }
}

/// Schemaless metadata carried alongside an Interaction.
///
/// Access goes through named typed accessors only; the bag is never consulted
/// for identity or workflow invariants.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionBag {
    entries: BTreeMap<String, serde_json::Value>,
}

impl ExtensionBag {
    const INTENT: &'static str = "intent";
    const CLASSIFICATION_METHOD: &'static str = "classification_method";
    const SLA_DEADLINE: &'static str = "sla_deadline";
    const CACHED_DRAFT: &'static str = "cached_draft";
    const LINK_CANDIDATES: &'static str = "link_candidates";

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn intent(&self) -> Option<IntentLabel> {
        self.entries.get(Self::INTENT).and_then(|value| value.as_str()).and_then(IntentLabel::parse)
    }

    pub fn set_intent(&mut self, intent: IntentLabel) {
        self.entries.insert(Self::INTENT.to_string(), intent.as_str().into());
    }

    pub fn classification_method(&self) -> Option<ClassificationMethod> {
        self.entries
            .get(Self::CLASSIFICATION_METHOD)
            .and_then(|value| value.as_str())
            .and_then(ClassificationMethod::parse)
    }

    pub fn set_classification_method(&mut self, method: ClassificationMethod) {
        self.entries.insert(Self::CLASSIFICATION_METHOD.to_string(), method.as_str().into());
    }

    pub fn sla_deadline(&self) -> Option<DateTime<Utc>> {
        self.entries
            .get(Self::SLA_DEADLINE)
            .and_then(|value| value.as_str())
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
    }

    pub fn set_sla_deadline(&mut self, deadline: DateTime<Utc>) {
        self.entries.insert(Self::SLA_DEADLINE.to_string(), deadline.to_rfc3339().into());
    }

    pub fn clear_sla_deadline(&mut self) {
        self.entries.remove(Self::SLA_DEADLINE);
    }

    pub fn cached_draft(&self) -> Option<&str> {
        self.entries.get(Self::CACHED_DRAFT).and_then(|value| value.as_str())
    }

    pub fn set_cached_draft(&mut self, draft: impl Into<String>) {
        self.entries.insert(Self::CACHED_DRAFT.to_string(), draft.into().into());
    }

    pub fn link_candidates(&self) -> Vec<LinkCandidate> {
        self.entries
            .get(Self::LINK_CANDIDATES)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn set_link_candidates(&mut self, candidates: &[LinkCandidate]) {
        if let Ok(value) = serde_json::to_value(candidates) {
            self.entries.insert(Self::LINK_CANDIDATES.to_string(), value);
        }
    }
}

/// Canonical unified record of one customer-interaction-channel event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub identity: IdentityKey,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub product_id: Option<String>,
    pub thread_id: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub rating: Option<u8>,
    pub status: InteractionStatus,
    pub priority: Priority,
    pub needs_response: bool,
    pub source: String,
    pub occurred_at: DateTime<Utc>,
    pub last_reply_source: Option<ReplySource>,
    pub last_reply_at: Option<DateTime<Utc>>,
    pub extensions: ExtensionBag,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Interaction {
    /// Fingerprint of customer-authored content, used to decide whether a
    /// re-fetched record materially changed and priority/SLA must be
    /// recomputed.
    pub fn content_fingerprint(&self) -> String {
        content_fingerprint(self.subject.as_deref(), self.text.as_deref(), self.rating)
    }

    pub fn mark_replied_local(&mut self, now: DateTime<Utc>) {
        self.status = InteractionStatus::Responded;
        self.needs_response = false;
        self.last_reply_source = Some(ReplySource::Local);
        self.last_reply_at = Some(now);
        self.updated_at = now;
    }
}

pub fn content_fingerprint(
    subject: Option<&str>,
    text: Option<&str>,
    rating: Option<u8>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.unwrap_or_default().as_bytes());
    hasher.update([0x1f]);
    hasher.update(text.unwrap_or_default().as_bytes());
    hasher.update([0x1f]);
    hasher.update([rating.unwrap_or(0)]);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
