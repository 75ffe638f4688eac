use serde::{Deserialize, Serialize};

use crate::domain::interaction::InteractionId;

/// How a link between two interactions was established.
///
/// `Deterministic` means an exact strong-key identity match that can be
/// independently verified. `Probabilistic` means weaker signals (shared
/// product plus thematic overlap) regardless of how high the computed
/// confidence is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Deterministic,
    Probabilistic,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::Probabilistic => "probabilistic",
        }
    }
}

/// Whether a link may drive automated customer-facing action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    AutoAllowed,
    AssistOnly,
}

impl ActionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoAllowed => "auto_allowed",
            Self::AssistOnly => "assist_only",
        }
    }
}

/// A hypothesis that two Interactions describe the same real-world issue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub source_id: InteractionId,
    pub target_id: InteractionId,
    pub link_type: LinkType,
    pub confidence: f64,
    pub match_reason: String,
    pub action_mode: ActionMode,
}

/// Decide whether a link may drive automation.
///
/// Probabilistic links stay assist-only at any confidence: lexical matching
/// can be confidently wrong, and only independently-verifiable identity
/// matches are trusted to act without a human.
pub fn action_policy(link_type: LinkType, confidence: f64) -> ActionMode {
    match link_type {
        LinkType::Deterministic if confidence >= 0.85 => ActionMode::AutoAllowed,
        LinkType::Deterministic => ActionMode::AssistOnly,
        LinkType::Probabilistic => ActionMode::AssistOnly,
    }
}

#[cfg(test)]
mod tests {
    use super::{action_policy, ActionMode, LinkType};

    #[test]
    fn deterministic_links_split_on_confidence_threshold() {
        assert_eq!(action_policy(LinkType::Deterministic, 0.90), ActionMode::AutoAllowed);
        assert_eq!(action_policy(LinkType::Deterministic, 0.85), ActionMode::AutoAllowed);
        assert_eq!(action_policy(LinkType::Deterministic, 0.70), ActionMode::AssistOnly);
    }

    #[test]
    fn probabilistic_links_never_drive_automation() {
        assert_eq!(action_policy(LinkType::Probabilistic, 0.99), ActionMode::AssistOnly);
        assert_eq!(action_policy(LinkType::Probabilistic, 1.0), ActionMode::AssistOnly);
        assert_eq!(action_policy(LinkType::Probabilistic, 0.10), ActionMode::AssistOnly);
    }
}
