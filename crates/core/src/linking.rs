//! Cross-channel linking engine.
//!
//! Surfaces that a review, question, and chat likely concern the same
//! underlying issue without letting fuzzy guesses drive automated
//! customer-facing action. The engine is pure: callers hand it the source
//! record and a window of the tenant's other interactions.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::domain::interaction::Interaction;
use crate::domain::link::{action_policy, LinkCandidate, LinkType};

#[derive(Clone, Debug)]
pub struct LinkingConfig {
    /// Only interactions that occurred within this window are considered.
    pub recent_window: Duration,
    /// Minimum lexical overlap for a shared-product match to count.
    pub min_text_overlap: f64,
    pub max_candidates: usize,
}

// Fixed confidence levels per signal. Deterministic signals sit above the
// automation threshold; probabilistic ones scale with lexical overlap but
// can never escape assist-only through the action policy.
const CONFIDENCE_SHARED_THREAD: f64 = 0.97;
const CONFIDENCE_CUSTOMER_AND_ORDER: f64 = 0.92;
const BASE_SAME_ORDER: f64 = 0.65;
const BASE_SAME_CUSTOMER: f64 = 0.55;
const BASE_SHARED_PRODUCT: f64 = 0.30;

#[derive(Clone, Debug, Default)]
pub struct LinkingEngine {
    config: LinkingConfig,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self { recent_window: Duration::days(30), min_text_overlap: 0.2, max_candidates: 10 }
    }
}

impl LinkingEngine {
    pub fn new(config: LinkingConfig) -> Self {
        Self { config }
    }

    /// Compute link candidates for `source` against the tenant's recent
    /// interactions, ordered by confidence descending.
    pub fn candidates(
        &self,
        source: &Interaction,
        window: &[Interaction],
        now: DateTime<Utc>,
    ) -> Vec<LinkCandidate> {
        let horizon = now - self.config.recent_window;
        let source_tokens = significant_tokens(source.subject.as_deref(), source.text.as_deref());

        let mut candidates: Vec<LinkCandidate> = window
            .iter()
            .filter(|target| target.id != source.id)
            .filter(|target| target.identity.tenant_id == source.identity.tenant_id)
            .filter(|target| target.occurred_at >= horizon)
            .filter_map(|target| self.score_pair(source, target, &source_tokens))
            .collect();

        candidates.sort_by(|a, b| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.config.max_candidates);
        candidates
    }

    fn score_pair(
        &self,
        source: &Interaction,
        target: &Interaction,
        source_tokens: &BTreeSet<String>,
    ) -> Option<LinkCandidate> {
        let overlap = {
            let target_tokens =
                significant_tokens(target.subject.as_deref(), target.text.as_deref());
            jaccard(source_tokens, &target_tokens)
        };

        let shared_thread = match (&source.thread_id, &target.thread_id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        let same_customer = both_equal(&source.customer_id, &target.customer_id);
        let same_order = both_equal(&source.order_id, &target.order_id);
        let same_product = both_equal(&source.product_id, &target.product_id);

        let (link_type, confidence, reason) = if shared_thread {
            (
                LinkType::Deterministic,
                CONFIDENCE_SHARED_THREAD,
                "matching external thread id".to_string(),
            )
        } else if same_customer && same_order {
            (
                LinkType::Deterministic,
                CONFIDENCE_CUSTOMER_AND_ORDER,
                "same customer and order".to_string(),
            )
        } else if same_order {
            (
                LinkType::Probabilistic,
                clamp01(BASE_SAME_ORDER + 0.20 * overlap),
                "same order".to_string(),
            )
        } else if same_customer {
            (
                LinkType::Probabilistic,
                clamp01(BASE_SAME_CUSTOMER + 0.25 * overlap),
                "same customer".to_string(),
            )
        } else if same_product && overlap >= self.config.min_text_overlap {
            (
                LinkType::Probabilistic,
                clamp01(BASE_SHARED_PRODUCT + 0.60 * overlap),
                format!("shared product with text overlap {overlap:.2}"),
            )
        } else {
            return None;
        };

        Some(LinkCandidate {
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            link_type,
            confidence,
            match_reason: reason,
            action_mode: action_policy(link_type, confidence),
        })
    }
}

fn both_equal(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(left), Some(right)) if left == right)
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "this", "that", "with", "was", "are", "but", "not", "you", "your", "its",
    "has", "have", "had", "very", "too",
];

fn significant_tokens(subject: Option<&str>, text: Option<&str>) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for source in [subject.unwrap_or_default(), text.unwrap_or_default()] {
        for word in source.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if word.len() > 2 && !STOPWORDS.contains(&word.as_str()) {
                tokens.insert(word);
            }
        }
    }
    tokens
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}
