//! Pre-send validation of outbound reply text.
//!
//! Rules are channel-aware: public surfaces (reviews, questions) are held to
//! a stricter standard than 1:1 chat. `validate` never mutates its input;
//! `sanitize` is a separate explicit step callers opt into.

use serde::{Deserialize, Serialize};

use crate::domain::interaction::Channel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    EmptyText,
    AiDisclosure,
    UnauthorizedPromise,
    VictimBlaming,
    DismissiveDeflection,
    ReturnSuggestion,
    LengthBound,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyText => "empty_text",
            Self::AiDisclosure => "ai_disclosure",
            Self::UnauthorizedPromise => "unauthorized_promise",
            Self::VictimBlaming => "victim_blaming",
            Self::DismissiveDeflection => "dismissive_deflection",
            Self::ReturnSuggestion => "return_suggestion",
            Self::LengthBound => "length_bound",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFinding {
    pub category: RuleCategory,
    pub matched: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub violations: Vec<RuleFinding>,
    pub warnings: Vec<RuleFinding>,
}

const AI_DISCLOSURE_PHRASES: &[&str] = &[
    "as an ai",
    "i am an ai",
    "i'm an ai",
    "i am a bot",
    "i'm a bot",
    "language model",
    "as a chatbot",
    "automated response",
];

const PROMISE_PHRASES: &[&str] = &[
    "i guarantee",
    "we guarantee",
    "i promise",
    "we promise",
    "100% guaranteed",
    "we will definitely",
    "you will definitely receive",
    "we assure you",
];

const VICTIM_BLAMING_PHRASES: &[&str] = &[
    "your fault",
    "you should have",
    "you failed to",
    "if you had read",
    "user error",
    "you clearly didn't",
];

const DISMISSIVE_PHRASES: &[&str] = &[
    "not our problem",
    "nothing we can do",
    "deal with it",
    "that's just how it is",
    "take it or leave it",
];

const RETURN_MENTION_PHRASES: &[&str] =
    &["return", "refund", "send it back", "money back", "exchange it"];

// Words in the customer's own text that authorize talking about returns.
const RETURN_TRIGGER_WORDS: &[&str] =
    &["return", "refund", "money back", "send it back", "exchange", "replacement"];

fn find_phrase(haystack: &str, phrases: &[&str]) -> Option<String> {
    phrases.iter().find(|phrase| haystack.contains(*phrase)).map(|phrase| phrase.to_string())
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GuardrailValidator;

impl GuardrailValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check candidate reply text against the channel's policy rules.
    ///
    /// `customer_text` is the inbound message being answered; it decides
    /// whether a return/refund mention is customer-initiated.
    pub fn validate(
        &self,
        text: &str,
        channel: Channel,
        customer_text: Option<&str>,
    ) -> ValidationOutcome {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        if text.trim().is_empty() {
            violations.push(RuleFinding {
                category: RuleCategory::EmptyText,
                matched: None,
                message: "reply text is empty".to_string(),
            });
            return ValidationOutcome { valid: false, violations, warnings };
        }

        let lowered = text.to_lowercase();
        let customer_lowered = customer_text.map(str::to_lowercase);

        if let Some(matched) = find_phrase(&lowered, AI_DISCLOSURE_PHRASES) {
            violations.push(RuleFinding {
                category: RuleCategory::AiDisclosure,
                matched: Some(matched),
                message: "replies must not disclose AI or bot involvement".to_string(),
            });
        }

        if let Some(matched) = find_phrase(&lowered, PROMISE_PHRASES) {
            let finding = RuleFinding {
                category: RuleCategory::UnauthorizedPromise,
                matched: Some(matched),
                message: "unauthorized promises are not allowed in public replies".to_string(),
            };
            if channel.is_public() {
                violations.push(finding);
            } else {
                warnings.push(finding);
            }
        }

        if let Some(matched) = find_phrase(&lowered, VICTIM_BLAMING_PHRASES) {
            warnings.push(RuleFinding {
                category: RuleCategory::VictimBlaming,
                matched: Some(matched),
                message: "reply language blames the customer".to_string(),
            });
        }

        if let Some(matched) = find_phrase(&lowered, DISMISSIVE_PHRASES) {
            let finding = RuleFinding {
                category: RuleCategory::DismissiveDeflection,
                matched: Some(matched),
                message: "dismissive deflection is not allowed on public channels".to_string(),
            };
            if channel.is_public() {
                violations.push(finding);
            } else {
                warnings.push(finding);
            }
        }

        if let Some(matched) = find_phrase(&lowered, RETURN_MENTION_PHRASES) {
            let customer_initiated = customer_lowered
                .as_deref()
                .map(|inbound| {
                    RETURN_TRIGGER_WORDS.iter().any(|trigger| inbound.contains(trigger))
                })
                .unwrap_or(false);
            if !customer_initiated {
                violations.push(RuleFinding {
                    category: RuleCategory::ReturnSuggestion,
                    matched: Some(matched),
                    message: "return/refund may only be raised after the customer asks"
                        .to_string(),
                });
            }
        }

        let limit = channel.reply_length_limit();
        if text.chars().count() > limit {
            warnings.push(RuleFinding {
                category: RuleCategory::LengthBound,
                matched: None,
                message: format!(
                    "reply exceeds the {} character limit for {} replies",
                    limit,
                    channel.as_str()
                ),
            });
        }

        ValidationOutcome { valid: violations.is_empty(), violations, warnings }
    }
}

/// Explicit cleanup step, separate from validation: trims, collapses runs of
/// whitespace, and strips control characters.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.trim().chars() {
        // Tabs and newlines are both control and whitespace; they must
        // collapse to a space, not vanish.
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if ch.is_control() {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    out
}
