//! Rule-based intent classification.
//!
//! An ordered fixed set of keyword groups maps customer text to a closed
//! intent set; the first matching group wins and classification never fails.
//! The LLM fallback for the catch-all bucket lives in the sync crate, where
//! the async runtime and timeouts are available.

use serde::{Deserialize, Serialize};

/// Closed intent set. Any label outside this set is rejected wherever labels
/// enter the system (LLM fallback included).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    SizingFit,
    AvailabilityDelivery,
    SpecCompatibility,
    ComplianceSafety,
    PostPurchaseIssue,
    GeneralQuestion,
}

impl IntentLabel {
    pub const ALL: [IntentLabel; 6] = [
        IntentLabel::SizingFit,
        IntentLabel::AvailabilityDelivery,
        IntentLabel::SpecCompatibility,
        IntentLabel::ComplianceSafety,
        IntentLabel::PostPurchaseIssue,
        IntentLabel::GeneralQuestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SizingFit => "sizing_fit",
            Self::AvailabilityDelivery => "availability_delivery",
            Self::SpecCompatibility => "spec_compatibility",
            Self::ComplianceSafety => "compliance_safety",
            Self::PostPurchaseIssue => "post_purchase_issue",
            Self::GeneralQuestion => "general_question",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sizing_fit" => Some(Self::SizingFit),
            "availability_delivery" => Some(Self::AvailabilityDelivery),
            "spec_compatibility" => Some(Self::SpecCompatibility),
            "compliance_safety" => Some(Self::ComplianceSafety),
            "post_purchase_issue" => Some(Self::PostPurchaseIssue),
            "general_question" => Some(Self::GeneralQuestion),
            _ => None,
        }
    }

    /// The bucket rule matching falls back to when nothing else applies.
    pub fn catch_all() -> Self {
        Self::GeneralQuestion
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    RuleBased,
    Llm,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::Llm => "llm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rule_based" => Some(Self::RuleBased),
            "llm" => Some(Self::Llm),
            _ => None,
        }
    }
}

struct KeywordGroup {
    intent: IntentLabel,
    keywords: &'static [&'static str],
}

// Safety complaints outrank everything; post-purchase problems outrank
// pre-purchase questions. Evaluation order is part of the contract.
const KEYWORD_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        intent: IntentLabel::ComplianceSafety,
        keywords: &[
            "injur", "unsafe", "hazard", "caught fire", "burn", "recall", "allergic", "choking",
            "electric shock", "toxic", "overheat",
        ],
    },
    KeywordGroup {
        intent: IntentLabel::PostPurchaseIssue,
        keywords: &[
            "broken", "damaged", "defect", "refund", "return", "missing part", "not working",
            "stopped working", "doesn't work", "wrong item", "leak", "never arrived",
        ],
    },
    KeywordGroup {
        intent: IntentLabel::SizingFit,
        keywords: &[
            "size", "sizing", "fit", "too small", "too big", "runs small", "runs large", "tight",
            "loose", "measurement",
        ],
    },
    KeywordGroup {
        intent: IntentLabel::AvailabilityDelivery,
        keywords: &[
            "in stock", "restock", "availability", "available", "delivery", "shipping",
            "ship to", "when will", "arrive", "backorder", "tracking number",
        ],
    },
    KeywordGroup {
        intent: IntentLabel::SpecCompatibility,
        keywords: &[
            "compatible", "compatibility", "work with", "works with", "fits my", "spec",
            "dimensions", "voltage", "wattage", "model number", "material",
        ],
    },
];

/// First-match-wins keyword classifier. Pure; unmatched text lands in the
/// catch-all bucket.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> IntentLabel {
        let haystack = text.to_lowercase();
        for group in KEYWORD_GROUPS {
            if group.keywords.iter().any(|keyword| haystack.contains(keyword)) {
                return group.intent;
            }
        }
        IntentLabel::catch_all()
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassificationMethod, IntentLabel, RuleClassifier};

    #[test]
    fn labels_round_trip_from_storage_encoding() {
        for label in IntentLabel::ALL {
            assert_eq!(IntentLabel::parse(label.as_str()), Some(label));
        }
        for method in [ClassificationMethod::RuleBased, ClassificationMethod::Llm] {
            assert_eq!(ClassificationMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(IntentLabel::parse("escalate_to_human"), None);
    }

    #[test]
    fn labels_key_ordered_maps() {
        // The SLA tables are keyed by label.
        let table: std::collections::BTreeMap<IntentLabel, u32> =
            IntentLabel::ALL.iter().map(|label| (*label, 0)).collect();
        assert_eq!(table.len(), IntentLabel::ALL.len());
    }

    #[test]
    fn first_matching_group_wins() {
        let classifier = RuleClassifier::new();

        // Mentions both a safety keyword and a sizing keyword; safety is
        // evaluated first.
        let text = "My kid got injured, also the size was wrong";
        assert_eq!(classifier.classify(text), IntentLabel::ComplianceSafety);

        assert_eq!(
            classifier.classify("Does this work with the 2019 model number X200?"),
            IntentLabel::SpecCompatibility
        );
        assert_eq!(
            classifier.classify("When will this be back in stock?"),
            IntentLabel::AvailabilityDelivery
        );
        assert_eq!(
            classifier.classify("Arrived broken, I want a refund"),
            IntentLabel::PostPurchaseIssue
        );
    }

    #[test]
    fn unmatched_text_falls_into_catch_all() {
        let classifier = RuleClassifier::new();
        assert_eq!(classifier.classify("Lovely product, thanks!"), IntentLabel::GeneralQuestion);
        assert_eq!(classifier.classify(""), IntentLabel::GeneralQuestion);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let classifier = RuleClassifier::new();
        assert_eq!(classifier.classify("IS THIS COMPATIBLE?"), IntentLabel::SpecCompatibility);
    }
}
