//! Intent classification with a bounded LLM fallback.
//!
//! Rules run first and always produce a label. The LLM is consulted only for
//! the catch-all bucket, under a hard timeout, and only labels from the
//! closed set are accepted. Classification never fails: every degraded path
//! lands back on the rule result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use unibox_core::intent::{ClassificationMethod, IntentLabel, RuleClassifier};

/// Narrow consumed surface of the language model: one label suggestion for
/// one piece of customer text.
#[async_trait]
pub trait IntentLlm: Send + Sync {
    async fn suggest_intent(&self, text: &str) -> Result<String>;
}

pub struct Classifier {
    rules: RuleClassifier,
    llm: Option<Arc<dyn IntentLlm>>,
    llm_timeout: Duration,
}

impl Classifier {
    pub fn rule_only() -> Self {
        Self { rules: RuleClassifier::new(), llm: None, llm_timeout: Duration::ZERO }
    }

    pub fn with_llm_fallback(llm: Arc<dyn IntentLlm>, llm_timeout: Duration) -> Self {
        Self { rules: RuleClassifier::new(), llm: Some(llm), llm_timeout }
    }

    pub async fn classify(&self, text: &str) -> (IntentLabel, ClassificationMethod) {
        let rule_label = self.rules.classify(text);
        if rule_label != IntentLabel::catch_all() {
            return (rule_label, ClassificationMethod::RuleBased);
        }

        let Some(llm) = &self.llm else {
            return (rule_label, ClassificationMethod::RuleBased);
        };

        match tokio::time::timeout(self.llm_timeout, llm.suggest_intent(text)).await {
            Ok(Ok(raw)) => match IntentLabel::parse(&raw) {
                Some(label) => (label, ClassificationMethod::Llm),
                None => {
                    debug!(label = raw, "llm returned a label outside the closed set, ignoring");
                    (rule_label, ClassificationMethod::RuleBased)
                }
            },
            Ok(Err(error)) => {
                debug!(error = %error, "llm fallback failed, keeping rule label");
                (rule_label, ClassificationMethod::RuleBased)
            }
            Err(_) => {
                debug!("llm fallback timed out, keeping rule label");
                (rule_label, ClassificationMethod::RuleBased)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use unibox_core::intent::{ClassificationMethod, IntentLabel};

    use super::{Classifier, IntentLlm};

    struct ScriptedLlm {
        response: Result<&'static str, &'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl IntentLlm for ScriptedLlm {
        async fn suggest_intent(&self, _text: &str) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            match self.response {
                Ok(label) => Ok(label.to_string()),
                Err(message) => bail!(message),
            }
        }
    }

    fn scripted(response: Result<&'static str, &'static str>, delay: Duration) -> Classifier {
        Classifier::with_llm_fallback(
            Arc::new(ScriptedLlm { response, delay }),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn rule_match_never_consults_the_llm() {
        let classifier = scripted(Ok("general_question"), Duration::ZERO);
        let (label, method) = classifier.classify("the handle arrived broken").await;
        assert_eq!(label, IntentLabel::PostPurchaseIssue);
        assert_eq!(method, ClassificationMethod::RuleBased);
    }

    #[tokio::test]
    async fn disabled_fallback_keeps_the_catch_all() {
        let classifier = Classifier::rule_only();
        let (label, method) = classifier.classify("what color is the trim?").await;
        assert_eq!(label, IntentLabel::GeneralQuestion);
        assert_eq!(method, ClassificationMethod::RuleBased);
    }

    #[tokio::test]
    async fn valid_llm_label_is_accepted_and_attributed() {
        // Keyword-free text, so the rules land in the catch-all bucket and
        // the fallback gets consulted.
        let classifier = scripted(Ok("spec_compatibility"), Duration::ZERO);
        let (label, method) = classifier.classify("will this suit my setup?").await;
        assert_eq!(label, IntentLabel::SpecCompatibility);
        assert_eq!(method, ClassificationMethod::Llm);
    }

    #[tokio::test]
    async fn out_of_set_llm_label_degrades_silently() {
        let classifier = scripted(Ok("sentiment_positive"), Duration::ZERO);
        let (label, method) = classifier.classify("what color is the trim?").await;
        assert_eq!(label, IntentLabel::GeneralQuestion);
        assert_eq!(method, ClassificationMethod::RuleBased);
    }

    #[tokio::test]
    async fn llm_error_degrades_silently() {
        let classifier = scripted(Err("upstream 500"), Duration::ZERO);
        let (label, method) = classifier.classify("what color is the trim?").await;
        assert_eq!(label, IntentLabel::GeneralQuestion);
        assert_eq!(method, ClassificationMethod::RuleBased);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_llm_is_cut_off_at_the_timeout() {
        let classifier = scripted(Ok("spec_compatibility"), Duration::from_secs(30));
        let (label, method) = classifier.classify("what color is the trim?").await;
        assert_eq!(label, IntentLabel::GeneralQuestion);
        assert_eq!(method, ClassificationMethod::RuleBased);
    }
}
