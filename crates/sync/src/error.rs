use thiserror::Error;

use unibox_connectors::error::ConnectorError;
use unibox_core::coordination::CoordinationError;
use unibox_core::domain::interaction::Channel;
use unibox_core::guardrails::RuleFinding;
use unibox_db::repositories::RepositoryError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run holds the tenant's sync lock. Expected under concurrent
    /// schedulers; the caller should back off, not alarm.
    #[error("a sync run is already in progress for tenant `{0}`")]
    AlreadyRunning(String),

    #[error("no connector registered for channel `{}`", .0.as_str())]
    UnsupportedChannel(Channel),

    #[error("connector failure: {0}")]
    Connector(#[from] ConnectorError),

    #[error("repository failure: {0}")]
    Repository(#[from] RepositoryError),

    #[error("coordination failure: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("credential resolution failed: {0}")]
    Credentials(String),

    #[error("reply rejected by guardrails ({} violation(s))", violations.len())]
    GuardrailRejected { violations: Vec<RuleFinding> },

    #[error("unknown interaction `{0}`")]
    UnknownInteraction(String),
}
