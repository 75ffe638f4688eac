pub mod doctor;
pub mod health;
pub mod migrate;
pub mod sync;

use std::sync::Arc;

use clap::Args;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use unibox_connectors::types::CapabilitySet;
use unibox_connectors::RestConnector;
use unibox_core::config::{AppConfig, LogFormat, LoggingConfig};
use unibox_core::domain::interaction::{Channel, Marketplace};
use unibox_core::linking::LinkingConfig;
use unibox_db::repositories::{
    SqlEventRepository, SqlInteractionRepository, SqlSlaOverrideRepository,
};
use unibox_db::{connect, SqlRateCounterStore, SqlSyncLockStore};
use unibox_sync::classify::Classifier;
use unibox_sync::external::fixed::{EmptyProductContext, FixedCredentialStore};
use unibox_sync::pipeline::PipelineDeps;
use unibox_sync::{HttpIntentLlm, SyncService};

/// Environment variable holding the marketplace API token for `sync` and
/// `health`. Kept out of argv so it never lands in shell history.
pub const TOKEN_ENV: &str = "UNIBOX_MARKETPLACE_TOKEN";

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// The (tenant, channel, marketplace) target shared by `sync` and `health`.
#[derive(Debug, Args)]
pub struct TargetArgs {
    #[arg(long, help = "Tenant to run against")]
    pub tenant: String,
    #[arg(long, value_parser = parse_channel, help = "Channel: review|question|chat")]
    pub channel: Channel,
    #[arg(long, help = "Marketplace identifier, e.g. `testmart`")]
    pub marketplace: String,
    #[arg(long, help = "Base URL of the marketplace gateway")]
    pub base_url: String,
}

fn parse_channel(value: &str) -> Result<Channel, String> {
    Channel::parse(value)
        .ok_or_else(|| format!("unknown channel `{value}` (expected review|question|chat)"))
}

pub(crate) fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    // try_init: a second command invocation in the same process (tests)
    // keeps the first subscriber.
    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub(crate) fn build_runtime(
    command: &str,
) -> Result<tokio::runtime::Runtime, Box<CommandResult>> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        Box::new(CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        ))
    })
}

/// Wire the full service against the configured database and one REST
/// connector for the target channel.
pub(crate) async fn build_service(
    config: &AppConfig,
    target: &TargetArgs,
    token: SecretString,
) -> Result<SyncService, (&'static str, String, u8)> {
    let pool = connect(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

    let classifier = build_classifier(config)?;
    let deps = PipelineDeps {
        interactions: Arc::new(SqlInteractionRepository::new(pool.clone())),
        events: Arc::new(SqlEventRepository::new(pool.clone())),
        sla_overrides: Arc::new(SqlSlaOverrideRepository::new(pool.clone())),
        rate_counter: Arc::new(SqlRateCounterStore::new(pool.clone())),
        sync_lock: Arc::new(SqlSyncLockStore::new(pool)),
        credentials: Arc::new(FixedCredentialStore::single(
            &target.tenant,
            token.expose_secret(),
        )),
        products: Arc::new(EmptyProductContext),
        classifier: Arc::new(classifier),
    };

    let mut service = SyncService::new(deps, &config.sync, LinkingConfig::default());
    let connector = RestConnector::new(
        Marketplace(target.marketplace.clone()),
        target.channel,
        &target.base_url,
        token,
        CapabilitySet::base(),
    )
    .map_err(|error| ("connector", error.to_string(), 4u8))?;
    service.register_connector(Arc::new(connector));

    Ok(service)
}

fn build_classifier(config: &AppConfig) -> Result<Classifier, (&'static str, String, u8)> {
    if !config.classifier.llm_fallback_enabled {
        return Ok(Classifier::rule_only());
    }

    // validate() guarantees base_url and api_key are present when enabled.
    let base_url = config.classifier.llm_base_url.clone().unwrap_or_default();
    let llm =
        HttpIntentLlm::new(base_url, config.classifier.llm_api_key.clone(), &config.classifier.llm_model)
            .map_err(|error| ("llm_client", error.to_string(), 3u8))?;
    Ok(Classifier::with_llm_fallback(
        Arc::new(llm),
        std::time::Duration::from_secs(config.classifier.llm_timeout_secs),
    ))
}

pub(crate) fn marketplace_token(command: &str) -> Result<SecretString, Box<CommandResult>> {
    match std::env::var(TOKEN_ENV) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretString::from(value)),
        _ => Err(Box::new(CommandResult::failure(
            command,
            "credentials",
            format!("{TOKEN_ENV} must be set to the marketplace API token"),
            2,
        ))),
    }
}
