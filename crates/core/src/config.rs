use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub classifier: ClassifierConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Outbound marketplace requests allowed per tenant per minute.
    pub requests_per_minute: u32,
    /// Fixed interval slept when over budget before rechecking.
    pub rate_limit_wait_secs: u64,
    /// TTL bounding how long a crashed run can hold the tenant lock.
    pub lock_ttl_secs: u64,
    /// Window absorbing upstream read-after-write lag after a local reply.
    pub pending_response_window_minutes: i64,
    pub page_size: u32,
}

#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    pub llm_fallback_enabled: bool,
    pub llm_timeout_secs: u64,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<SecretString>,
    pub llm_model: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_fallback_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://unibox.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            sync: SyncConfig {
                requests_per_minute: 30,
                rate_limit_wait_secs: 2,
                lock_ttl_secs: 60,
                pending_response_window_minutes: 180,
                page_size: 100,
            },
            classifier: ClassifierConfig {
                llm_fallback_enabled: false,
                llm_timeout_secs: 5,
                llm_base_url: None,
                llm_api_key: None,
                llm_model: "intent-classifier-small".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("unibox.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(sync) = patch.sync {
            if let Some(requests_per_minute) = sync.requests_per_minute {
                self.sync.requests_per_minute = requests_per_minute;
            }
            if let Some(rate_limit_wait_secs) = sync.rate_limit_wait_secs {
                self.sync.rate_limit_wait_secs = rate_limit_wait_secs;
            }
            if let Some(lock_ttl_secs) = sync.lock_ttl_secs {
                self.sync.lock_ttl_secs = lock_ttl_secs;
            }
            if let Some(window) = sync.pending_response_window_minutes {
                self.sync.pending_response_window_minutes = window;
            }
            if let Some(page_size) = sync.page_size {
                self.sync.page_size = page_size;
            }
        }

        if let Some(classifier) = patch.classifier {
            if let Some(enabled) = classifier.llm_fallback_enabled {
                self.classifier.llm_fallback_enabled = enabled;
            }
            if let Some(timeout) = classifier.llm_timeout_secs {
                self.classifier.llm_timeout_secs = timeout;
            }
            if let Some(base_url) = classifier.llm_base_url {
                self.classifier.llm_base_url = Some(base_url);
            }
            if let Some(api_key) = classifier.llm_api_key {
                self.classifier.llm_api_key = Some(api_key.into());
            }
            if let Some(model) = classifier.llm_model {
                self.classifier.llm_model = model;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("UNIBOX_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("UNIBOX_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("UNIBOX_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("UNIBOX_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("UNIBOX_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("UNIBOX_SYNC_REQUESTS_PER_MINUTE") {
            self.sync.requests_per_minute = parse_u32("UNIBOX_SYNC_REQUESTS_PER_MINUTE", &value)?;
        }
        if let Some(value) = read_env("UNIBOX_SYNC_LOCK_TTL_SECS") {
            self.sync.lock_ttl_secs = parse_u64("UNIBOX_SYNC_LOCK_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("UNIBOX_SYNC_PENDING_RESPONSE_WINDOW_MINUTES") {
            self.sync.pending_response_window_minutes =
                parse_i64("UNIBOX_SYNC_PENDING_RESPONSE_WINDOW_MINUTES", &value)?;
        }

        if let Some(value) = read_env("UNIBOX_CLASSIFIER_LLM_FALLBACK_ENABLED") {
            self.classifier.llm_fallback_enabled =
                parse_bool("UNIBOX_CLASSIFIER_LLM_FALLBACK_ENABLED", &value)?;
        }
        if let Some(value) = read_env("UNIBOX_CLASSIFIER_LLM_TIMEOUT_SECS") {
            self.classifier.llm_timeout_secs =
                parse_u64("UNIBOX_CLASSIFIER_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("UNIBOX_CLASSIFIER_LLM_BASE_URL") {
            self.classifier.llm_base_url = Some(value);
        }
        if let Some(value) = read_env("UNIBOX_CLASSIFIER_LLM_API_KEY") {
            self.classifier.llm_api_key = Some(value.into());
        }
        if let Some(value) = read_env("UNIBOX_CLASSIFIER_LLM_MODEL") {
            self.classifier.llm_model = value;
        }

        let log_level = read_env("UNIBOX_LOGGING_LEVEL").or_else(|| read_env("UNIBOX_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("UNIBOX_LOGGING_FORMAT").or_else(|| read_env("UNIBOX_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.llm_fallback_enabled {
            self.classifier.llm_fallback_enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.database.timeout_secs == 0 || self.database.timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "database.timeout_secs must be in range 1..=300".to_string(),
            ));
        }

        if self.sync.requests_per_minute == 0 {
            return Err(ConfigError::Validation(
                "sync.requests_per_minute must be greater than zero".to_string(),
            ));
        }
        if self.sync.lock_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "sync.lock_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.sync.pending_response_window_minutes < 0 {
            return Err(ConfigError::Validation(
                "sync.pending_response_window_minutes must not be negative".to_string(),
            ));
        }
        if self.sync.page_size == 0 {
            return Err(ConfigError::Validation(
                "sync.page_size must be greater than zero".to_string(),
            ));
        }

        if self.classifier.llm_timeout_secs == 0 || self.classifier.llm_timeout_secs > 60 {
            return Err(ConfigError::Validation(
                "classifier.llm_timeout_secs must be in range 1..=60".to_string(),
            ));
        }
        if self.classifier.llm_fallback_enabled {
            let missing_url = self
                .classifier
                .llm_base_url
                .as_ref()
                .map(|value| value.trim().is_empty())
                .unwrap_or(true);
            if missing_url {
                return Err(ConfigError::Validation(
                    "classifier.llm_base_url is required when llm_fallback_enabled is true"
                        .to_string(),
                ));
            }
            let missing_key = self
                .classifier
                .llm_api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing_key {
                return Err(ConfigError::Validation(
                    "classifier.llm_api_key is required when llm_fallback_enabled is true"
                        .to_string(),
                ));
            }
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_string(),
            )),
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("unibox.toml"), PathBuf::from("config/unibox.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    sync: Option<SyncPatch>,
    classifier: Option<ClassifierPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncPatch {
    requests_per_minute: Option<u32>,
    rate_limit_wait_secs: Option<u64>,
    lock_ttl_secs: Option<u64>,
    pending_response_window_minutes: Option<i64>,
    page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierPatch {
    llm_fallback_enabled: Option<bool>,
    llm_timeout_secs: Option<u64>,
    llm_base_url: Option<String>,
    llm_api_key: Option<String>,
    llm_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
