//! Stack configuration
//!
//! Values come from three layers, highest precedence first: environment
//! variables, an optional TOML overlay, built-in defaults. The Perplexity
//! key has no default and must come from the environment.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Perplexity API key, required
pub const PERPLEXITY_API_KEY: &str = "PERPLEXITY_API_KEY";
/// Knowledge base id
pub const KNOWLEDGE_BASE_ID: &str = "KNOWLEDGE_BASE_ID";
/// Knowledge base data source id
pub const KNOWLEDGE_BASE_DATA_SOURCE_ID: &str = "KNOWLEDGE_BASE_DATA_SOURCE_ID";
/// Foundation model id
pub const MODEL_ID: &str = "MODEL_ID";
/// Deployment region
pub const CDK_DEFAULT_REGION: &str = "CDK_DEFAULT_REGION";
/// Deployment account
pub const CDK_DEFAULT_ACCOUNT: &str = "CDK_DEFAULT_ACCOUNT";
/// Seed for the ingestion secret
pub const INGESTION_API_KEY: &str = "INGESTION_API_KEY";
/// Ingestion cadence in minutes
pub const INGESTION_CADENCE_MINUTES: &str = "INGESTION_CADENCE_MINUTES";

/// Configuration errors, reported before any graph is built
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required variable absent or empty
    #[error("required environment variable {name} is not set")]
    MissingVariable {
        /// Variable name
        name: &'static str,
    },

    /// Variable present but unusable
    #[error("{name}={value:?} is invalid: {reason}")]
    InvalidValue {
        /// Variable name
        name: &'static str,
        /// Value as read
        value: String,
        /// What a usable value looks like
        reason: &'static str,
    },

    /// Overlay file could not be parsed
    #[error("config overlay: {0}")]
    Overlay(String),

    /// More than one of the above, in the order found
    #[error("{} configuration error(s): {}", .0.len(), join_errors(.0))]
    Multiple(Vec<ConfigError>),
}

impl ConfigError {
    /// Every individual error carried
    #[must_use]
    pub fn errors(&self) -> &[ConfigError] {
        match self {
            Self::Multiple(errors) => errors,
            single => std::slice::from_ref(single),
        }
    }

    fn from_batch(mut errors: Vec<ConfigError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Read access to environment variables
pub trait EnvSource {
    /// Value of `key`, if set
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Non-empty, trimmed value of `key`
fn read(env: &impl EnvSource, key: &str) -> Option<String> {
    env.var(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Optional values read from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverlay {
    /// Knowledge base id
    pub knowledge_base_id: Option<String>,
    /// Data source id
    pub data_source_id: Option<String>,
    /// Model id
    pub model_id: Option<String>,
    /// Region
    pub region: Option<String>,
    /// Account
    pub account: Option<String>,
    /// Ingestion cadence in minutes
    pub ingestion_cadence_minutes: Option<u64>,
    /// Stack tags, merged over the defaults
    pub tags: BTreeMap<String, String>,
}

impl ConfigOverlay {
    /// Parse an overlay
    ///
    /// # Errors
    /// `Overlay` on malformed TOML or unknown keys.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|e| ConfigError::Overlay(e.to_string()))
    }
}

/// Everything the chatbot topology needs from its environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Perplexity API key for the query function
    #[serde(skip_serializing, default)]
    pub perplexity_api_key: String,
    /// Knowledge base queried by the chatbot and fed by ingestion
    pub knowledge_base_id: String,
    /// Data source synced by ingestion jobs
    pub data_source_id: String,
    /// Foundation model used for answers
    pub model_id: String,
    /// Deployment region
    pub region: String,
    /// Deployment account, when pinned
    pub account: Option<String>,
    /// Whether the ingestion secret is seeded from `INGESTION_API_KEY`
    pub seed_ingestion_secret: bool,
    /// Minutes between ingestion runs
    pub ingestion_cadence_minutes: u64,
    /// Stack-wide tags
    pub tags: BTreeMap<String, String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            perplexity_api_key: String::new(),
            knowledge_base_id: "PGQV3JXPET".to_string(),
            data_source_id: "W8DS8YQGZG".to_string(),
            model_id: "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string(),
            region: "ap-northeast-2".to_string(),
            account: None,
            seed_ingestion_secret: false,
            ingestion_cadence_minutes: 10,
            tags: BTreeMap::from([
                ("Project".to_string(), "News Chatbot".to_string()),
                ("Environment".to_string(), "Production".to_string()),
                ("Owner".to_string(), "Seoul Economic Daily".to_string()),
            ]),
        }
    }
}

impl StackConfig {
    /// Defaults only; the API key is empty
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With API key
    #[inline]
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.perplexity_api_key = key.into();
        self
    }

    /// With knowledge base id
    #[inline]
    #[must_use]
    pub fn with_knowledge_base(mut self, id: impl Into<String>) -> Self {
        self.knowledge_base_id = id.into();
        self
    }

    /// With ingestion cadence
    #[inline]
    #[must_use]
    pub fn with_cadence_minutes(mut self, minutes: u64) -> Self {
        self.ingestion_cadence_minutes = minutes;
        self
    }

    /// With pinned account
    #[inline]
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Load from the environment alone
    ///
    /// # Errors
    /// See [`StackConfig::load`].
    pub fn from_env(env: &impl EnvSource) -> Result<Self, ConfigError> {
        Self::load(env, None)
    }

    /// Load from the environment over an optional overlay
    ///
    /// Every problem is collected before returning; a single one comes back
    /// as itself, several as `Multiple`.
    ///
    /// # Errors
    /// - `MissingVariable` if `PERPLEXITY_API_KEY` is absent or empty
    /// - `InvalidValue` if the cadence is not a positive integer
    pub fn load(env: &impl EnvSource, overlay: Option<&ConfigOverlay>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(overlay) = overlay {
            overlay_value(&mut config.knowledge_base_id, overlay.knowledge_base_id.as_deref());
            overlay_value(&mut config.data_source_id, overlay.data_source_id.as_deref());
            overlay_value(&mut config.model_id, overlay.model_id.as_deref());
            overlay_value(&mut config.region, overlay.region.as_deref());
            if overlay.account.is_some() {
                config.account.clone_from(&overlay.account);
            }
            if let Some(minutes) = overlay.ingestion_cadence_minutes {
                config.ingestion_cadence_minutes = minutes;
            }
            config
                .tags
                .extend(overlay.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let mut errors = Vec::new();

        match read(env, PERPLEXITY_API_KEY) {
            Some(key) => config.perplexity_api_key = key,
            None => errors.push(ConfigError::MissingVariable {
                name: PERPLEXITY_API_KEY,
            }),
        }

        if let Some(id) = read(env, KNOWLEDGE_BASE_ID) {
            config.knowledge_base_id = id;
        }
        if let Some(id) = read(env, KNOWLEDGE_BASE_DATA_SOURCE_ID) {
            config.data_source_id = id;
        }
        if let Some(id) = read(env, MODEL_ID) {
            config.model_id = id;
        }
        if let Some(region) = read(env, CDK_DEFAULT_REGION) {
            config.region = region;
        }
        if let Some(account) = read(env, CDK_DEFAULT_ACCOUNT) {
            config.account = Some(account);
        }
        config.seed_ingestion_secret = read(env, INGESTION_API_KEY).is_some();

        let cadence = match read(env, INGESTION_CADENCE_MINUTES) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: INGESTION_CADENCE_MINUTES,
                value: raw.clone(),
                reason: "expected a whole number of minutes",
            }),
            None => Ok(config.ingestion_cadence_minutes),
        };
        match cadence {
            Ok(0) => errors.push(ConfigError::InvalidValue {
                name: INGESTION_CADENCE_MINUTES,
                value: "0".to_string(),
                reason: "cadence must be at least one minute",
            }),
            Ok(minutes) => config.ingestion_cadence_minutes = minutes,
            Err(err) => errors.push(err),
        }

        if let Some(err) = ConfigError::from_batch(errors) {
            return Err(err);
        }

        tracing::debug!(
            knowledge_base = %config.knowledge_base_id,
            region = %config.region,
            cadence_minutes = config.ingestion_cadence_minutes,
            "stack config loaded"
        );
        Ok(config)
    }
}

fn overlay_value(slot: &mut String, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        *slot = value.to_string();
    }
}
