use crate::error::{AppError, Result};
use crate::search::SortField;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an optional override file
pub const CONFIG_PATH_ENV: &str = "CHALLENGE_INDEX_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/challenge-index.toml";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backing store configuration
    pub store: StoreConfig,

    /// Index layout and query behaviour
    pub index: IndexConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, the override file and environment
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load configuration using `path` as the (optional) override file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix: CHALLENGE_INDEX__)
            .add_source(
                config::Environment::with_prefix("CHALLENGE_INDEX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the index cannot run with
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.index.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend type
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection string
    pub redis_url: Option<String>,
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Redis
            && self.redis_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err(AppError::Configuration(
                "Redis backend requires 'redis_url' configuration".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Redis,
    InMemory,
}

/// Inclusive numeric bounds used when a range filter omits one side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RangeBounds {
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Namespace every index key lives under
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Time-to-live of union/intersection/range keys built while searching
    #[serde(default = "default_ephemeral_ttl")]
    pub ephemeral_ttl_secs: u64,

    /// Give every search call its own ephemeral keys instead of sharing by query shape
    #[serde(default)]
    pub isolate_ephemeral_keys: bool,

    /// Community bucket for challenges without a community
    #[serde(default = "default_public_community")]
    pub public_community: String,

    /// Sort applied when a request names none; `"none"` keeps store order
    #[serde(
        default = "default_sort",
        deserialize_with = "deserialize_default_sort"
    )]
    pub default_sort: Option<SortField>,

    /// Defaults for open-ended prize money ranges
    #[serde(default = "default_prize_money_bounds")]
    pub prize_money_bounds: RangeBounds,

    /// Defaults for open-ended participant ranges
    #[serde(default = "default_participant_bounds")]
    pub participant_bounds: RangeBounds,

    /// Upserts in flight during a reconcile pass
    #[serde(default = "default_reconcile_concurrency")]
    pub reconcile_concurrency: usize,

    /// Period of the background reconcile task, if one is started
    #[serde(default)]
    pub reconcile_interval_secs: Option<u64>,
}

impl IndexConfig {
    pub fn ephemeral_ttl(&self) -> Duration {
        Duration::from_secs(self.ephemeral_ttl_secs)
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        self.reconcile_interval_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.trim().is_empty() {
            return Err(AppError::Configuration(
                "index.key_prefix must not be empty".to_string(),
            ));
        }
        // '*' is substituted by SORT ... BY patterns
        if self.key_prefix.contains('*') {
            return Err(AppError::Configuration(
                "index.key_prefix must not contain '*'".to_string(),
            ));
        }
        if self.ephemeral_ttl_secs == 0 {
            return Err(AppError::Configuration(
                "index.ephemeral_ttl_secs must be positive".to_string(),
            ));
        }
        if self.public_community.trim().is_empty() {
            return Err(AppError::Configuration(
                "index.public_community must not be empty".to_string(),
            ));
        }
        if self.reconcile_concurrency == 0 {
            return Err(AppError::Configuration(
                "index.reconcile_concurrency must be positive".to_string(),
            ));
        }
        if self.reconcile_interval_secs == Some(0) {
            return Err(AppError::Configuration(
                "index.reconcile_interval_secs must be positive".to_string(),
            ));
        }
        for (name, bounds) in [
            ("prize_money_bounds", self.prize_money_bounds),
            ("participant_bounds", self.participant_bounds),
        ] {
            if bounds.min > bounds.max {
                return Err(AppError::Configuration(format!(
                    "index.{}: min {} exceeds max {}",
                    name, bounds.min, bounds.max
                )));
            }
        }
        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            ephemeral_ttl_secs: default_ephemeral_ttl(),
            isolate_ephemeral_keys: false,
            public_community: default_public_community(),
            default_sort: default_sort(),
            prize_money_bounds: default_prize_money_bounds(),
            participant_bounds: default_participant_bounds(),
            reconcile_concurrency: default_reconcile_concurrency(),
            reconcile_interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_key_prefix() -> String {
    "search:challenge".to_string()
}

fn default_ephemeral_ttl() -> u64 {
    60
}

fn default_public_community() -> String {
    "public".to_string()
}

fn default_sort() -> Option<SortField> {
    Some(SortField::Title)
}

fn default_prize_money_bounds() -> RangeBounds {
    RangeBounds {
        min: 0,
        max: 1_000_000,
    }
}

fn default_participant_bounds() -> RangeBounds {
    RangeBounds { min: 0, max: 1_000 }
}

fn default_reconcile_concurrency() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

fn deserialize_default_sort<'de, D>(deserializer: D) -> std::result::Result<Option<SortField>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    raw.parse::<SortField>()
        .map(Some)
        .map_err(|_| serde::de::Error::custom(format!("unknown sort field '{}'", raw)))
}
