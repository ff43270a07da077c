//! Application settings.
//!
//! Layered: built-in defaults, then an optional TOML file, then
//! environment variables. Credentials are only ever read from the
//! environment (see [`crate::providers::Credentials`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedup::DedupConfig;
use crate::llm::LlmConfig;
use crate::orchestrators::PriorityConfig;
use crate::quota::QuotaConfig;
use crate::scheduler::{PipelineConfig, SchedulerConfig};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FOLIO_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// PostgreSQL URL. Without one, state lives in memory.
    pub database_url: Option<String>,
    /// Redis URL for quota counters and the response cache.
    pub redis_url: Option<String>,
    pub pool_size: usize,
    pub user_agent: String,
    /// Per-call timeout for lookups, in seconds.
    pub request_timeout_secs: u64,
    /// Per-call timeout for generative providers, in seconds.
    pub generation_timeout_secs: u64,
    /// Response cache TTL in hours; 0 disables the cache.
    pub cache_ttl_hours: u64,
    /// Merge metadata from every source into catalog rows.
    pub enrich_catalog: bool,
    pub quota: QuotaConfig,
    pub scheduler: SchedulerConfig,
    pub dedup: DedupConfig,
    pub llm: LlmConfig,
    /// Capability name -> provider names consulted first.
    pub priorities: PriorityConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            pool_size: 10,
            user_agent: crate::http_client::USER_AGENT.to_string(),
            request_timeout_secs: 15,
            generation_timeout_secs: 60,
            cache_ttl_hours: 24,
            enrich_catalog: true,
            quota: QuotaConfig::default(),
            scheduler: SchedulerConfig::default(),
            dedup: DedupConfig::default(),
            llm: LlmConfig::default(),
            priorities: PriorityConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from `config_path` (or `$FOLIO_CONFIG`) and the
    /// process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_ENV).ok().filter(|s| !s.is_empty());
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| env_path.map(PathBuf::from));

        let mut settings = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env(&|name| std::env::var(name).ok().filter(|s| !s.is_empty()))?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment variables read through `env`.
    pub fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = env("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(url) = env("REDIS_URL") {
            self.redis_url = Some(url);
        }
        if let Some(secs) = parse_env(env, "FOLIO_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = secs;
        }
        if let Some(secs) = parse_env(env, "FOLIO_GENERATION_TIMEOUT_SECS")? {
            self.generation_timeout_secs = secs;
        }
        if let Some(limit) = parse_env(env, "FOLIO_QUOTA_DAILY_LIMIT")? {
            self.quota.daily_limit = limit;
        }
        if let Some(size) = parse_env(env, "FOLIO_BATCH_SIZE")? {
            self.scheduler.batch_size = size;
        }
        if let Some(size) = parse_env(env, "FOLIO_POOL_SIZE")? {
            self.pool_size = size;
        }
        if let Some(threshold) = parse_env(env, "FOLIO_SIMILARITY_THRESHOLD")? {
            self.dedup.similarity_threshold = threshold;
        }
        self.llm.apply_env(env);
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_hours > 0).then(|| Duration::from_secs(self.cache_ttl_hours * 3600))
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            books_per_month: self.llm.books_per_month,
            enrich: self.enrich_catalog,
            timeout: self.request_timeout(),
            generation_timeout: self.generation_timeout(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        None => Ok(None),
    }
}
