//! Application configuration.
//!
//! Loaded from TOML, or from YAML when the file ends in `.yml`/`.yaml`. Every
//! section except `symbols` and `provider` has defaults. The API key may come
//! from the environment; see [`AppConfig::resolve_api_key`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use quotewatch_core::data::{alpha_vantage, finnhub, CachePolicy, ProviderKind, RetryPolicy};
use quotewatch_core::Symbol;

use crate::portfolio::Holdings;

/// Placeholder shipped in sample configs; treated as "no key".
pub const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY";

/// Checked before the provider-specific variable.
pub const API_KEY_ENV: &str = "QUOTEWATCH_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("config validation failed: {0}")]
    Validation(String),

    #[error("no API key for {provider}: set {env_var} (or QUOTEWATCH_API_KEY) or provider.api_key")]
    MissingCredential {
        provider: ProviderKind,
        env_var: &'static str,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub symbols: Vec<Symbol>,

    /// Shares held per symbol.
    #[serde(default)]
    pub portfolio: BTreeMap<Symbol, Decimal>,

    pub provider: ProviderConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Overrides the provider's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Defaults per provider: see [`ProviderConfig::retry_policy`].
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ProviderConfig {
    /// Environment variable holding this provider's key.
    pub fn env_var(&self) -> &'static str {
        match self.kind {
            ProviderKind::AlphaVantage => "ALPHA_VANTAGE_API_KEY",
            ProviderKind::Finnhub => "FINNHUB_API_KEY",
        }
    }

    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.kind) {
            (Some(url), _) => url,
            (None, ProviderKind::AlphaVantage) => alpha_vantage::DEFAULT_BASE_URL,
            (None, ProviderKind::Finnhub) => finnhub::DEFAULT_BASE_URL,
        }
    }

    /// Alpha Vantage retries 3 times with base 2 by default; Finnhub makes a
    /// single attempt.
    pub fn retry_policy(&self) -> RetryPolicy {
        match (self.retry, self.kind) {
            (Some(policy), _) => policy,
            (None, ProviderKind::AlphaVantage) => RetryPolicy::default(),
            (None, ProviderKind::Finnhub) => RetryPolicy::no_retry(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_calls_per_min: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls_per_min: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBucket {
    #[default]
    Symbol,
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub bucket: CacheBucket,
    /// Used by the `symbol` bucket.
    pub ttl_minutes: u64,
    /// Used by the `daily` bucket.
    pub ttl_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache"),
            bucket: CacheBucket::Symbol,
            ttl_minutes: 29,
            ttl_days: 1,
        }
    }
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        match self.bucket {
            CacheBucket::Symbol => CachePolicy::Symbol {
                ttl_minutes: self.ttl_minutes,
            },
            CacheBucket::Daily => CachePolicy::Daily {
                ttl_days: self.ttl_days,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_hours: u64,
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_hours: 8,
            run_on_start: true,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Append-only JSONL point store; also what the dashboard reads when
    /// InfluxDB is not configured.
    pub jsonl: Option<JsonlConfig>,
    pub csv: Option<CsvConfig>,
    pub influxdb: Option<InfluxConfig>,
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvConfig {
    pub path: PathBuf,
    /// Skip the append when today's row already exists.
    #[serde(default = "default_true")]
    pub once_per_day: bool,
}

fn default_true() -> bool {
    true
}

/// InfluxDB v2 connection. Missing pieces are tolerated at load time; the
/// sink is skipped with an error log when incomplete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub org: Option<String>,
    pub bucket: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl AppConfig {
    /// Read, parse and validate a config file. The format follows the
    /// extension: `.yml`/`.yaml` is YAML, anything else TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml" | "yaml")
        );
        if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml_bw::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Validation("symbols must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if !seen.insert(symbol) {
                return Err(ConfigError::Validation(format!(
                    "duplicate symbol '{symbol}'"
                )));
            }
        }
        for (symbol, shares) in &self.portfolio {
            if shares.is_sign_negative() {
                return Err(ConfigError::Validation(format!(
                    "portfolio shares for '{symbol}' must not be negative"
                )));
            }
        }
        if self.rate_limit.max_calls_per_min == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.max_calls_per_min must be > 0".into(),
            ));
        }
        let retry = self.provider.retry_policy();
        if retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "provider.retry.max_attempts must be >= 1".into(),
            ));
        }
        if retry.backoff_base.is_nan() || retry.backoff_base < 1.0 {
            return Err(ConfigError::Validation(
                "provider.retry.backoff_base must be >= 1".into(),
            ));
        }
        let ttl_zero = match self.cache.bucket {
            CacheBucket::Symbol => self.cache.ttl_minutes == 0,
            CacheBucket::Daily => self.cache.ttl_days == 0,
        };
        if ttl_zero {
            return Err(ConfigError::Validation("cache TTL must be > 0".into()));
        }
        if self.batch.concurrency == 0 {
            return Err(ConfigError::Validation(
                "batch.concurrency must be >= 1".into(),
            ));
        }
        if self.scheduler.interval_hours == 0 {
            return Err(ConfigError::Validation(
                "scheduler.interval_hours must be >= 1".into(),
            ));
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "provider.timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// API key lookup order: `QUOTEWATCH_API_KEY`, the provider's own
    /// variable, then `provider.api_key`. Empty values and the
    /// `YOUR_API_KEY` placeholder count as absent.
    pub fn resolve_api_key(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        let usable = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && s != PLACEHOLDER_API_KEY)
        };
        usable(env(API_KEY_ENV))
            .or_else(|| usable(env(self.provider.env_var())))
            .or_else(|| usable(self.provider.api_key.clone()))
            .ok_or(ConfigError::MissingCredential {
                provider: self.provider.kind,
                env_var: self.provider.env_var(),
            })
    }

    /// `resolve_api_key` against the process environment.
    pub fn api_key_from_env(&self) -> Result<String, ConfigError> {
        self.resolve_api_key(|name| std::env::var(name).ok())
    }

    pub fn holdings(&self) -> Holdings {
        Holdings::new(self.portfolio.clone())
    }
}
