//! Configuration management for Meld
//!
//! Everything the engine can be tuned with is plain data here: which
//! backend families are enabled, the fusion method and its parameters,
//! concurrency sizing, cache sizing, and monitoring. Configuration is
//! loaded from TOML, overridden from the environment, and validated as a
//! whole before use.

use crate::error::{MeldError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Schema version understood by this build
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub parallel: ParallelConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub performance_mode: PerformanceMode,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Which backend families the hybrid retriever may use, and how many
/// candidates it asks each of them for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub enable_dense: bool,
    pub enable_sparse: bool,
    pub enable_fulltext: bool,
    pub enable_graph: bool,
    /// Backends are asked for `top_k * candidate_multiplier` results...
    pub candidate_multiplier: usize,
    /// ...but never more than this
    pub candidate_cap: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            enable_dense: true,
            enable_sparse: true,
            enable_fulltext: true,
            enable_graph: true,
            candidate_multiplier: 2,
            candidate_cap: 20,
        }
    }
}

/// Fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// "reciprocal_rank"/"rrf", "weighted_sum"/"weighted",
    /// "borda_count"/"borda" or "adaptive"
    pub method: String,
    /// RRF K constant (typically 60)
    pub rrf_k: f32,
    /// Per-source weights layered over the built-in table
    pub source_weights: HashMap<String, f32>,
    pub adaptive: AdaptiveFusionConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            method: "adaptive".to_string(),
            rrf_k: 60.0,
            source_weights: HashMap::new(),
            adaptive: AdaptiveFusionConfig::default(),
        }
    }
}

/// Rules for the adaptive fusion dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveFusionConfig {
    /// Queries with at most this many tokens use RRF
    pub short_query_max_tokens: usize,
    /// Queries containing any of these use weighted sum
    pub technical_terms: Vec<String>,
}

impl Default for AdaptiveFusionConfig {
    fn default() -> Self {
        Self {
            short_query_max_tokens: 2,
            technical_terms: to_strings(&[
                "設定", "コマンド", "機能", "操作", "エラー", "問題", "config", "setting",
                "command", "error", "function", "operation", "problem",
            ]),
        }
    }
}

/// Thread-pool fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub enabled: bool,
    pub max_workers: usize,
    /// Soft timeout for a single backend call
    pub task_timeout: String,
    /// Bound on the whole fan-out
    pub total_timeout: String,
}

impl ParallelConfig {
    pub fn task_timeout(&self) -> Result<Duration> {
        parse_duration(&self.task_timeout).map_err(|message| MeldError::InvalidConfigValue {
            path: "parallel.task_timeout".to_string(),
            message,
        })
    }

    pub fn total_timeout(&self) -> Result<Duration> {
        parse_duration(&self.total_timeout).map_err(|message| MeldError::InvalidConfigValue {
            path: "parallel.total_timeout".to_string(),
            message,
        })
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_workers: 4,
            task_timeout: "5s".to_string(),
            total_timeout: "30s".to_string(),
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    pub ttl_seconds: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 128,
            ttl_seconds: 3600,
        }
    }
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Streaming retriever sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub batch_size: usize,
    pub max_total_results: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_total_results: 100,
        }
    }
}

/// Rules for choosing between streaming and batch search per request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Requests asking for more than this many results stream
    pub streaming_top_k_threshold: usize,
    /// Queries containing any of these stream
    pub streaming_terms: Vec<String>,
    /// Queries with at most this many tokens take the cached path
    pub cached_max_tokens: usize,
    /// Queries containing any of these take the cached path
    pub cached_terms: Vec<String>,
    /// Batch size used when a request streams
    pub streaming_batch_size: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            streaming_top_k_threshold: 20,
            streaming_terms: to_strings(&[
                "全て", "すべて", "一覧", "リスト", "list all", "show all", "everything",
            ]),
            cached_max_tokens: 3,
            cached_terms: to_strings(&[
                "とは", "について", "方法", "手順", "what is", "how to", "about",
            ]),
            streaming_batch_size: 3,
        }
    }
}

fn to_strings(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

/// Named preset trading speed against memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    /// Parallel + large cache, no monitoring
    Speed,
    /// Sequential, uncached, monitored
    Memory,
    /// Everything on
    #[default]
    Balanced,
}

impl PerformanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceMode::Speed => "speed",
            PerformanceMode::Memory => "memory",
            PerformanceMode::Balanced => "balanced",
        }
    }

    /// Settings this preset applies
    pub fn overrides(&self) -> ProfileOverrides {
        let (parallel, caching, monitoring, capacity, ttl, timeout) = match self {
            PerformanceMode::Speed => (true, true, false, 256, 7200, "15s"),
            PerformanceMode::Memory => (false, false, true, 32, 1800, "60s"),
            PerformanceMode::Balanced => (true, true, true, 128, 3600, "30s"),
        };

        ProfileOverrides {
            parallel_enabled: Some(parallel),
            cache_enabled: Some(caching),
            monitoring_enabled: Some(monitoring),
            cache_capacity: Some(capacity),
            cache_ttl_seconds: Some(ttl),
            total_timeout: Some(timeout.to_string()),
            fusion_method: None,
        }
    }
}

impl FromStr for PerformanceMode {
    type Err = MeldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speed" => Ok(PerformanceMode::Speed),
            "memory" => Ok(PerformanceMode::Memory),
            "balanced" => Ok(PerformanceMode::Balanced),
            _ => Err(MeldError::InvalidConfigValue {
                path: "performance_mode".to_string(),
                message: format!("Unknown performance mode '{}'", s),
            }),
        }
    }
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion_method: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MeldError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MeldError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| MeldError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    ///
    /// User-defined profiles win; otherwise the name must be one of the
    /// built-in performance modes.
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = match self.profiles.get(profile) {
            Some(overrides) => overrides.clone(),
            None => {
                let mode: PerformanceMode = profile.parse()?;
                self.performance_mode = mode;
                mode.overrides()
            }
        };

        if let Some(enabled) = overrides.parallel_enabled {
            self.parallel.enabled = enabled;
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = enabled;
        }
        if let Some(enabled) = overrides.monitoring_enabled {
            self.monitoring.enabled = enabled;
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = capacity;
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = ttl;
        }
        if let Some(timeout) = overrides.total_timeout {
            self.parallel.total_timeout = timeout;
        }
        if let Some(method) = overrides.fusion_method {
            self.fusion.method = method;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: MELD_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("MELD_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    pub(crate) fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "HYBRID__ENABLE_DENSE" => self.hybrid.enable_dense = parse_env(path, value)?,
            "HYBRID__ENABLE_SPARSE" => self.hybrid.enable_sparse = parse_env(path, value)?,
            "HYBRID__ENABLE_FULLTEXT" => self.hybrid.enable_fulltext = parse_env(path, value)?,
            "HYBRID__ENABLE_GRAPH" => self.hybrid.enable_graph = parse_env(path, value)?,
            "HYBRID__CANDIDATE_MULTIPLIER" => {
                self.hybrid.candidate_multiplier = parse_env(path, value)?
            }
            "HYBRID__CANDIDATE_CAP" => self.hybrid.candidate_cap = parse_env(path, value)?,
            "FUSION__METHOD" => self.fusion.method = value.to_string(),
            "FUSION__RRF_K" => self.fusion.rrf_k = parse_env(path, value)?,
            "PARALLEL__ENABLED" => self.parallel.enabled = parse_env(path, value)?,
            "PARALLEL__MAX_WORKERS" => self.parallel.max_workers = parse_env(path, value)?,
            "PARALLEL__TASK_TIMEOUT" => self.parallel.task_timeout = value.to_string(),
            "PARALLEL__TOTAL_TIMEOUT" => self.parallel.total_timeout = value.to_string(),
            "CACHE__ENABLED" => self.cache.enabled = parse_env(path, value)?,
            "CACHE__CAPACITY" => self.cache.capacity = parse_env(path, value)?,
            "CACHE__TTL_SECONDS" => self.cache.ttl_seconds = parse_env(path, value)?,
            "MONITORING__ENABLED" => self.monitoring.enabled = parse_env(path, value)?,
            "STREAMING__BATCH_SIZE" => self.streaming.batch_size = parse_env(path, value)?,
            "STREAMING__MAX_TOTAL_RESULTS" => {
                self.streaming.max_total_results = parse_env(path, value)?
            }
            "STRATEGY__STREAMING_TOP_K_THRESHOLD" => {
                self.strategy.streaming_top_k_threshold = parse_env(path, value)?
            }
            "STRATEGY__STREAMING_TERMS" => self.strategy.streaming_terms = parse_list(value),
            "STRATEGY__CACHED_MAX_TOKENS" => {
                self.strategy.cached_max_tokens = parse_env(path, value)?
            }
            "STRATEGY__CACHED_TERMS" => self.strategy.cached_terms = parse_list(value),
            "STRATEGY__STREAMING_BATCH_SIZE" => {
                self.strategy.streaming_batch_size = parse_env(path, value)?
            }
            "PERFORMANCE_MODE" => self.performance_mode = value.parse()?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| MeldError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("meld").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            hybrid: HybridConfig::default(),
            fusion: FusionConfig::default(),
            parallel: ParallelConfig::default(),
            cache: CacheConfig::default(),
            monitoring: MonitoringConfig::default(),
            streaming: StreamingConfig::default(),
            strategy: StrategyConfig::default(),
            performance_mode: PerformanceMode::default(),
            profiles: HashMap::new(),
        }
    }
}

fn parse_env<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| MeldError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Comma-separated list, blanks dropped
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Roughly one year; anything longer is a typo
const MAX_DURATION_SECS: f64 = 31_536_000.0;

/// Parse duration strings like "250ms", "5s", "10m", "1h"
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("Invalid duration format: {}", s))?;

    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("Unknown duration unit '{}' in {}", other, s)),
    };

    if !seconds.is_finite() || !(0.0..=MAX_DURATION_SECS).contains(&seconds) {
        return Err(format!("Invalid duration: {}", s));
    }
    Ok(Duration::from_secs_f64(seconds))
}
