//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (`CARNOTSTITCH_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [optimizer]
//! max_iterations = 16
//!
//! [stitcher]
//! max_request_age_ms = 5000
//!
//! [uprobe]
//! rescan_for_dlopen = true
//! rescan_exp_backoff_factor = 2.0
//! enable_http2_tracing = false
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! CARNOTSTITCH_OPTIMIZER__MAX_ITERATIONS=32
//! CARNOTSTITCH_UPROBE__ENABLE_HTTP2_TRACING=true
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub stitcher: StitcherConfig,
    #[serde(default)]
    pub uprobe: UProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// IR rewrite-rule fixpoint driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Upper bound on fixpoint iterations before the driver gives up and
    /// returns the best plan found so far.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

/// Protocol stitcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitcherConfig {
    /// Requests older than this are evicted by `ConnectionTracker::evict_stale`
    /// even if no matching response ever arrives.
    #[serde(default = "default_max_request_age_ms")]
    pub max_request_age_ms: u64,
}

/// UProbe manager feature flags, mirroring spec §6's flag set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UProbeConfig {
    #[serde(default = "default_true")]
    pub rescan_for_dlopen: bool,
    #[serde(default = "default_backoff_factor")]
    pub rescan_exp_backoff_factor: f64,
    #[serde(default)]
    pub enable_http2_tracing: bool,
    #[serde(default)]
    pub disable_self_probing: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_iterations() -> usize {
    16
}
fn default_max_request_age_ms() -> u64 {
    5_000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            max_iterations: default_max_iterations(),
        }
    }
}

impl Default for StitcherConfig {
    fn default() -> Self {
        StitcherConfig {
            max_request_age_ms: default_max_request_age_ms(),
        }
    }
}

impl Default for UProbeConfig {
    fn default() -> Self {
        UProbeConfig {
            rescan_for_dlopen: true,
            rescan_exp_backoff_factor: default_backoff_factor(),
            enable_http2_tracing: false,
            disable_self_probing: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. `config.toml` (base configuration)
    /// 2. `config.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`CARNOTSTITCH_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("CARNOTSTITCH_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CARNOTSTITCH_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            optimizer: OptimizerConfig::default(),
            stitcher: StitcherConfig::default(),
            uprobe: UProbeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.optimizer.max_iterations, 16);
        assert_eq!(config.stitcher.max_request_age_ms, 5_000);
        assert!(config.uprobe.rescan_for_dlopen);
        assert!((config.uprobe.rescan_exp_backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[optimizer]"));
        assert!(toml_str.contains("[uprobe]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.optimizer.max_iterations, config.optimizer.max_iterations);
    }
}
