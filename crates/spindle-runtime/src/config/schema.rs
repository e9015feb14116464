//! The configuration tree, as read from `spindle.toml`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use spindle_core::scheduler::SchedulerConfig;
use spindle_framework::deploy::RoutingStrategy;
use spindle_framework::route::{AlwaysPromote, CacheConfig, PromoteEvery};

/// Root of the configuration tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpindleConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Worker pools routes can run on.
    #[serde(default = "default_schedulers")]
    pub schedulers: Vec<SchedulerConfig>,

    /// Scheduler for routes that do not name one.
    #[serde(default)]
    pub default_scheduler: Option<String>,

    /// Route table settings.
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl Default for SpindleConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            schedulers: default_schedulers(),
            default_scheduler: None,
            routing: RoutingConfig::default(),
        }
    }
}

fn default_schedulers() -> Vec<SchedulerConfig> {
    vec![SchedulerConfig::new("default")]
}

// =============================================================================
// Routing
// =============================================================================

/// Which route table implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingKind {
    /// Evaluate every route per request.
    #[default]
    Linear,
    /// Cache candidate routes per request signature.
    Cached,
}

/// Route table settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Route table implementation.
    #[serde(default)]
    pub strategy: RoutingKind,

    /// Signature cache limits, used by the cached strategy.
    #[serde(default)]
    pub cache: RouteCacheConfig,
}

/// Limits of the signature cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteCacheConfig {
    /// The cache is only consulted with more routes than this.
    #[serde(default = "default_min_routes")]
    pub min_routes: usize,

    /// Maximum number of cached signatures.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Cache a missed signature on every n-th lookup; 1 caches every miss.
    #[serde(default = "default_promote_every")]
    pub promote_every: u64,
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            min_routes: defaults.min_routes,
            capacity: defaults.capacity,
            promote_every: default_promote_every(),
        }
    }
}

fn default_min_routes() -> usize {
    CacheConfig::default().min_routes
}

fn default_cache_capacity() -> usize {
    CacheConfig::default().capacity
}

fn default_promote_every() -> u64 {
    1
}

impl RoutingConfig {
    /// The routing strategy these settings describe.
    pub fn strategy(&self) -> RoutingStrategy {
        match self.strategy {
            RoutingKind::Linear => RoutingStrategy::Linear,
            RoutingKind::Cached => {
                let config = CacheConfig {
                    min_routes: self.cache.min_routes,
                    capacity: self.cache.capacity,
                };
                match self.cache.promote_every {
                    0 | 1 => RoutingStrategy::cached_with(config, AlwaysPromote),
                    n => RoutingStrategy::cached_with(config, PromoteEvery::new(n)),
                }
            }
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level name as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact without it.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// When the log file is rolled over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread names and ids, which identify scheduler workers.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target levels, e.g. `spindle_framework = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SpindleConfig::default();
        assert_eq!(config.schedulers.len(), 1);
        assert_eq!(config.schedulers[0].name, "default");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(matches!(config.routing.strategy(), RoutingStrategy::Linear));
    }

    #[test]
    fn test_cached_strategy() {
        let routing = RoutingConfig {
            strategy: RoutingKind::Cached,
            cache: RouteCacheConfig {
                min_routes: 0,
                capacity: 32,
                promote_every: 3,
            },
        };
        match routing.strategy() {
            RoutingStrategy::Cached { config, .. } => {
                assert_eq!(config.capacity, 32);
                assert_eq!(config.min_routes, 0);
            }
            other => panic!("unexpected strategy: {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_logging() {
        let config: LoggingConfig = serde_json::from_str(
            r#"{"level":"debug","output":"file","file_path":"/tmp/s.log","filters":{"spindle_core":"trace"}}"#,
        )
        .unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.filters["spindle_core"], LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Compact);
    }
}
