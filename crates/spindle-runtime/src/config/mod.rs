//! Configuration for the Spindle runtime.
//!
//! Settings are layered with figment (see [`loader`]) and validated before
//! use. The schema covers logging, the named schedulers and the route table
//! strategy.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, RouteCacheConfig, RoutingConfig,
    RoutingKind, SpanEventConfig, SpindleConfig,
};
pub use validation::validate_config;
