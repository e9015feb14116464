//! Spindle Runtime - configuration, logging and assembly for the Spindle
//! dispatch engine.
//!
//! This crate provides:
//! - Layered configuration (`SpindleConfig`, `ConfigLoader`) on figment
//! - Logging setup on `tracing-subscriber`
//! - Runtime assembly (`SpindleRuntime`): configured schedulers and routing
//!   strategy plus routes registered in code, built into a `Dispatcher`
//! - Signal-driven shutdown
//!
//! ```ignore
//! use spindle_runtime::SpindleRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), spindle_runtime::RuntimeError> {
//!     let runtime = SpindleRuntime::builder().build()?;
//!     runtime.init_logging();
//!
//!     let dispatcher = runtime.routes(my_routes()).build()?;
//!     serve(dispatcher.clone());
//!
//!     spindle_runtime::run_until_signal(&dispatcher).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, SpindleConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, SpindleRuntime, run_until, run_until_signal};

// Logging crates, so applications need not depend on them directly
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the logging macros and the `instrument` attribute.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
