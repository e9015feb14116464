//! Runtime assembly.
//!
//! [`SpindleRuntime`] turns a [`SpindleConfig`] into running schedulers and
//! a routing strategy, collects routes and exception handlers, and builds
//! the [`Dispatcher`] a transport feeds requests into.

use std::future::Future;

use tokio::signal;
use tracing::info;

use spindle_core::scheduler::Scheduler;
use spindle_framework::deploy::{Deployment, RouteDefinition};
use spindle_framework::dispatcher::Dispatcher;
use spindle_framework::exception::{ExceptionHandler, TerminalExceptionHandler};
use spindle_framework::resolver::ResolverRegistry;

use crate::config::{ConfigLoader, SpindleConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Configuration plus everything registered in code.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = SpindleRuntime::builder().profile("production").build()?;
/// runtime.init_logging();
///
/// let dispatcher = runtime
///     .route(RouteDefinition::get("/health").handler(|| async { Ok::<_, HttpError>("ok") }))
///     .build()?;
///
/// // hand `dispatcher` to a transport, then:
/// spindle_runtime::run_until_signal(&dispatcher).await?;
/// ```
#[derive(Debug)]
pub struct SpindleRuntime {
    config: SpindleConfig,
    deployment: Deployment,
}

impl Default for SpindleRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SpindleRuntime {
    /// Creates a runtime with the built-in default configuration.
    pub fn new() -> Self {
        Self {
            config: SpindleConfig::default(),
            deployment: Deployment::new(),
        }
    }

    /// Returns a builder that loads configuration from files and the
    /// environment.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an explicit configuration.
    pub fn from_config(config: SpindleConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        info!(
            schedulers = config.schedulers.len(),
            routing = ?config.routing.strategy,
            "Runtime configured"
        );
        Ok(Self {
            config,
            deployment: Deployment::new(),
        })
    }

    /// The configuration.
    pub fn config(&self) -> &SpindleConfig {
        &self.config
    }

    /// Installs the global subscriber from the logging configuration.
    pub fn init_logging(&self) {
        logging::init_from_config(&self.config.logging);
    }

    /// Uses a custom resolver registry.
    pub fn registry(mut self, registry: ResolverRegistry) -> Self {
        self.deployment = self.deployment.registry(registry);
        self
    }

    /// Adds a scheduler built in code, next to the configured ones.
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.deployment = self.deployment.scheduler(scheduler);
        self
    }

    /// Registers a route.
    pub fn route(mut self, route: RouteDefinition) -> Self {
        self.deployment = self.deployment.route(route);
        self
    }

    /// Registers several routes.
    pub fn routes(self, routes: impl IntoIterator<Item = RouteDefinition>) -> Self {
        routes.into_iter().fold(self, Self::route)
    }

    /// Adds an exception handler.
    pub fn exception_handler(mut self, handler: impl ExceptionHandler + 'static) -> Self {
        self.deployment = self.deployment.exception_handler(handler);
        self
    }

    /// Replaces the terminal exception handler.
    pub fn terminal_exception_handler(
        mut self,
        handler: impl TerminalExceptionHandler + 'static,
    ) -> Self {
        self.deployment = self.deployment.terminal_exception_handler(handler);
        self
    }

    /// Starts the configured schedulers and builds the dispatcher.
    pub fn build(self) -> RuntimeResult<Dispatcher> {
        let Self { config, deployment } = self;

        let mut deployment = deployment.routing(config.routing.strategy());
        if let Some(name) = config.default_scheduler {
            deployment = deployment.default_scheduler(name);
        }
        for scheduler_config in config.schedulers {
            let name = scheduler_config.name.clone();
            let scheduler = Scheduler::new(scheduler_config)
                .map_err(|source| RuntimeError::SchedulerStart { name, source })?;
            deployment = deployment.scheduler(scheduler);
        }

        Ok(deployment.build()?)
    }
}

// =============================================================================
// Shutdown
// =============================================================================

/// Waits for Ctrl+C (or SIGTERM on Unix), then shuts every scheduler down.
pub async fn run_until_signal(dispatcher: &Dispatcher) -> RuntimeResult<()> {
    info!("Spindle is running. Press Ctrl+C to stop.");
    wait_for_signal().await?;
    dispatcher.shutdown();
    info!("Spindle stopped");
    Ok(())
}

/// Waits for `shutdown`, then shuts every scheduler down.
pub async fn run_until<F>(dispatcher: &Dispatcher, shutdown: F)
where
    F: Future<Output = ()>,
{
    shutdown.await;
    dispatcher.shutdown();
    info!("Spindle stopped");
}

async fn wait_for_signal() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration and creates a [`SpindleRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a builder with the default search paths and environment
    /// overrides enabled.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    /// Loads this file instead of searching.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables environment overrides.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration programmatically.
    pub fn merge(mut self, config: SpindleConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and creates the runtime.
    pub fn build(self) -> RuntimeResult<SpindleRuntime> {
        SpindleRuntime::from_config(self.config_loader.load()?)
    }
}
