//! Checks that need more than one field, or that serde cannot express.

use std::collections::HashSet;

use spindle_core::scheduler::{QueueKind, SchedulerConfig};

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, RoutingConfig, RoutingKind, SpindleConfig};

/// Validates a merged configuration.
pub fn validate_config(config: &SpindleConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_schedulers(&config.schedulers)?;
    if let Some(name) = &config.default_scheduler
        && !config.schedulers.iter().any(|s| &s.name == name)
    {
        return Err(ConfigError::UnknownScheduler(name.clone()));
    }
    validate_routing_config(&config.routing)?;
    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.output == LogOutput::File && config.file_path.is_none() {
        return Err(ConfigError::validation(
            "File log output requires logging.file_path",
        ));
    }
    if config.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter target cannot be empty"));
    }
    Ok(())
}

fn validate_schedulers(schedulers: &[SchedulerConfig]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for scheduler in schedulers {
        if !seen.insert(scheduler.name.as_str()) {
            return Err(ConfigError::DuplicateScheduler(scheduler.name.clone()));
        }
        validate_scheduler(scheduler)?;
    }
    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> ConfigResult<()> {
    let name = &scheduler.name;
    if name.trim().is_empty() {
        return Err(ConfigError::validation("Scheduler name cannot be empty"));
    }
    if scheduler.workers == 0 {
        return Err(ConfigError::validation(format!(
            "Scheduler '{name}' must have at least one worker"
        )));
    }
    if scheduler.queue == QueueKind::Bounded(0) {
        return Err(ConfigError::validation(format!(
            "Scheduler '{name}' has a bounded queue of capacity 0; use queue = \"direct\""
        )));
    }
    if scheduler.timeout_ms == Some(0) {
        return Err(ConfigError::validation(format!(
            "Scheduler '{name}' timeout must be greater than 0"
        )));
    }
    Ok(())
}

fn validate_routing_config(routing: &RoutingConfig) -> ConfigResult<()> {
    if routing.strategy != RoutingKind::Cached {
        return Ok(());
    }
    if routing.cache.capacity == 0 {
        return Err(ConfigError::validation(
            "Route cache capacity must be greater than 0",
        ));
    }
    if routing.cache.promote_every == 0 {
        return Err(ConfigError::validation(
            "Route cache promote_every must be greater than 0",
        ));
    }
    Ok(())
}
