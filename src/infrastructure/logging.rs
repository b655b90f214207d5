//! Logging system configuration and initialization
//!
//! This module provides the diagnostic logging setup with:
//! - Console output for interactive runs
//! - Daily rolling file output, optionally JSON
//! - Configuration based level control, overridable through `RUST_LOG`
//! - Quieter defaults for chatty dependencies (sqlx, reqwest, hyper)

use anyhow::{Context, Result, anyhow};
use tracing::info;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

// Re-export LoggingConfig from config module
pub use crate::infrastructure::config::LoggingConfig;

pub const LOG_FILE_PREFIX: &str = "records-sync.log";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Keeps the non-blocking file writer alive; drop it only at process exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Build the filter from `RUST_LOG`, or from the configured level plus
/// per-module overrides when the variable is unset.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![config.level.clone()];
    if !config.level.to_lowercase().contains("trace") {
        let mut modules: Vec<_> = config.module_filters.iter().collect();
        modules.sort();
        directives.extend(modules.into_iter().map(|(module, level)| format!("{module}={level}")));
    }

    let joined = directives.join(",");
    EnvFilter::try_new(&joined).with_context(|| format!("invalid log filter '{joined}'"))
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<LogGuard> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = build_env_filter(config)?;
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_guard = None;

    if config.file_output {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("Failed to create log directory {}", config.log_dir.display()))?;

        let appender = rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
            .with_ansi(false);

        if config.json_format {
            layers.push(
                file_layer
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .boxed(),
            );
        } else {
            layers.push(file_layer.with_target(false).boxed());
        }
    }

    if config.console_output {
        layers.push(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
                .with_target(false)
                .boxed(),
        );
    }

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    info!("Logging system initialized");
    info!("Log directory: {}", config.log_dir.display());
    info!("Log level: {}", config.level);
    info!("JSON format: {}", config.json_format);

    Ok(LogGuard { _file: file_guard })
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== records-sync {} ===", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {}", current_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.level.is_empty());
        assert!(config.console_output);
        assert!(config.file_output);
    }

    #[test]
    fn test_no_outputs_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }

    #[test]
    fn test_module_filters_build() {
        let mut config = LoggingConfig::default();
        config.module_filters.insert("records_sync::infrastructure".into(), "debug".into());
        assert!(build_env_filter(&config).is_ok());
    }
}
