//! Configuration infrastructure
//!
//! Contains configuration loading for the records sync. Values come from,
//! in increasing priority:
//! 1. Built-in defaults (see [`defaults`])
//! 2. `config/default.{toml,json,yaml}` and the file named by `RECORDS_SYNC_CONFIG`
//! 3. Environment variables such as `RECORDS_SYNC_SOURCE__BASE_URL`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::application::page_fetcher::FetchSettings;
use crate::application::reconciliation::DeletionPolicy;
use crate::domain::SourceStatus;
use crate::infrastructure::html_parser::TableSelectors;
use crate::infrastructure::retry_policy::{Backoff, RetryPolicy};

/// Environment variable naming an extra configuration file.
pub const CONFIG_PATH_ENV: &str = "RECORDS_SYNC_CONFIG";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "RECORDS_SYNC";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub timing: TimingConfig,
    pub attachments: AttachmentConfig,
    pub artifacts: ArtifactConfig,
    pub database: DatabaseConfig,
    pub reconciliation: ReconciliationConfig,
    pub notifier: NotifierConfig,
    pub logging: LoggingConfig,
}

/// Where and how the remote table is read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Identifier written to every persisted row and log record
    pub name: String,

    /// Operator-controlled lifecycle status; only `Active` sources are scraped
    pub status: SourceStatus,

    /// Landing page of the portal; re-opened after a session reset
    pub base_url: String,

    /// Page URL with a `{page}` placeholder (1-based)
    pub page_url_template: String,

    /// CSS selector for the element holding the total page count
    pub page_count_selector: String,

    /// Substring of the location that indicates a logout/security redirect
    pub logout_marker: String,

    pub table_selector: String,
    pub row_selector: String,
    pub header_cell_selector: String,
    pub body_cell_selector: String,
    pub link_selector: String,

    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

/// Waits and retry budget for pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after opening the portal before reading the page count
    pub initial_load_wait_ms: u64,

    /// Wait after each page jump before reading the table
    pub settle_delay_ms: u64,

    /// Wait after recovering from a session reset
    pub reset_settle_delay_ms: u64,

    /// Attempts per page jump, including the first
    pub page_retry_attempts: u32,

    /// Fixed backoff before each page-jump retry
    pub page_retry_backoff_ms: u64,

    /// Consecutive session resets tolerated on a single page
    pub max_session_resets: u32,
}

/// Attachment download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    pub download_root: PathBuf,

    /// Only references ending in this extension are downloaded
    pub expected_extension: String,

    /// Persisted paths are truncated to start at this segment
    pub root_marker: String,

    /// Global pacing shared by all download workers
    pub downloads_per_second: u32,

    pub max_concurrent_downloads: usize,
}

/// Directories for the per-run audit spreadsheets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub snapshot_dir: PathBuf,
    pub new_records_dir: PathBuf,
    pub final_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// When false the deleted-key count is always zero
    pub detect_deletions: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Operator webhook; failures are only logged when unset
    pub webhook_url: Option<String>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,

    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: defaults::SOURCE_NAME.to_string(),
            status: SourceStatus::Active,
            base_url: defaults::BASE_URL.to_string(),
            page_url_template: defaults::PAGE_URL_TEMPLATE.to_string(),
            page_count_selector: defaults::PAGE_COUNT_SELECTOR.to_string(),
            logout_marker: defaults::LOGOUT_MARKER.to_string(),
            table_selector: "table".to_string(),
            row_selector: "tr".to_string(),
            header_cell_selector: "th".to_string(),
            body_cell_selector: "td".to_string(),
            link_selector: "a[href]".to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            initial_load_wait_ms: defaults::INITIAL_LOAD_WAIT_MS,
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
            reset_settle_delay_ms: defaults::RESET_SETTLE_DELAY_MS,
            page_retry_attempts: defaults::PAGE_RETRY_ATTEMPTS,
            page_retry_backoff_ms: defaults::PAGE_RETRY_BACKOFF_MS,
            max_session_resets: defaults::MAX_SESSION_RESETS,
        }
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from(defaults::DOWNLOAD_ROOT),
            expected_extension: defaults::EXPECTED_EXTENSION.to_string(),
            root_marker: defaults::ROOT_MARKER.to_string(),
            downloads_per_second: defaults::DOWNLOADS_PER_SECOND,
            max_concurrent_downloads: defaults::MAX_CONCURRENT_DOWNLOADS,
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("data/full_snapshot"),
            new_records_dir: PathBuf::from("data/new_records"),
            final_dir: PathBuf::from("data/final_records"),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            detect_deletions: defaults::DETECT_DELETIONS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: PathBuf::from("logs"),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Load from the default locations plus environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let extra = std::env::var(CONFIG_PATH_ENV).ok();
        Self::from_sources(extra.as_deref())
    }

    /// Load with an explicit extra configuration file (used by tests and `load`)
    pub fn from_sources(extra_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.base_url.trim().is_empty() {
            return Err(validation("source.base_url must not be empty"));
        }
        if !self.source.page_url_template.contains("{page}") {
            return Err(validation("source.page_url_template must contain {page}"));
        }
        if self.timing.page_retry_attempts == 0 {
            return Err(validation("timing.page_retry_attempts must be greater than 0"));
        }
        if self.attachments.downloads_per_second == 0 {
            return Err(validation("attachments.downloads_per_second must be greater than 0"));
        }
        if self.attachments.download_root.as_os_str().is_empty() {
            return Err(validation("attachments.download_root must not be empty"));
        }
        Ok(())
    }
}

fn validation(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}

impl SourceConfig {
    pub fn table_selectors(&self) -> TableSelectors {
        TableSelectors {
            table: self.table_selector.clone(),
            row: self.row_selector.clone(),
            header_cell: self.header_cell_selector.clone(),
            body_cell: self.body_cell_selector.clone(),
            link: self.link_selector.clone(),
        }
    }
}

impl TimingConfig {
    pub fn page_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.page_retry_attempts,
            Backoff::Fixed(Duration::from_millis(self.page_retry_backoff_ms)),
        )
    }

    pub fn fetch_settings(&self, logout_marker: &str) -> FetchSettings {
        FetchSettings {
            initial_load_wait: Duration::from_millis(self.initial_load_wait_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            reset_settle_delay: Duration::from_millis(self.reset_settle_delay_ms),
            max_session_resets: self.max_session_resets,
            logout_marker: logout_marker.to_string(),
            retry: self.page_retry_policy(),
        }
    }
}

impl AttachmentConfig {
    pub fn rate(&self) -> NonZeroU32 {
        NonZeroU32::new(self.downloads_per_second).unwrap_or(NonZeroU32::MIN)
    }
}

impl ReconciliationConfig {
    pub const fn deletion_policy(&self) -> DeletionPolicy {
        if self.detect_deletions {
            DeletionPolicy::Detect
        } else {
            DeletionPolicy::Skip
        }
    }
}

/// Default configuration values
pub mod defaults {
    pub const SOURCE_NAME: &str = "dgft_ras_sez";
    pub const BASE_URL: &str = "https://www.dgft.gov.in/CP/?opt=order-passed-rasz";
    pub const PAGE_URL_TEMPLATE: &str = "https://www.dgft.gov.in/CP/?opt=order-passed-rasz&page={page}";
    pub const PAGE_COUNT_SELECTOR: &str = ".dataTables_paginate .paginate_button:nth-last-child(2)";
    pub const LOGOUT_MARKER: &str = "j_spring_security_logout";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 60;
    pub const USER_AGENT: &str = "records-sync/0.1";

    pub const INITIAL_LOAD_WAIT_MS: u64 = 20_000;
    pub const SETTLE_DELAY_MS: u64 = 3_000;
    pub const RESET_SETTLE_DELAY_MS: u64 = 25_000;
    pub const PAGE_RETRY_ATTEMPTS: u32 = 3;
    pub const PAGE_RETRY_BACKOFF_MS: u64 = 3_000;
    pub const MAX_SESSION_RESETS: u32 = 3;

    pub const DOWNLOAD_ROOT: &str = "pdf_download/ras_sez";
    pub const EXPECTED_EXTENSION: &str = ".pdf";
    pub const ROOT_MARKER: &str = "/pdf_download";
    pub const DOWNLOADS_PER_SECOND: u32 = 1;
    pub const MAX_CONCURRENT_DOWNLOADS: usize = 1;

    pub const DATABASE_URL: &str = "sqlite:data/records.db";
    pub const DB_MAX_CONNECTIONS: u32 = 5;
    pub const DETECT_DELETIONS: bool = true;

    pub const LOG_LEVEL: &str = "info";
}
