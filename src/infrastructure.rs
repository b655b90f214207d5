//! Infrastructure layer for configuration, persistence, parsing and external integrations
//!
//! This module provides the SQLite stores, the HTTP-backed table source and
//! attachment client, page parsing, retry, notification and audit artifacts.

pub mod artifacts;
pub mod config;
pub mod database_connection;
pub mod html_parser;
pub mod http_client;
pub mod logging;
pub mod notifier;
pub mod parsing_error;
pub mod record_repository;
pub mod retry_policy;
pub mod run_log_repository;
pub mod table_source;

// Re-export commonly used items
pub use artifacts::{ArtifactError, ArtifactKind, ArtifactWriter};
pub use config::{AppConfig, ConfigError};
pub use database_connection::DatabaseConnection;
pub use html_parser::{TablePageParser, TableSelectors, parse_page_count};
pub use http_client::{HttpClient, HttpClientConfig};
pub use logging::{LogGuard, init_logging_with_config, log_system_info};
pub use notifier::{LogNotifier, Notifier, WebhookNotifier, notifier_from_config};
pub use parsing_error::{ParsingError, ParsingResult};
pub use record_repository::SqliteRecordStore;
pub use retry_policy::{Backoff, RetryExhausted, RetryPolicy};
pub use run_log_repository::SqlRunLog;
pub use table_source::{HttpSourceSettings, HttpTableSource, SourceError, TableSource};
