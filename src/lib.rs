//! records-sync - incremental scraper for a paginated public orders table
//!
//! Each run reads every page of the remote table, reconciles the snapshot
//! against previously persisted rows, downloads attachments of new records
//! and appends them to the store.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::{
    AcquirerSettings, AttachmentAcquirer, PageFetcher, RunReport, SourceSettings, SyncDependencies,
    SyncOrchestrator,
};
use crate::infrastructure::config::DatabaseConfig;
use crate::infrastructure::notifier::failure_subject;
use crate::infrastructure::{
    AppConfig, ArtifactWriter, DatabaseConnection, HttpClient, HttpClientConfig, HttpSourceSettings,
    HttpTableSource, Notifier, SqlRunLog, SqliteRecordStore, TablePageParser, notifier_from_config,
};

/// Wire every production collaborator from `config` and perform one run.
pub async fn run_with_config(config: &AppConfig, cancel: CancellationToken) -> Result<RunReport> {
    let notifier = notifier_from_config(&config.notifier);
    run_with_notifier(config, notifier, cancel).await
}

/// Same as [`run_with_config`] with an explicit notifier.
///
/// A store that cannot be opened or migrated is reported to `notifier`
/// before the error is returned.
pub async fn run_with_notifier(
    config: &AppConfig,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let db = match open_database(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            notifier
                .notify(&failure_subject(&config.source.name), &format!("{e:#}"))
                .await;
            return Err(e);
        }
    };

    let store = Arc::new(SqliteRecordStore::new(db.pool().clone(), config.source.name.clone()));
    let run_log = Arc::new(SqlRunLog::new(db.pool().clone()));

    let parser = TablePageParser::new(&config.source.table_selectors(), Some(config.source.base_url.as_str()))
        .context("Invalid table selectors")?;
    let fetcher = PageFetcher::new(config.timing.fetch_settings(&config.source.logout_marker), parser);

    let http = HttpClient::new(HttpClientConfig {
        user_agent: config.source.user_agent.clone(),
        timeout_seconds: config.source.request_timeout_seconds,
        follow_redirects: true,
    })
    .context("Failed to build download client")?
    .with_cancellation(cancel.clone());

    let acquirer = AttachmentAcquirer::new(
        Arc::new(http),
        AcquirerSettings {
            download_root: config.attachments.download_root.clone(),
            expected_extension: config.attachments.expected_extension.clone(),
            root_marker: config.attachments.root_marker.clone(),
            downloads_per_second: config.attachments.rate(),
            max_concurrent: config.attachments.max_concurrent_downloads,
        },
    );

    let deps = SyncDependencies {
        store,
        run_log,
        notifier,
        artifacts: ArtifactWriter::new(config.artifacts.clone()),
        fetcher,
        acquirer,
    };
    let orchestrator = SyncOrchestrator::new(
        deps,
        SourceSettings {
            name: config.source.name.clone(),
            status: config.source.status,
            deletion_policy: config.reconciliation.deletion_policy(),
        },
    );

    let table = HttpTableSource::new(HttpSourceSettings {
        base_url: config.source.base_url.clone(),
        page_url_template: config.source.page_url_template.clone(),
        page_count_selector: config.source.page_count_selector.clone(),
        user_agent: config.source.user_agent.clone(),
        timeout: Duration::from_secs(config.source.request_timeout_seconds),
    });

    info!("Starting sync for source {}", config.source.name);
    let report = orchestrator.run(Box::new(table), cancel).await;
    db.pool().close().await;
    Ok(report)
}

async fn open_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let db = DatabaseConnection::new(&config.url, config.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.url))?;
    db.migrate().await.context("Failed to migrate database")?;
    Ok(db)
}
