//! Attachment acquisition for newly found records
//!
//! Each record with a qualifying reference gets a deterministic target
//! path. Existing files are reused, missing ones are downloaded into a
//! `.part` file and renamed once complete. Failures stay per record.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::storage_path::{attachment_file_name, derive_storage_path, relative_to_marker};
use crate::domain::{AcquisitionReport, Record};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download cancelled")]
    Cancelled,
}

/// Writes the body behind `url` to `destination`, returning the byte count.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn download(&self, url: &str, destination: &Path) -> Result<u64, FetchError>;
}

/// Why a record was left without an attachment location. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("record has no attachment reference")]
    MissingUrl,

    #[error("attachment reference has an unexpected extension")]
    UnexpectedExtension,

    #[error("attachment reference has too few path segments")]
    MalformedUrl,

    #[error("storage directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionStatus {
    Downloaded,
    AlreadyPresent,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AcquirerSettings {
    pub download_root: PathBuf,
    pub expected_extension: String,
    pub root_marker: String,
    pub downloads_per_second: NonZeroU32,
    pub max_concurrent: usize,
}

pub struct AttachmentAcquirer {
    fetcher: Arc<dyn AttachmentFetcher>,
    limiter: DefaultDirectRateLimiter,
    settings: AcquirerSettings,
    path_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AttachmentAcquirer {
    pub fn new(fetcher: Arc<dyn AttachmentFetcher>, settings: AcquirerSettings) -> Self {
        let limiter = RateLimiter::direct(Quota::per_second(settings.downloads_per_second));
        Self {
            fetcher,
            limiter,
            settings,
            path_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &AcquirerSettings {
        &self.settings
    }

    /// Enrich `records` with attachment locations. Output order equals input order.
    pub async fn acquire(&self, records: Vec<Record>) -> (Vec<Record>, AcquisitionReport) {
        let workers = self.settings.max_concurrent.max(1);
        info!("Acquiring attachments for {} records ({} workers)", records.len(), workers);

        let results: Vec<(Record, AcquisitionStatus)> = stream::iter(records.into_iter().map(|record| self.process(record)))
            .buffered(workers)
            .collect()
            .await;

        let mut report = AcquisitionReport::default();
        let mut enriched = Vec::with_capacity(results.len());
        for (record, status) in results {
            match &status {
                AcquisitionStatus::Downloaded => report.downloaded += 1,
                AcquisitionStatus::AlreadyPresent => report.already_present += 1,
                AcquisitionStatus::Skipped(_) => report.skipped += 1,
                AcquisitionStatus::Failed(_) => report.failed += 1,
            }
            enriched.push(record);
        }

        info!(
            "Attachments: {} downloaded, {} already present, {} skipped, {} failed",
            report.downloaded, report.already_present, report.skipped, report.failed
        );
        (enriched, report)
    }

    async fn process(&self, record: Record) -> (Record, AcquisitionStatus) {
        if record.attachment().is_none() {
            debug!("No attachment for order {}", record.order_no);
            return (record, AcquisitionStatus::Skipped(SkipReason::MissingUrl));
        }

        // reject the reference before any directory is created for it
        if let Some(Err(reason)) = record
            .attachment()
            .map(|url| attachment_file_name(url, &self.settings.expected_extension))
        {
            warn!("Skipping attachment of order {}: {}", record.order_no, reason);
            return (record, AcquisitionStatus::Skipped(reason));
        }

        let target_dir = match derive_storage_path(record.order_date.as_deref(), &self.settings.download_root).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Cannot create storage directory for order {}: {}", record.order_no, e);
                let reason = SkipReason::DirectoryUnavailable(e.to_string());
                return (record, AcquisitionStatus::Skipped(reason));
            }
        };

        self.acquire_one(record, &target_dir).await
    }

    /// Acquire the attachment of one record into `target_dir`.
    ///
    /// Calling this twice for the same record downloads at most once.
    pub async fn acquire_one(&self, record: Record, target_dir: &str) -> (Record, AcquisitionStatus) {
        let Some(url) = record.attachment().map(str::to_string) else {
            return (record, AcquisitionStatus::Skipped(SkipReason::MissingUrl));
        };

        let file_name = match attachment_file_name(&url, &self.settings.expected_extension) {
            Ok(name) => name,
            Err(reason) => {
                warn!("Skipping attachment {}: {}", url, reason);
                return (record, AcquisitionStatus::Skipped(reason));
            }
        };

        let target = format!("{}/{}", target_dir.trim_end_matches('/'), file_name);
        let stored_path = relative_to_marker(&target, &self.settings.root_marker);

        let lock = self.path_lock(&target).await;
        let result = {
            let _guard = lock.lock().await;
            self.fetch_into(record, &url, &target, file_name, stored_path).await
        };
        self.release_path_lock(&target, lock).await;
        result
    }

    async fn fetch_into(
        &self,
        record: Record,
        url: &str,
        target: &str,
        file_name: String,
        stored_path: String,
    ) -> (Record, AcquisitionStatus) {
        if tokio::fs::try_exists(target).await.unwrap_or(false) {
            debug!("Attachment already present: {}", target);
            let record = record.with_attachment_location(file_name, stored_path);
            return (record, AcquisitionStatus::AlreadyPresent);
        }

        self.limiter.until_ready().await;

        let partial = PathBuf::from(format!("{target}.part"));
        match self.fetcher.download(url, &partial).await {
            Ok(bytes) => match tokio::fs::rename(&partial, target).await {
                Ok(()) => {
                    info!("Downloaded {} ({} bytes)", file_name, bytes);
                    let record = record.with_attachment_location(file_name, stored_path);
                    (record, AcquisitionStatus::Downloaded)
                }
                Err(e) => {
                    warn!("Failed to finalize {}: {}", target, e);
                    discard_partial(&partial).await;
                    (record, AcquisitionStatus::Failed(e.to_string()))
                }
            },
            Err(e) => {
                warn!("Download failed for {}: {}", url, e);
                discard_partial(&partial).await;
                (record, AcquisitionStatus::Failed(e.to_string()))
            }
        }
    }

    async fn path_lock(&self, target: &str) -> Arc<Mutex<()>> {
        let mut locks = self.path_locks.lock().await;
        Arc::clone(locks.entry(target.to_string()).or_default())
    }

    /// Drops the entry for `target` once no other task holds or waits on it.
    async fn release_path_lock(&self, target: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.path_locks.lock().await;
        // one reference in the map, one held here
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(target);
        }
    }
}

async fn discard_partial(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("Could not remove {}: {}", partial.display(), e);
        }
    }
}
