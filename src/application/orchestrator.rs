//! Sync run orchestration
//!
//! Sequences `Fetching → Reconciling → Acquiring → Persisting → Done`.
//! Any stage can fail into `Failed`. Every run, whatever its outcome,
//! ends with exactly one run log record, and failures also notify an
//! operator.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::attachment_acquirer::AttachmentAcquirer;
use super::errors::SyncError;
use super::page_fetcher::PageFetcher;
use super::reconciliation::{DeletionPolicy, reconcile};
use super::row_normalizer::normalize_snapshot;
use crate::domain::{RecordStore, RunContext, RunLogEntry, RunLogSink, RunOutcome, RunStage, SourceStatus};
use crate::infrastructure::artifacts::{ArtifactKind, ArtifactWriter};
use crate::infrastructure::notifier::{Notifier, failure_subject};
use crate::infrastructure::table_source::TableSource;

/// Collaborators driven by the orchestrator
pub struct SyncDependencies {
    pub store: Arc<dyn RecordStore>,
    pub run_log: Arc<dyn RunLogSink>,
    pub notifier: Arc<dyn Notifier>,
    pub artifacts: ArtifactWriter,
    pub fetcher: PageFetcher,
    pub acquirer: AttachmentAcquirer,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub name: String,
    pub status: SourceStatus,
    pub deletion_policy: DeletionPolicy,
}

/// Result of one run, handed back to the caller to decide the exit code.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub context: RunContext,
}

struct StageFailure {
    error: SyncError,
    context: RunContext,
}

impl StageFailure {
    fn at(ctx: &RunContext, error: impl Into<SyncError>) -> Self {
        Self {
            error: error.into(),
            context: ctx.clone(),
        }
    }
}

pub struct SyncOrchestrator {
    deps: SyncDependencies,
    source: SourceSettings,
}

impl SyncOrchestrator {
    pub fn new(deps: SyncDependencies, source: SourceSettings) -> Self {
        Self { deps, source }
    }

    /// Run once, dated today in local time.
    pub async fn run(&self, table: Box<dyn TableSource>, cancel: CancellationToken) -> RunReport {
        self.run_dated(table, Local::now().date_naive(), &cancel).await
    }

    pub async fn run_dated(
        &self,
        table: Box<dyn TableSource>,
        run_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> RunReport {
        let ctx = RunContext::new(self.source.name.clone(), self.source.status, run_date);
        let span = info_span!("sync_run", run_id = %ctx.run_id, source = %ctx.source_name);

        async move {
            if !self.source.status.is_active() {
                info!("Source is {}, skipping run", self.source.status);
                return self.finish(RunOutcome::NotRun(self.source.status), ctx).await;
            }

            info!("Sync run started for {}", run_date);
            match self.execute(table, ctx, cancel).await {
                Ok((outcome, ctx)) => self.finish(outcome, ctx).await,
                Err(StageFailure { error, context }) => {
                    error!("Run failed while {}: {}", context.stage, error);
                    let ctx = context.at_stage(RunStage::Failed);
                    self.finish(RunOutcome::Failure(error.to_string()), ctx).await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        table: Box<dyn TableSource>,
        ctx: RunContext,
        cancel: &CancellationToken,
    ) -> Result<(RunOutcome, RunContext), StageFailure> {
        // Fetching
        let snapshot = self
            .deps
            .fetcher
            .fetch_snapshot(table, cancel)
            .await
            .map_err(|e| StageFailure::at(&ctx, e))?;
        let records = normalize_snapshot(&snapshot.rows);
        let ctx = ctx.with_snapshot(snapshot.pages, records.len());
        info!("Snapshot: {} records over {} pages", records.len(), snapshot.pages);

        self.deps
            .artifacts
            .write(ArtifactKind::FullSnapshot, ctx.run_date, &records)
            .await
            .map_err(|e| StageFailure::at(&ctx, e))?;

        // Reconciling
        let ctx = checkpoint(cancel, ctx, RunStage::Reconciling)?;
        let persisted = self
            .deps
            .store
            .all_known_keys()
            .await
            .map_err(|e| StageFailure::at(&ctx, e))?;
        let result = reconcile(&records, &persisted, self.source.deletion_policy);
        let ctx = ctx.with_reconciliation(result.new_count(), result.deleted_count());
        info!(
            "Reconciled against {} persisted keys: {} new, {} deleted",
            persisted.len(),
            result.new_count(),
            result.deleted_count()
        );
        for key in &result.deleted_keys {
            debug!("Deleted at source: {}", key);
        }

        self.deps
            .artifacts
            .write(ArtifactKind::NewRecords, ctx.run_date, &result.new_records)
            .await
            .map_err(|e| StageFailure::at(&ctx, e))?;

        if result.new_records.is_empty() {
            let outcome = if result.deleted_keys.is_empty() {
                RunOutcome::NoNewData
            } else {
                RunOutcome::DeletionsOnly(result.deleted_count())
            };
            return Ok((outcome, ctx.at_stage(RunStage::Done)));
        }

        // Acquiring
        let new_count = result.new_count();
        let ctx = checkpoint(cancel, ctx, RunStage::Acquiring)?;
        let (enriched, report) = self.deps.acquirer.acquire(result.new_records).await;
        let ctx = ctx.with_attachments(report);

        self.deps
            .artifacts
            .write(ArtifactKind::FinalRecords, ctx.run_date, &enriched)
            .await
            .map_err(|e| StageFailure::at(&ctx, e))?;

        // Persisting
        let ctx = checkpoint(cancel, ctx, RunStage::Persisting)?;
        let written = self
            .deps
            .store
            .append_records(&enriched)
            .await
            .map_err(|e| StageFailure::at(&ctx, e))?;
        let ctx = ctx
            .with_persisted(usize::try_from(written).unwrap_or(usize::MAX))
            .at_stage(RunStage::Done);

        Ok((RunOutcome::NewDataFound(new_count), ctx))
    }

    async fn finish(&self, outcome: RunOutcome, ctx: RunContext) -> RunReport {
        let total_rows = match self.deps.store.row_count().await {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!("Could not read persisted row count: {}", e);
                None
            }
        };

        let entry = RunLogEntry::from_run(&outcome, &ctx, total_rows);
        if let Err(e) = self.deps.run_log.record_run(&entry).await {
            warn!("Failed to write run log record: {}", e);
        }

        if let RunOutcome::Failure(reason) = &outcome {
            self.deps
                .notifier
                .notify(&failure_subject(&ctx.source_name), reason)
                .await;
        }

        info!("Run finished: {}", outcome);
        RunReport { outcome, context: ctx }
    }
}

/// Abort between stages once cancellation was requested.
fn checkpoint(cancel: &CancellationToken, ctx: RunContext, next: RunStage) -> Result<RunContext, StageFailure> {
    if cancel.is_cancelled() {
        warn!("Cancellation requested before {}", next);
        let stage = ctx.stage;
        return Err(StageFailure::at(&ctx, SyncError::Cancelled { stage }));
    }
    debug!("Stage {} -> {}", ctx.stage, next);
    Ok(ctx.at_stage(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::attachment_acquirer::{AcquirerSettings, AttachmentFetcher, FetchError};
    use crate::application::page_fetcher::FetchSettings;
    use crate::domain::{PersistedSet, Record, ScriptStatus, StoreError};
    use crate::infrastructure::config::ArtifactConfig;
    use crate::infrastructure::html_parser::{TablePageParser, TableSelectors};
    use crate::infrastructure::table_source::SourceError;
    use async_trait::async_trait;
    use std::num::NonZeroU32;
    use std::path::Path;
    use std::sync::Mutex;

    struct OnePage(String);

    #[async_trait]
    impl TableSource for OnePage {
        async fn open(&mut self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn page_count(&mut self) -> Result<u32, SourceError> {
            Ok(1)
        }
        async fn goto_page(&mut self, _page: u32) -> Result<(), SourceError> {
            Ok(())
        }
        fn current_location(&self) -> Option<String> {
            None
        }
        async fn current_page_markup(&mut self) -> Result<String, SourceError> {
            Ok(self.0.clone())
        }
        async fn clear_cookies(&mut self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn close(&mut self) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<Record>>,
        reject_appends: bool,
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn all_known_keys(&self) -> Result<PersistedSet, StoreError> {
            Ok(self.rows.lock().unwrap().iter().map(Record::natural_key).collect())
        }
        async fn append_records(&self, records: &[Record]) -> Result<u64, StoreError> {
            if self.reject_appends {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            self.rows.lock().unwrap().extend_from_slice(records);
            Ok(records.len() as u64)
        }
        async fn row_count(&self) -> Result<u64, StoreError> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }
    }

    #[derive(Default)]
    struct MemoryLog(Mutex<Vec<RunLogEntry>>);

    #[async_trait]
    impl RunLogSink for MemoryLog {
        async fn record_run(&self, entry: &RunLogEntry) -> Result<(), StoreError> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryNotifier(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for MemoryNotifier {
        async fn notify(&self, subject: &str, _detail: &str) {
            self.0.lock().unwrap().push(subject.to_string());
        }
    }

    struct NoFetch;

    #[async_trait]
    impl AttachmentFetcher for NoFetch {
        async fn download(&self, _url: &str, _destination: &Path) -> Result<u64, FetchError> {
            Err(FetchError::Transport("offline".into()))
        }
    }

    struct Harness {
        orchestrator: SyncOrchestrator,
        store: Arc<MemoryStore>,
        log: Arc<MemoryLog>,
        notifier: Arc<MemoryNotifier>,
        _dir: tempfile::TempDir,
    }

    fn harness(status: SourceStatus, existing: Vec<Record>) -> Harness {
        harness_with_store(
            status,
            MemoryStore {
                rows: Mutex::new(existing),
                reject_appends: false,
            },
        )
    }

    fn harness_with_store(status: SourceStatus, store: MemoryStore) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store);
        let log = Arc::new(MemoryLog::default());
        let notifier = Arc::new(MemoryNotifier::default());
        let parser = TablePageParser::new(&TableSelectors::default(), None).unwrap();
        let deps = SyncDependencies {
            store: store.clone(),
            run_log: log.clone(),
            notifier: notifier.clone(),
            artifacts: ArtifactWriter::new(ArtifactConfig {
                snapshot_dir: dir.path().join("snap"),
                new_records_dir: dir.path().join("new"),
                final_dir: dir.path().join("final"),
            }),
            fetcher: PageFetcher::new(FetchSettings::default(), parser),
            acquirer: AttachmentAcquirer::new(
                Arc::new(NoFetch),
                AcquirerSettings {
                    download_root: dir.path().join("pdf_download"),
                    expected_extension: ".pdf".into(),
                    root_marker: "/pdf_download".into(),
                    downloads_per_second: NonZeroU32::new(100).unwrap(),
                    max_concurrent: 1,
                },
            ),
        };
        let source = SourceSettings {
            name: "ras_sez".into(),
            status,
            deletion_policy: DeletionPolicy::Detect,
        };
        Harness {
            orchestrator: SyncOrchestrator::new(deps, source),
            store,
            log,
            notifier,
            _dir: dir,
        }
    }

    const PAGE: &str = "<table><tr><th>Order Type</th><th>Order No.</th><th>Attachment</th></tr>\
        <tr><td>Appeal</td><td>1</td><td>-</td></tr></table>";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 11).unwrap()
    }

    fn persisted(order_no: &str) -> Record {
        Record {
            order_type: "Appeal".into(),
            order_no: order_no.into(),
            ..Record::default()
        }
    }

    #[tokio::test]
    async fn deletions_only_stops_before_acquisition() {
        let h = harness(SourceStatus::Active, vec![persisted("1"), persisted("2")]);
        let report = h
            .orchestrator
            .run_dated(Box::new(OnePage(PAGE.into())), date(), &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, RunOutcome::DeletionsOnly(1));
        assert_eq!(report.context.attachments.total(), 0);
        assert_eq!(h.store.rows.lock().unwrap().len(), 2);

        let log = h.log.0.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].deleted_source_count, Some(1));
        assert_eq!(log[0].removal_date, Some(date()));
    }

    #[tokio::test]
    async fn inactive_source_is_not_run() {
        let h = harness(SourceStatus::Hibernated, Vec::new());
        let report = h
            .orchestrator
            .run_dated(Box::new(OnePage(PAGE.into())), date(), &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, RunOutcome::NotRun(SourceStatus::Hibernated));
        let log = h.log.0.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].script_status.as_str(), "not run");
        assert!(h.notifier.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_fails_without_persisting() {
        let h = harness(SourceStatus::Active, Vec::new());
        let token = CancellationToken::new();
        token.cancel();

        let report = h
            .orchestrator
            .run_dated(Box::new(OnePage(PAGE.into())), date(), &token)
            .await;

        assert!(report.outcome.is_failure());
        assert_eq!(report.context.stage, RunStage::Failed);
        assert!(h.store.rows.lock().unwrap().is_empty());
        assert_eq!(h.notifier.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_download_still_persists_record() {
        let h = harness(SourceStatus::Active, Vec::new());
        let page = PAGE.replace("<td>-</td>", "<td><a href='https://p.test/a/b.pdf'>pdf</a></td>");

        let report = h
            .orchestrator
            .run_dated(Box::new(OnePage(page)), date(), &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, RunOutcome::NewDataFound(1));
        assert_eq!(report.context.attachments.failed, 1);
        let rows = h.store.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pdf_path, None);
        assert_eq!(rows[0].attachment_url.as_deref(), Some("https://p.test/a/b.pdf"));
    }

    #[tokio::test]
    async fn failed_append_is_logged_once_and_notified() {
        let h = harness_with_store(
            SourceStatus::Active,
            MemoryStore {
                reject_appends: true,
                ..MemoryStore::default()
            },
        );

        let report = h
            .orchestrator
            .run_dated(Box::new(OnePage(PAGE.into())), date(), &CancellationToken::new())
            .await;

        match &report.outcome {
            RunOutcome::Failure(reason) => assert!(reason.starts_with("persistence failure"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(report.context.persisted_records, 0);
        assert!(h.store.rows.lock().unwrap().is_empty());

        let log = h.log.0.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].script_status, ScriptStatus::Failure);
        assert_eq!(log[0].data_available, Some(1));
        assert_eq!(log[0].data_scraped, None);
        assert_eq!(h.notifier.0.lock().unwrap().as_slice(), ["Manual intervention required for ras_sez"]);
    }
}
