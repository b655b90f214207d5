//! Repository interfaces for the records sync
//!
//! Contains the ports the orchestrator drives: the persisted record store
//! and the once-per-run log sink.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use super::outcome::{RunOutcome, ScriptStatus, SourceStatus};
use super::record::{PersistedSet, Record};
use super::run_context::RunContext;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row count {0} is out of range")]
    InvalidCount(i64),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Natural keys of every row previously persisted for this source.
    async fn all_known_keys(&self) -> Result<PersistedSet, StoreError>;

    /// Appends all records in a single transaction; nothing is written on error.
    async fn append_records(&self, records: &[Record]) -> Result<u64, StoreError>;

    async fn row_count(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait RunLogSink: Send + Sync {
    async fn record_run(&self, entry: &RunLogEntry) -> Result<(), StoreError>;
}

/// The single business log record written at the end of every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLogEntry {
    pub source_name: String,
    pub script_status: ScriptStatus,
    pub data_available: Option<i64>,
    pub data_scraped: Option<i64>,
    pub total_record_count: Option<i64>,
    pub failure_reason: Option<String>,
    pub comments: Option<String>,
    pub source_status: SourceStatus,
    pub newly_added_count: Option<i64>,
    pub deleted_source: bool,
    pub deleted_source_count: Option<i64>,
    pub removal_date: Option<NaiveDate>,
}

impl RunLogEntry {
    /// Zero counts are stored as NULL, the way the log table has always been read.
    pub fn from_run(outcome: &RunOutcome, ctx: &RunContext, total_rows: Option<u64>) -> Self {
        let deleted = ctx.deleted_records > 0;
        Self {
            source_name: ctx.source_name.clone(),
            script_status: outcome.status(),
            data_available: non_zero(ctx.new_records),
            data_scraped: non_zero(ctx.persisted_records),
            total_record_count: total_rows.and_then(|rows| i64::try_from(rows).ok()),
            failure_reason: outcome.failure_reason().map(ToString::to_string),
            comments: outcome.comment(),
            source_status: ctx.source_status,
            newly_added_count: non_zero(ctx.persisted_records),
            deleted_source: deleted,
            deleted_source_count: non_zero(ctx.deleted_records),
            removal_date: deleted.then_some(ctx.run_date),
        }
    }
}

fn non_zero(count: usize) -> Option<i64> {
    i64::try_from(count).ok().filter(|count| *count > 0)
}
