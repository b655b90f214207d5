//! Per-run accumulator threaded through fetch, reconcile, acquire and persist

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use super::outcome::{RunStage, SourceStatus};

/// Per-record attachment tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionReport {
    pub downloaded: usize,
    pub already_present: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl AcquisitionReport {
    /// Records that reached the network or the existence check.
    pub const fn attempted(&self) -> usize {
        self.downloaded + self.already_present + self.failed
    }

    pub const fn total(&self) -> usize {
        self.attempted() + self.skipped
    }
}

/// Counts gathered over one run. Each stage returns a new value; nothing is mutated in place.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub source_name: String,
    pub source_status: SourceStatus,
    pub stage: RunStage,
    pub pages_total: u32,
    pub records_available: usize,
    pub new_records: usize,
    pub deleted_records: usize,
    pub persisted_records: usize,
    pub attachments: AcquisitionReport,
}

impl RunContext {
    pub fn new(source_name: impl Into<String>, source_status: SourceStatus, run_date: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            run_date,
            source_name: source_name.into(),
            source_status,
            stage: RunStage::Fetching,
            pages_total: 0,
            records_available: 0,
            new_records: 0,
            deleted_records: 0,
            persisted_records: 0,
            attachments: AcquisitionReport::default(),
        }
    }

    #[must_use]
    pub fn at_stage(self, stage: RunStage) -> Self {
        Self { stage, ..self }
    }

    #[must_use]
    pub fn with_snapshot(self, pages_total: u32, records_available: usize) -> Self {
        Self {
            pages_total,
            records_available,
            ..self
        }
    }

    #[must_use]
    pub fn with_reconciliation(self, new_records: usize, deleted_records: usize) -> Self {
        Self {
            new_records,
            deleted_records,
            ..self
        }
    }

    #[must_use]
    pub fn with_attachments(self, attachments: AcquisitionReport) -> Self {
        Self { attachments, ..self }
    }

    #[must_use]
    pub fn with_persisted(self, persisted_records: usize) -> Self {
        Self {
            persisted_records,
            ..self
        }
    }
}
