//! Per-run CSV audit trails
//!
//! Three files per run date: the full snapshot, the new records and the
//! final enriched records. They are never read back.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use crate::domain::Record;
use crate::infrastructure::config::ArtifactConfig;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("artifact buffer error: {0}")]
    Buffer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    FullSnapshot,
    NewRecords,
    FinalRecords,
}

impl ArtifactKind {
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::FullSnapshot => "full_snapshot",
            Self::NewRecords => "new_records",
            Self::FinalRecords => "final_records",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    config: ArtifactConfig,
}

impl ArtifactWriter {
    pub fn new(config: ArtifactConfig) -> Self {
        Self { config }
    }

    pub fn path_for(&self, kind: ArtifactKind, run_date: NaiveDate) -> PathBuf {
        let dir = match kind {
            ArtifactKind::FullSnapshot => &self.config.snapshot_dir,
            ArtifactKind::NewRecords => &self.config.new_records_dir,
            ArtifactKind::FinalRecords => &self.config.final_dir,
        };
        dir.join(format!("{}_{}.csv", kind.prefix(), run_date.format("%Y-%m-%d")))
    }

    /// Write `records` with a header row, even when there are none.
    pub async fn write(&self, kind: ArtifactKind, run_date: NaiveDate, records: &[Record]) -> Result<PathBuf, ArtifactError> {
        let path = self.path_for(kind, run_date);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(Record::COLUMNS)?;
        for record in records {
            writer.serialize(record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ArtifactError::Buffer(e.to_string()))?;

        tokio::fs::write(&path, bytes).await?;
        info!("Wrote {} ({} rows)", path.display(), records.len());
        Ok(path)
    }
}
