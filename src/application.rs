//! Application layer module
//!
//! This module contains the sync pipeline stages and the orchestrator
//! that sequences them over one run.

pub mod attachment_acquirer;
pub mod errors;
pub mod orchestrator;
pub mod page_fetcher;
pub mod reconciliation;
pub mod row_normalizer;
pub mod storage_path;

pub use attachment_acquirer::{
    AcquirerSettings, AcquisitionStatus, AttachmentAcquirer, AttachmentFetcher, FetchError, SkipReason,
};
pub use errors::SyncError;
pub use orchestrator::{RunReport, SourceSettings, SyncDependencies, SyncOrchestrator};
pub use page_fetcher::{FetchSettings, FetchedSnapshot, PageFetchError, PageFetcher, Session};
pub use reconciliation::{DeletionPolicy, Reconciliation, reconcile};
pub use row_normalizer::{dedup_exact, normalize_column_name, normalize_row, normalize_snapshot};
pub use storage_path::{attachment_file_name, derive_storage_path, relative_to_marker, storage_dir_for};
