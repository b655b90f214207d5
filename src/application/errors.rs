//! Run-level error taxonomy, caught once at the orchestrator boundary

use thiserror::Error;

use super::page_fetcher::PageFetchError;
use crate::domain::{RunStage, StoreError};
use crate::infrastructure::artifacts::ArtifactError;
use crate::infrastructure::retry_policy::RetryExhausted;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[source] PageFetchError),

    #[error("page {page} could not be fetched: {source}")]
    PageFetchRetryExhausted {
        page: u32,
        #[source]
        source: RetryExhausted,
    },

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("artifact write failed: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("run cancelled while {stage}")]
    Cancelled { stage: RunStage },
}

impl From<PageFetchError> for SyncError {
    fn from(error: PageFetchError) -> Self {
        match error {
            PageFetchError::RetryExhausted { page, source } => Self::PageFetchRetryExhausted { page, source },
            PageFetchError::Cancelled { .. } => Self::Cancelled {
                stage: RunStage::Fetching,
            },
            other => Self::SourceUnavailable(other),
        }
    }
}
