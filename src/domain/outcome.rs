//! Run lifecycle: stages, terminal outcomes and the statuses written to the run log

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of the scraped source, set by operators in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceStatus {
    #[default]
    Active,
    Hibernated,
    Inactive,
}

impl SourceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Hibernated => "Hibernated",
            Self::Inactive => "Inactive",
        }
    }

    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of one sync run. `Failed` is absorbing and reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunStage {
    #[default]
    Fetching,
    Reconciling,
    Acquiring,
    Persisting,
    Done,
    Failed,
}

impl RunStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Reconciling => "reconciling",
            Self::Acquiring => "acquiring",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status column of the run log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScriptStatus {
    Success,
    Failure,
    NotRun,
}

impl ScriptStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::NotRun => "not run",
        }
    }
}

impl fmt::Display for ScriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one run, returned to the caller instead of exiting the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NoNewData,
    NewDataFound(usize),
    DeletionsOnly(usize),
    /// The source is not `Active`; nothing was fetched.
    NotRun(SourceStatus),
    Failure(String),
}

impl RunOutcome {
    pub const fn status(&self) -> ScriptStatus {
        match self {
            Self::NoNewData | Self::NewDataFound(_) | Self::DeletionsOnly(_) => {
                ScriptStatus::Success
            }
            Self::NotRun(_) => ScriptStatus::NotRun,
            Self::Failure(_) => ScriptStatus::Failure,
        }
    }

    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Free-text comment stored with the run log record.
    pub fn comment(&self) -> Option<String> {
        match self {
            Self::NoNewData => Some("no new data".to_string()),
            Self::NewDataFound(count) => Some(format!("{count} new data")),
            Self::DeletionsOnly(count) => Some(format!("{count} data are deleted in the website")),
            Self::NotRun(status) => Some(format!("source is {status}")),
            Self::Failure(_) => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failure(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNewData => f.write_str("no new data"),
            Self::NewDataFound(count) => write!(f, "{count} new records"),
            Self::DeletionsOnly(count) => write!(f, "{count} records deleted at source"),
            Self::NotRun(status) => write!(f, "not run ({status})"),
            Self::Failure(reason) => write!(f, "failure: {reason}"),
        }
    }
}
