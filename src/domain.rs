//! Domain module - Core business types for the records sync
//!
//! This module contains the scraped record shape, its natural key,
//! run outcomes and the repository ports the application layer drives.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod outcome;
pub mod record;
pub mod repositories;
pub mod run_context;

pub use outcome::{RunOutcome, RunStage, ScriptStatus, SourceStatus};
pub use record::{NO_LINK, NaturalKey, PersistedSet, RawRow, Record};
pub use repositories::{RecordStore, RunLogEntry, RunLogSink, StoreError};
pub use run_context::{AcquisitionReport, RunContext};
