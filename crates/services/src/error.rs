//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use tutor_core::model::{CurriculumError, ProfileError};

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("no hierarchy named {0:?}")]
    UnknownHierarchy(String),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `EngagementTracker`.
///
/// Invalid tracking input is not an error; it comes back as a failed
/// `TrackOutcome`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackingServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while assembling or encoding a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer flush failed: {0}")]
    Flush(String),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AccountService` and its post-create hooks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccountError {
    #[error("username must not be blank")]
    BlankUsername,
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AccessService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccessError {
    #[error("no section at {hierarchy}/{path}")]
    UnknownSection { hierarchy: String, path: String },
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
