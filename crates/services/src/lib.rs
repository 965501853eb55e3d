#![forbid(unsafe_code)]

pub mod access;
pub mod accounts;
pub mod app_services;
pub mod error;
pub mod export;
pub mod progress;
pub mod report;
pub mod tracking;

pub use tutor_core::Clock;

pub use access::{AccessDecision, AccessPolicy, AccessService};
pub use accounts::{AccountService, CreateProfileHook, PostCreateHook};
pub use app_services::AppServices;
pub use error::{
    AccessError, AccountError, AppServicesError, ProgressError, ReportError, TrackingServiceError,
};
pub use export::CsvExport;
pub use progress::{CurriculumTree, ProgressService, QuizSummaryEntry, UserProgress};
pub use report::{ReportAssembler, ReportKind};
pub use tracking::{EngagementTracker, TrackOutcome};
