use std::sync::Arc;

use storage::repository::Storage;
use tracing::info;

use crate::Clock;
use crate::access::{AccessPolicy, AccessService};
use crate::accounts::AccountService;
use crate::error::{AppServicesError, ReportError};
use crate::export::CsvExport;
use crate::progress::ProgressService;
use crate::report::{ReportAssembler, ReportKind, selector_label};
use crate::tracking::EngagementTracker;

/// Assembles the app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    progress: Arc<ProgressService>,
    tracker: Arc<EngagementTracker>,
    reports: Arc<ReportAssembler>,
    accounts: Arc<AccountService>,
    access: Arc<AccessService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        policy: AccessPolicy,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        info!(db_url, "sqlite storage ready");
        Ok(Self::from_storage(storage, clock, policy))
    }

    #[must_use]
    pub fn in_memory(clock: Clock, policy: AccessPolicy) -> Self {
        Self::from_storage(Storage::in_memory(), clock, policy)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock, policy: AccessPolicy) -> Self {
        let progress = ProgressService::new(
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.curriculum),
            Arc::clone(&storage.visits),
            Arc::clone(&storage.submissions),
        );
        let tracker = EngagementTracker::new(Arc::clone(&storage.video_views));
        let reports = ReportAssembler::new(
            Arc::clone(&storage.users),
            Arc::clone(&storage.curriculum),
            Arc::clone(&storage.video_views),
            Arc::clone(&storage.submissions),
            progress.clone(),
        );
        let accounts = AccountService::new(
            clock,
            Arc::clone(&storage.users),
            Arc::clone(&storage.profiles),
        );
        let access = AccessService::new(
            clock,
            policy,
            Arc::clone(&storage.curriculum),
            Arc::clone(&storage.visits),
            Arc::clone(&storage.submissions),
            progress.clone(),
        );

        Self {
            storage,
            progress: Arc::new(progress),
            tracker: Arc::new(tracker),
            reports: Arc::new(reports),
            accounts: Arc::new(accounts),
            access: Arc::new(access),
        }
    }

    /// Raw repositories, for curriculum authoring and seeding.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn tracker(&self) -> Arc<EngagementTracker> {
        Arc::clone(&self.tracker)
    }

    #[must_use]
    pub fn reports(&self) -> Arc<ReportAssembler> {
        Arc::clone(&self.reports)
    }

    #[must_use]
    pub fn accounts(&self) -> Arc<AccountService> {
        Arc::clone(&self.accounts)
    }

    #[must_use]
    pub fn access(&self) -> Arc<AccessService> {
        Arc::clone(&self.access)
    }

    /// Assemble a report and wrap it for download.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if column discovery or the participant listing fails.
    pub async fn export(&self, kind: ReportKind) -> Result<CsvExport, ReportError> {
        let rows = self.reports.rows(kind).await?;
        Ok(CsvExport::new(kind, rows))
    }

    /// Export for a raw request selector. Unknown selectors get the metadata
    /// report but keep their own name in the filename.
    ///
    /// # Errors
    ///
    /// See [`AppServices::export`].
    pub async fn export_selected(&self, selector: Option<&str>) -> Result<CsvExport, ReportError> {
        let export = self.export(ReportKind::from_selector(selector)).await?;
        Ok(export.labelled(selector_label(selector)))
    }
}
