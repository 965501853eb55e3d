use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tutor_core::model::{
    BlockId, BlockKind, Hierarchy, HierarchyId, PageBlock, PageVisit, QuizSubmission, Section,
    SectionId, UserAccount, UserId, UserProfile, UserVideoView,
};

use crate::memory::InMemoryRepository;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Account fields supplied when enrolling a user; the id is assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserRecord {
    pub username: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl NewUserRecord {
    /// A study participant: inactive, no staff rights.
    #[must_use]
    pub fn participant(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_active: false,
            is_staff: false,
            is_superuser: false,
        }
    }

    #[must_use]
    pub fn staff(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_active: true,
            is_staff: true,
            is_superuser: false,
        }
    }

    pub(crate) fn into_account(self, id: UserId) -> UserAccount {
        UserAccount {
            id,
            username: self.username,
            is_active: self.is_active,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
        }
    }
}

/// A section to append under `parent_id`, or the hierarchy root when `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSectionRecord {
    pub hierarchy_id: HierarchyId,
    pub parent_id: Option<SectionId>,
    pub slug: String,
    pub label: String,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert an account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the username is taken.
    async fn insert_user(&self, user: NewUserRecord) -> Result<UserAccount, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StorageError>;

    /// Inactive accounts ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn list_participants(&self) -> Result<Vec<UserAccount>, StorageError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetch the user's profile, creating a default one stamped `now` if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_or_create_profile(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the profile does not exist.
    async fn update_profile(&self, profile: &UserProfile) -> Result<(), StorageError>;
}

/// Read/write access to the curriculum trees and their blocks.
#[async_trait]
pub trait CurriculumRepository: Send + Sync {
    /// Create a hierarchy together with its root section.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the name is taken.
    async fn create_hierarchy(
        &self,
        name: &str,
        base_url: &str,
    ) -> Result<Hierarchy, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn hierarchy_by_name(&self, name: &str) -> Result<Option<Hierarchy>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_hierarchy(&self, id: HierarchyId) -> Result<Option<Hierarchy>, StorageError>;

    /// All hierarchies ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn list_hierarchies(&self) -> Result<Vec<Hierarchy>, StorageError>;

    /// Append a section as the last child of its parent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown parent or hierarchy and
    /// `StorageError::Conflict` for a second root or a duplicate sibling slug.
    async fn insert_section(&self, section: NewSectionRecord) -> Result<SectionId, StorageError>;

    /// Sections of a hierarchy in preorder, root first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored tree is malformed.
    async fn sections(&self, hierarchy_id: HierarchyId) -> Result<Vec<Section>, StorageError>;

    /// Append a block at the end of a section.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown section.
    async fn insert_block(
        &self,
        section_id: SectionId,
        kind: BlockKind,
    ) -> Result<PageBlock, StorageError>;

    /// Blocks of every section in the hierarchy ordered by `(section, ordinal)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn blocks_in_hierarchy(
        &self,
        hierarchy_id: HierarchyId,
    ) -> Result<Vec<PageBlock>, StorageError>;

    /// Quiz blocks tagged with the given css class, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn quiz_blocks_by_class(&self, css_class: &str) -> Result<Vec<PageBlock>, StorageError>;
}

#[async_trait]
pub trait VisitRepository: Send + Sync {
    /// Insert or touch the user's visit row for a section.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn record_visit(
        &self,
        user_id: UserId,
        section_id: SectionId,
        at: DateTime<Utc>,
    ) -> Result<PageVisit, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn visits_in_hierarchy(
        &self,
        user_id: UserId,
        hierarchy_id: HierarchyId,
    ) -> Result<Vec<PageVisit>, StorageError>;
}

#[async_trait]
pub trait VideoViewRepository: Send + Sync {
    /// Create-or-update the (user, video) record in one atomic step: the
    /// duration is overwritten and `seconds_viewed` is added to the total.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn accumulate_view(
        &self,
        user_id: UserId,
        video_id: &str,
        video_duration: i64,
        seconds_viewed: i64,
    ) -> Result<UserVideoView, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_view(
        &self,
        user_id: UserId,
        video_id: &str,
    ) -> Result<Option<UserVideoView>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn views_for_user(&self, user_id: UserId) -> Result<Vec<UserVideoView>, StorageError>;
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown block.
    async fn record_submission(
        &self,
        user_id: UserId,
        block_id: BlockId,
        at: DateTime<Utc>,
    ) -> Result<QuizSubmission, StorageError>;

    /// Number of submissions per quiz block for a user. Blocks never
    /// submitted are absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn submission_counts(
        &self,
        user_id: UserId,
    ) -> Result<HashMap<BlockId, u32>, StorageError>;
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Bundles the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub curriculum: Arc<dyn CurriculumRepository>,
    pub visits: Arc<dyn VisitRepository>,
    pub video_views: Arc<dyn VideoViewRepository>,
    pub submissions: Arc<dyn SubmissionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every contract to the same repository value.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: UserRepository
            + ProfileRepository
            + CurriculumRepository
            + VisitRepository
            + VideoViewRepository
            + SubmissionRepository
            + Clone
            + 'static,
    {
        Self {
            users: Arc::new(repo.clone()),
            profiles: Arc::new(repo.clone()),
            curriculum: Arc::new(repo.clone()),
            visits: Arc::new(repo.clone()),
            video_views: Arc::new(repo.clone()),
            submissions: Arc::new(repo),
        }
    }
}
