use std::sync::Arc;

use chrono::{DateTime, Utc};
use storage::repository::{
    CurriculumRepository, ProfileRepository, SubmissionRepository, VisitRepository,
};
use tracing::warn;
use tutor_core::model::{
    BlockKind, CurriculumError, Hierarchy, HierarchyId, PageBlock, ResearchGroup, Section,
    SectionId, UserId,
};
use tutor_core::progress::ProgressSnapshot;

use crate::error::ProgressError;

//
// ─── TREE ──────────────────────────────────────────────────────────────────────
//

/// A hierarchy together with its sections in preorder, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurriculumTree {
    hierarchy: Hierarchy,
    sections: Vec<Section>,
}

impl CurriculumTree {
    /// # Errors
    ///
    /// Returns `CurriculumError::MissingRoot` if `sections` does not start with a root.
    pub fn new(hierarchy: Hierarchy, sections: Vec<Section>) -> Result<Self, CurriculumError> {
        match sections.first() {
            Some(root) if root.is_root() => Ok(Self {
                hierarchy,
                sections,
            }),
            _ => Err(CurriculumError::MissingRoot),
        }
    }

    /// An unsaved tree holding only a root, under `/pages/{name}/`.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::EmptyHierarchyName` for a blank name.
    pub fn empty(name: &str) -> Result<Self, CurriculumError> {
        let id = HierarchyId::new(0);
        let hierarchy = Hierarchy::new(id, name, format!("/pages/{}/", name.trim()))?;
        Self::new(hierarchy, vec![Section::root(SectionId::new(0), id)])
    }

    #[must_use]
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[must_use]
    pub fn root(&self) -> &Section {
        &self.sections[0]
    }

    /// First child of the root, which in preorder is the section right after it.
    #[must_use]
    pub fn first_child(&self) -> Option<&Section> {
        self.sections
            .get(1)
            .filter(|s| s.parent_id == Some(self.root().id))
    }

    /// Number of sections below the root.
    #[must_use]
    pub fn descendant_count(&self) -> usize {
        self.sections.len() - 1
    }

    #[must_use]
    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Section addressed by its slash-joined slug path; surrounding slashes are ignored.
    #[must_use]
    pub fn section_by_path(&self, path: &str) -> Option<&Section> {
        let path = path.trim_matches('/');
        self.sections.iter().find(|s| s.path == path)
    }

    /// # Errors
    ///
    /// Returns `CurriculumError::HierarchyMismatch` for a section of another tree.
    pub fn url_of(&self, section: &Section) -> Result<String, CurriculumError> {
        section.absolute_url(&self.hierarchy)
    }
}

//
// ─── USER PROGRESS ─────────────────────────────────────────────────────────────
//

/// One user's progress through their research group's tree.
#[derive(Debug, Clone)]
pub struct UserProgress {
    tree: CurriculumTree,
    snapshot: ProgressSnapshot,
}

impl UserProgress {
    #[must_use]
    pub fn new(tree: CurriculumTree, snapshot: ProgressSnapshot) -> Self {
        Self { tree, snapshot }
    }

    #[must_use]
    pub fn tree(&self) -> &CurriculumTree {
        &self.tree
    }

    #[must_use]
    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn percent_complete(&self) -> u32 {
        self.snapshot.percent_complete()
    }

    #[must_use]
    pub fn last_access(&self) -> Option<DateTime<Utc>> {
        self.snapshot.last_access()
    }

    #[must_use]
    pub fn last_access_formatted(&self) -> String {
        self.snapshot.last_access_formatted()
    }

    #[must_use]
    pub fn time_spent(&self) -> i64 {
        self.snapshot.time_spent()
    }

    #[must_use]
    pub fn default_location(&self) -> &Section {
        self.tree.root()
    }

    /// Most recently visited section, or the root for a fresh user.
    #[must_use]
    pub fn last_location(&self) -> &Section {
        self.snapshot
            .last_section()
            .and_then(|id| self.tree.section(id))
            .unwrap_or_else(|| self.tree.root())
    }

    /// Where to send the user back to. Before any progress this is the first
    /// page of the tree rather than its root.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` if the tree is inconsistent.
    pub fn last_location_url(&self) -> Result<String, CurriculumError> {
        let section = if self.percent_complete() == 0 {
            self.tree.first_child().unwrap_or_else(|| self.tree.root())
        } else {
            self.last_location()
        };
        self.tree.url_of(section)
    }
}

/// A quiz listed by a quiz summary block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSummaryEntry {
    pub block: PageBlock,
    pub submitted: bool,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Derives progress figures from the visit log.
#[derive(Clone)]
pub struct ProgressService {
    profiles: Arc<dyn ProfileRepository>,
    curriculum: Arc<dyn CurriculumRepository>,
    visits: Arc<dyn VisitRepository>,
    submissions: Arc<dyn SubmissionRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        curriculum: Arc<dyn CurriculumRepository>,
        visits: Arc<dyn VisitRepository>,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> Self {
        Self {
            profiles,
            curriculum,
            visits,
            submissions,
        }
    }

    /// Research group of the user; users without a profile study the default group.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the profile lookup fails.
    pub async fn research_group(&self, user_id: UserId) -> Result<ResearchGroup, ProgressError> {
        Ok(self
            .profiles
            .get_profile(user_id)
            .await?
            .map(|p| p.research_group)
            .unwrap_or_default())
    }

    /// Load a hierarchy by name with its sections.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UnknownHierarchy` if no hierarchy has that name.
    pub async fn tree(&self, hierarchy_name: &str) -> Result<CurriculumTree, ProgressError> {
        let hierarchy = self
            .curriculum
            .hierarchy_by_name(hierarchy_name)
            .await?
            .ok_or_else(|| ProgressError::UnknownHierarchy(hierarchy_name.to_owned()))?;
        let sections = self.curriculum.sections(hierarchy.id).await?;
        Ok(CurriculumTree::new(hierarchy, sections)?)
    }

    /// Tree named by the research group. A group without a hierarchy studies
    /// an empty tree, so its members read as 0% at the root.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the curriculum cannot be read.
    pub async fn group_tree(&self, group: ResearchGroup) -> Result<CurriculumTree, ProgressError> {
        let name = group.hierarchy_name();
        match self.tree(&name).await {
            Err(ProgressError::UnknownHierarchy(_)) => {
                warn!(hierarchy = %name, "research group has no hierarchy, using an empty tree");
                Ok(CurriculumTree::empty(&name)?)
            }
            other => other,
        }
    }

    /// Progress of the user through the tree named by their research group.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the profile, curriculum or visits cannot be read.
    pub async fn for_user(&self, user_id: UserId) -> Result<UserProgress, ProgressError> {
        let group = self.research_group(user_id).await?;
        let tree = self.group_tree(group).await?;
        self.in_tree(user_id, tree).await
    }

    /// Progress of the user through an already loaded tree.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the visit log cannot be read.
    pub async fn in_tree(
        &self,
        user_id: UserId,
        tree: CurriculumTree,
    ) -> Result<UserProgress, ProgressError> {
        let visits = self
            .visits
            .visits_in_hierarchy(user_id, tree.hierarchy().id)
            .await?;
        let snapshot =
            ProgressSnapshot::from_visits(tree.root().id, tree.descendant_count(), &visits);
        Ok(UserProgress::new(tree, snapshot))
    }

    /// # Errors
    ///
    /// See [`ProgressService::for_user`].
    pub async fn percent_complete(&self, user_id: UserId) -> Result<u32, ProgressError> {
        Ok(self.for_user(user_id).await?.percent_complete())
    }

    /// # Errors
    ///
    /// See [`ProgressService::for_user`].
    pub async fn last_access(
        &self,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>, ProgressError> {
        Ok(self.for_user(user_id).await?.last_access())
    }

    /// # Errors
    ///
    /// See [`ProgressService::for_user`].
    pub async fn time_spent(&self, user_id: UserId) -> Result<i64, ProgressError> {
        Ok(self.for_user(user_id).await?.time_spent())
    }

    /// # Errors
    ///
    /// See [`ProgressService::for_user`].
    pub async fn last_location(&self, user_id: UserId) -> Result<Section, ProgressError> {
        Ok(self.for_user(user_id).await?.last_location().clone())
    }

    /// # Errors
    ///
    /// See [`ProgressService::for_user`].
    pub async fn last_location_url(&self, user_id: UserId) -> Result<String, ProgressError> {
        Ok(self.for_user(user_id).await?.last_location_url()?)
    }

    /// Root of the user's tree.
    ///
    /// # Errors
    ///
    /// See [`ProgressService::for_user`].
    pub async fn default_location(&self, user_id: UserId) -> Result<Section, ProgressError> {
        let group = self.research_group(user_id).await?;
        let tree = self.group_tree(group).await?;
        Ok(tree.root().clone())
    }

    /// Quizzes tagged `quiz_class`, each with whether the user submitted it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on repository failures.
    pub async fn quiz_summary(
        &self,
        user_id: UserId,
        quiz_class: &str,
    ) -> Result<Vec<QuizSummaryEntry>, ProgressError> {
        let blocks = self.curriculum.quiz_blocks_by_class(quiz_class).await?;
        let counts = self.submissions.submission_counts(user_id).await?;
        Ok(blocks
            .into_iter()
            .filter(|b| matches!(b.kind, BlockKind::Quiz(_)))
            .map(|block| QuizSummaryEntry {
                submitted: counts.get(&block.id).is_some_and(|n| *n > 0),
                block,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use storage::repository::{NewSectionRecord, NewUserRecord, Storage, UserRepository};
    use tutor_core::model::QuizBlock;
    use tutor_core::time::fixed_now;

    fn service(storage: &Storage) -> ProgressService {
        ProgressService::new(
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.curriculum),
            Arc::clone(&storage.visits),
            Arc::clone(&storage.submissions),
        )
    }

    async fn tree_with_pages(storage: &Storage, name: &str, slugs: &[&str]) -> Vec<SectionId> {
        let h = storage
            .curriculum
            .create_hierarchy(name, &format!("/pages/{name}/"))
            .await
            .unwrap();
        let root = storage.curriculum.sections(h.id).await.unwrap()[0].id;
        let mut ids = vec![root];
        for slug in slugs {
            let id = storage
                .curriculum
                .insert_section(NewSectionRecord {
                    hierarchy_id: h.id,
                    parent_id: Some(root),
                    slug: (*slug).into(),
                    label: (*slug).into(),
                })
                .await
                .unwrap();
            ids.push(id);
        }
        ids
    }

    #[tokio::test]
    async fn fresh_user_gets_defaults() {
        let storage = Storage::in_memory();
        tree_with_pages(&storage, "a", &["intro", "outro"]).await;
        let user = storage
            .users
            .insert_user(NewUserRecord::participant("p"))
            .await
            .unwrap();

        let progress = service(&storage).for_user(user.id).await.unwrap();
        assert_eq!(progress.percent_complete(), 0);
        assert_eq!(progress.last_access(), None);
        assert_eq!(progress.last_access_formatted(), "");
        assert_eq!(progress.time_spent(), 0);
        assert!(progress.last_location().is_root());
        assert_eq!(progress.last_location_url().unwrap(), "/pages/a/intro/");
    }

    #[tokio::test]
    async fn visits_drive_percent_time_and_location() {
        let storage = Storage::in_memory();
        let ids = tree_with_pages(&storage, "a", &["intro", "outro"]).await;
        let user = storage
            .users
            .insert_user(NewUserRecord::participant("p"))
            .await
            .unwrap();
        let start = fixed_now();
        storage.visits.record_visit(user.id, ids[0], start).await.unwrap();
        storage
            .visits
            .record_visit(user.id, ids[2], start + Duration::minutes(12))
            .await
            .unwrap();

        let svc = service(&storage);
        let progress = svc.for_user(user.id).await.unwrap();
        assert_eq!(progress.percent_complete(), 50);
        assert_eq!(progress.time_spent(), 12);
        assert_eq!(progress.last_location().id, ids[2]);
        assert_eq!(progress.last_location_url().unwrap(), "/pages/a/outro/");
        assert_eq!(
            progress.last_access_formatted(),
            (start + Duration::minutes(12))
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string()
        );

        storage
            .visits
            .record_visit(user.id, ids[1], start + Duration::minutes(20))
            .await
            .unwrap();
        assert_eq!(svc.percent_complete(user.id).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn empty_tree_is_zero_percent_and_root_url() {
        let storage = Storage::in_memory();
        tree_with_pages(&storage, "a", &[]).await;
        let progress = service(&storage).for_user(UserId::new(42)).await.unwrap();
        assert_eq!(progress.percent_complete(), 0);
        assert_eq!(progress.last_location_url().unwrap(), "/pages/a/");
    }

    #[tokio::test]
    async fn missing_group_tree_reads_as_an_empty_tree() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        let progress = svc.for_user(UserId::new(1)).await.unwrap();
        assert_eq!(progress.percent_complete(), 0);
        assert_eq!(progress.time_spent(), 0);
        assert!(progress.last_location().is_root());
        assert_eq!(progress.last_location_url().unwrap(), "/pages/a/");
        assert!(svc.default_location(UserId::new(1)).await.unwrap().is_root());

        let err = svc.tree("a").await.unwrap_err();
        assert!(matches!(err, ProgressError::UnknownHierarchy(name) if name == "a"));
    }

    #[tokio::test]
    async fn quiz_summary_marks_submitted_quizzes() {
        let storage = Storage::in_memory();
        let ids = tree_with_pages(&storage, "a", &["quiz"]).await;
        let quiz = |title: &str| {
            BlockKind::Quiz(QuizBlock {
                title: title.into(),
                css_extra: "pre".into(),
            })
        };
        let first = storage
            .curriculum
            .insert_block(ids[1], quiz("one"))
            .await
            .unwrap();
        storage
            .curriculum
            .insert_block(ids[1], quiz("two"))
            .await
            .unwrap();
        let user = UserId::new(7);
        storage
            .submissions
            .record_submission(user, first.id, fixed_now())
            .await
            .unwrap();

        let summary = service(&storage).quiz_summary(user, "pre").await.unwrap();
        let flags: Vec<_> = summary.iter().map(|e| e.submitted).collect();
        assert_eq!(flags, vec![true, false]);
    }
}
