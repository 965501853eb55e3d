//! In-memory adapter for tests and prototyping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tutor_core::model::{
    BlockId, BlockKind, Hierarchy, HierarchyId, PageBlock, PageVisit, QuizSubmission, Section,
    SectionId, SectionNode, UserAccount, UserId, UserProfile, UserVideoView, preorder,
};

use crate::repository::{
    CurriculumRepository, NewSectionRecord, NewUserRecord, ProfileRepository, StorageError,
    SubmissionRepository, UserRepository, VideoViewRepository, VisitRepository,
};

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, UserAccount>,
    profiles: HashMap<UserId, UserProfile>,
    hierarchies: BTreeMap<HierarchyId, Hierarchy>,
    sections: BTreeMap<SectionId, SectionNode>,
    blocks: BTreeMap<BlockId, PageBlock>,
    visits: HashMap<(UserId, SectionId), PageVisit>,
    video_views: HashMap<(UserId, String), UserVideoView>,
    submissions: Vec<QuizSubmission>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Every contract behind a single mutex, so each call is one atomic step.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn insert_user(&self, user: NewUserRecord) -> Result<UserAccount, StorageError> {
        let mut guard = self.lock()?;
        if guard.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::Conflict);
        }
        let id = UserId::new(guard.next_id());
        let account = user.into_account(id);
        guard.users.insert(id, account.clone());
        Ok(account)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StorageError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn list_participants(&self) -> Result<Vec<UserAccount>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .users
            .values()
            .filter(|u| u.is_participant())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_or_create_profile(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StorageError> {
        let mut guard = self.lock()?;
        if !guard.users.contains_key(&user_id) {
            return Err(StorageError::NotFound);
        }
        Ok(guard
            .profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::new(user_id, now))
            .clone())
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StorageError> {
        Ok(self.lock()?.profiles.get(&user_id).cloned())
    }

    async fn update_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let slot = guard
            .profiles
            .get_mut(&profile.user_id)
            .ok_or(StorageError::NotFound)?;
        *slot = profile.clone();
        Ok(())
    }
}

#[async_trait]
impl CurriculumRepository for InMemoryRepository {
    async fn create_hierarchy(
        &self,
        name: &str,
        base_url: &str,
    ) -> Result<Hierarchy, StorageError> {
        let mut guard = self.lock()?;
        if guard.hierarchies.values().any(|h| h.name == name) {
            return Err(StorageError::Conflict);
        }
        let id = HierarchyId::new(guard.next_id());
        let hierarchy = Hierarchy::new(id, name, base_url)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let root_id = SectionId::new(guard.next_id());
        guard.sections.insert(
            root_id,
            SectionNode {
                id: root_id,
                hierarchy_id: id,
                parent_id: None,
                slug: String::new(),
                label: hierarchy.name.clone(),
                ordinal: 0,
            },
        );
        guard.hierarchies.insert(id, hierarchy.clone());
        Ok(hierarchy)
    }

    async fn hierarchy_by_name(&self, name: &str) -> Result<Option<Hierarchy>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.hierarchies.values().find(|h| h.name == name).cloned())
    }

    async fn get_hierarchy(&self, id: HierarchyId) -> Result<Option<Hierarchy>, StorageError> {
        Ok(self.lock()?.hierarchies.get(&id).cloned())
    }

    async fn list_hierarchies(&self) -> Result<Vec<Hierarchy>, StorageError> {
        Ok(self.lock()?.hierarchies.values().cloned().collect())
    }

    async fn insert_section(&self, section: NewSectionRecord) -> Result<SectionId, StorageError> {
        let mut guard = self.lock()?;
        if !guard.hierarchies.contains_key(&section.hierarchy_id) {
            return Err(StorageError::NotFound);
        }
        let Some(parent_id) = section.parent_id else {
            // create_hierarchy already made the root
            return Err(StorageError::Conflict);
        };
        match guard.sections.get(&parent_id) {
            Some(parent) if parent.hierarchy_id == section.hierarchy_id => {}
            _ => return Err(StorageError::NotFound),
        }
        Section::validate_slug(&section.slug)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let siblings: Vec<&SectionNode> = guard
            .sections
            .values()
            .filter(|n| n.parent_id == Some(parent_id))
            .collect();
        if siblings.iter().any(|n| n.slug == section.slug) {
            return Err(StorageError::Conflict);
        }
        let ordinal = siblings.iter().map(|n| n.ordinal + 1).max().unwrap_or(0);

        let id = SectionId::new(guard.next_id());
        guard.sections.insert(
            id,
            SectionNode {
                id,
                hierarchy_id: section.hierarchy_id,
                parent_id: Some(parent_id),
                slug: section.slug,
                label: section.label,
                ordinal,
            },
        );
        Ok(id)
    }

    async fn sections(&self, hierarchy_id: HierarchyId) -> Result<Vec<Section>, StorageError> {
        let nodes: Vec<SectionNode> = {
            let guard = self.lock()?;
            guard
                .sections
                .values()
                .filter(|n| n.hierarchy_id == hierarchy_id)
                .cloned()
                .collect()
        };
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        preorder(nodes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn insert_block(
        &self,
        section_id: SectionId,
        kind: BlockKind,
    ) -> Result<PageBlock, StorageError> {
        let mut guard = self.lock()?;
        if !guard.sections.contains_key(&section_id) {
            return Err(StorageError::NotFound);
        }
        let ordinal = guard
            .blocks
            .values()
            .filter(|b| b.section_id == section_id)
            .map(|b| b.ordinal + 1)
            .max()
            .unwrap_or(0);
        let block = PageBlock {
            id: BlockId::new(guard.next_id()),
            section_id,
            ordinal,
            kind,
        };
        guard.blocks.insert(block.id, block.clone());
        Ok(block)
    }

    async fn blocks_in_hierarchy(
        &self,
        hierarchy_id: HierarchyId,
    ) -> Result<Vec<PageBlock>, StorageError> {
        let guard = self.lock()?;
        let mut blocks: Vec<PageBlock> = guard
            .blocks
            .values()
            .filter(|b| {
                guard
                    .sections
                    .get(&b.section_id)
                    .is_some_and(|s| s.hierarchy_id == hierarchy_id)
            })
            .cloned()
            .collect();
        blocks.sort_by_key(|b| (b.section_id, b.ordinal));
        Ok(blocks)
    }

    async fn quiz_blocks_by_class(&self, css_class: &str) -> Result<Vec<PageBlock>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .blocks
            .values()
            .filter(|b| matches!(&b.kind, BlockKind::Quiz(q) if q.css_extra == css_class))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl VisitRepository for InMemoryRepository {
    async fn record_visit(
        &self,
        user_id: UserId,
        section_id: SectionId,
        at: DateTime<Utc>,
    ) -> Result<PageVisit, StorageError> {
        let mut guard = self.lock()?;
        if !guard.sections.contains_key(&section_id) {
            return Err(StorageError::NotFound);
        }
        let visit = guard
            .visits
            .entry((user_id, section_id))
            .and_modify(|v| v.touch(at))
            .or_insert_with(|| PageVisit::first(user_id, section_id, at));
        Ok(visit.clone())
    }

    async fn visits_in_hierarchy(
        &self,
        user_id: UserId,
        hierarchy_id: HierarchyId,
    ) -> Result<Vec<PageVisit>, StorageError> {
        let guard = self.lock()?;
        let mut visits: Vec<PageVisit> = guard
            .visits
            .values()
            .filter(|v| v.user_id == user_id)
            .filter(|v| {
                guard
                    .sections
                    .get(&v.section_id)
                    .is_some_and(|s| s.hierarchy_id == hierarchy_id)
            })
            .cloned()
            .collect();
        visits.sort_by_key(|v| (v.first_visit, v.section_id));
        Ok(visits)
    }
}

#[async_trait]
impl VideoViewRepository for InMemoryRepository {
    async fn accumulate_view(
        &self,
        user_id: UserId,
        video_id: &str,
        video_duration: i64,
        seconds_viewed: i64,
    ) -> Result<UserVideoView, StorageError> {
        let mut guard = self.lock()?;
        let view = guard
            .video_views
            .entry((user_id, video_id.to_owned()))
            .or_insert_with(|| UserVideoView::empty(user_id, video_id));
        view.accumulate(video_duration, seconds_viewed);
        Ok(view.clone())
    }

    async fn get_view(
        &self,
        user_id: UserId,
        video_id: &str,
    ) -> Result<Option<UserVideoView>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .video_views
            .get(&(user_id, video_id.to_owned()))
            .cloned())
    }

    async fn views_for_user(&self, user_id: UserId) -> Result<Vec<UserVideoView>, StorageError> {
        let guard = self.lock()?;
        let mut views: Vec<UserVideoView> = guard
            .video_views
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        views.sort_by(|a, b| a.video_id.cmp(&b.video_id));
        Ok(views)
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryRepository {
    async fn record_submission(
        &self,
        user_id: UserId,
        block_id: BlockId,
        at: DateTime<Utc>,
    ) -> Result<QuizSubmission, StorageError> {
        let mut guard = self.lock()?;
        if !guard.blocks.contains_key(&block_id) {
            return Err(StorageError::NotFound);
        }
        let submission = QuizSubmission {
            user_id,
            block_id,
            submitted_at: at,
        };
        guard.submissions.push(submission.clone());
        Ok(submission)
    }

    async fn submission_counts(
        &self,
        user_id: UserId,
    ) -> Result<HashMap<BlockId, u32>, StorageError> {
        let guard = self.lock()?;
        let mut counts = HashMap::new();
        for s in guard.submissions.iter().filter(|s| s.user_id == user_id) {
            *counts.entry(s.block_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tutor_core::model::YouTubeBlock;
    use tutor_core::time::fixed_now;

    async fn tree(repo: &InMemoryRepository) -> (Hierarchy, Vec<Section>) {
        let h = repo.create_hierarchy("a", "/pages/a/").await.unwrap();
        let root = repo.sections(h.id).await.unwrap()[0].id;
        for slug in ["one", "two"] {
            repo.insert_section(NewSectionRecord {
                hierarchy_id: h.id,
                parent_id: Some(root),
                slug: slug.into(),
                label: slug.into(),
            })
            .await
            .unwrap();
        }
        let sections = repo.sections(h.id).await.unwrap();
        (h, sections)
    }

    #[tokio::test]
    async fn duplicate_usernames_conflict() {
        let repo = InMemoryRepository::new();
        repo.insert_user(NewUserRecord::participant("p1")).await.unwrap();
        let err = repo
            .insert_user(NewUserRecord::participant("p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn participants_are_inactive_users_in_id_order() {
        let repo = InMemoryRepository::new();
        let p2 = repo.insert_user(NewUserRecord::participant("p2")).await.unwrap();
        repo.insert_user(NewUserRecord::staff("admin")).await.unwrap();
        let p1 = repo.insert_user(NewUserRecord::participant("p1")).await.unwrap();

        let ids: Vec<_> = repo
            .list_participants()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec![p2.id, p1.id]);
    }

    #[tokio::test]
    async fn sections_come_back_in_preorder() {
        let repo = InMemoryRepository::new();
        let (_, sections) = tree(&repo).await;
        let paths: Vec<_> = sections.iter().map(|s| s.path.clone()).collect();
        assert_eq!(paths, vec!["", "one", "two"]);
    }

    #[tokio::test]
    async fn second_root_and_duplicate_slug_conflict() {
        let repo = InMemoryRepository::new();
        let (h, sections) = tree(&repo).await;
        let root_again = repo
            .insert_section(NewSectionRecord {
                hierarchy_id: h.id,
                parent_id: None,
                slug: String::new(),
                label: "again".into(),
            })
            .await;
        assert!(matches!(root_again, Err(StorageError::Conflict)));

        let dup = repo
            .insert_section(NewSectionRecord {
                hierarchy_id: h.id,
                parent_id: Some(sections[0].id),
                slug: "one".into(),
                label: "dup".into(),
            })
            .await;
        assert!(matches!(dup, Err(StorageError::Conflict)));
    }

    #[tokio::test]
    async fn visits_keep_first_and_advance_last() {
        let repo = InMemoryRepository::new();
        let (h, sections) = tree(&repo).await;
        let user = repo.insert_user(NewUserRecord::participant("p")).await.unwrap();
        let start = fixed_now();

        repo.record_visit(user.id, sections[1].id, start).await.unwrap();
        let v = repo
            .record_visit(user.id, sections[1].id, start + Duration::minutes(4))
            .await
            .unwrap();
        assert_eq!(v.first_visit, start);
        assert_eq!(v.last_visit, start + Duration::minutes(4));

        let other = repo.create_hierarchy("b", "/pages/b/").await.unwrap();
        let other_root = repo.sections(other.id).await.unwrap()[0].id;
        repo.record_visit(user.id, other_root, start).await.unwrap();

        let visits = repo.visits_in_hierarchy(user.id, h.id).await.unwrap();
        assert_eq!(visits.len(), 1);
    }

    #[tokio::test]
    async fn video_views_accumulate() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        repo.accumulate_view(user, "vid", 100, 30).await.unwrap();
        let view = repo.accumulate_view(user, "vid", 120, 45).await.unwrap();
        assert_eq!(view.seconds_viewed, 75);
        assert_eq!(view.video_duration, 120);
        assert!(repo.get_view(user, "other").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_view_pings_are_all_counted() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.accumulate_view(user, "vid", 600, 3).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let view = repo.get_view(user, "vid").await.unwrap().unwrap();
        assert_eq!(view.seconds_viewed, 150);
    }

    #[tokio::test]
    async fn blocks_are_ordered_within_sections() {
        let repo = InMemoryRepository::new();
        let (h, sections) = tree(&repo).await;
        for title in ["first", "second"] {
            repo.insert_block(
                sections[1].id,
                BlockKind::YouTube(YouTubeBlock {
                    video_id: title.into(),
                    title: title.into(),
                }),
            )
            .await
            .unwrap();
        }
        let blocks = repo.blocks_in_hierarchy(h.id).await.unwrap();
        let ordinals: Vec<_> = blocks.iter().map(|b| b.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1]);
    }
}
