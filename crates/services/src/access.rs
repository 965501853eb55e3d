//! Page access rules: research-group trees, the gated video tree, and quiz locks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use storage::repository::{CurriculumRepository, SubmissionRepository, VisitRepository};
use tracing::{debug, info};
use tutor_core::model::{BlockId, PageVisit, ResearchGroup, Section, SectionId, UserAccount};

use crate::Clock;
use crate::error::{AccessError, ProgressError};
use crate::progress::{CurriculumTree, ProgressService};

pub const DEFAULT_GATED_HIERARCHY: &str = "videos";

/// Which hierarchy is gated and which research groups bypass the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub gated_hierarchy: String,
    pub control_groups: Vec<ResearchGroup>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            gated_hierarchy: DEFAULT_GATED_HIERARCHY.to_owned(),
            control_groups: Vec::new(),
        }
    }
}

impl AccessPolicy {
    #[must_use]
    pub fn in_control_group(&self, group: ResearchGroup) -> bool {
        self.control_groups.contains(&group)
    }
}

/// Outcome of a page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed {
        section: Section,
        url: String,
        visit: PageVisit,
    },
    Redirect {
        location: String,
    },
}

/// Decides who may open which section and records allowed visits.
#[derive(Clone)]
pub struct AccessService {
    clock: Clock,
    policy: AccessPolicy,
    curriculum: Arc<dyn CurriculumRepository>,
    visits: Arc<dyn VisitRepository>,
    submissions: Arc<dyn SubmissionRepository>,
    progress: ProgressService,
}

impl AccessService {
    #[must_use]
    pub fn new(
        clock: Clock,
        policy: AccessPolicy,
        curriculum: Arc<dyn CurriculumRepository>,
        visits: Arc<dyn VisitRepository>,
        submissions: Arc<dyn SubmissionRepository>,
        progress: ProgressService,
    ) -> Self {
        Self {
            clock,
            policy,
            curriculum,
            visits,
            submissions,
            progress,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Check whether `user` may open the section at `path` in `hierarchy_name`.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::UnknownSection` when the hierarchy or path does
    /// not exist, and `AccessError::Progress` when the redirect target cannot
    /// be resolved.
    pub async fn check_section(
        &self,
        user: &UserAccount,
        hierarchy_name: &str,
        path: &str,
    ) -> Result<AccessDecision, AccessError> {
        let tree = match self.progress.tree(hierarchy_name).await {
            Ok(tree) => tree,
            Err(ProgressError::UnknownHierarchy(_)) => {
                return Err(unknown(hierarchy_name, path));
            }
            Err(err) => return Err(err.into()),
        };
        let section = tree
            .section_by_path(path)
            .cloned()
            .ok_or_else(|| unknown(hierarchy_name, path))?;

        if !user.is_superuser {
            let counts = self.submissions.submission_counts(user.id).await?;
            if !self.may_enter(user, &tree, &counts).await? {
                info!(user = %user.id, hierarchy = hierarchy_name, "hierarchy denied");
                return self.redirect_to_last_location(user).await;
            }
            if let Some(locked) = self.first_locked_before(&tree, &section, &counts).await? {
                debug!(user = %user.id, section = %section.id, locked = %locked.id, "section locked");
                return Ok(AccessDecision::Redirect {
                    location: tree.url_of(locked)?,
                });
            }
        }

        let visit = self
            .visits
            .record_visit(user.id, section.id, self.clock.now())
            .await?;
        let url = tree.url_of(&section)?;
        Ok(AccessDecision::Allowed {
            section,
            url,
            visit,
        })
    }

    /// Index redirect for a signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Progress` if the user's tree cannot be loaded.
    pub async fn landing(&self, user: &UserAccount) -> Result<String, AccessError> {
        Ok(self.progress.last_location_url(user.id).await?)
    }

    /// Where a user goes after signing out: participants return to their
    /// last page, everyone else to `/`.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Progress` if a participant's tree cannot be loaded.
    pub async fn logout_destination(&self, user: &UserAccount) -> Result<String, AccessError> {
        if user.is_participant() {
            self.landing(user).await
        } else {
            Ok("/".to_owned())
        }
    }

    async fn may_enter(
        &self,
        user: &UserAccount,
        tree: &CurriculumTree,
        counts: &HashMap<BlockId, u32>,
    ) -> Result<bool, AccessError> {
        let group = self.progress.research_group(user.id).await?;
        let name = &tree.hierarchy().name;
        if *name == self.policy.gated_hierarchy {
            let submitted_any = counts.values().any(|n| *n > 0);
            return Ok(self.policy.in_control_group(group) || submitted_any);
        }
        Ok(*name == group.hierarchy_name())
    }

    /// First earlier section (preorder) holding a block the user still has to submit.
    async fn first_locked_before<'t>(
        &self,
        tree: &'t CurriculumTree,
        section: &Section,
        counts: &HashMap<BlockId, u32>,
    ) -> Result<Option<&'t Section>, AccessError> {
        let blocks = self
            .curriculum
            .blocks_in_hierarchy(tree.hierarchy().id)
            .await?;
        let blocking: HashSet<SectionId> = blocks
            .iter()
            .filter(|b| !b.kind.unlocked(counts.get(&b.id).is_some_and(|n| *n > 0)))
            .map(|b| b.section_id)
            .collect();
        Ok(tree
            .sections()
            .iter()
            .take_while(|s| s.position < section.position)
            .find(|s| blocking.contains(&s.id)))
    }

    async fn redirect_to_last_location(
        &self,
        user: &UserAccount,
    ) -> Result<AccessDecision, AccessError> {
        Ok(AccessDecision::Redirect {
            location: self.landing(user).await?,
        })
    }
}

fn unknown(hierarchy: &str, path: &str) -> AccessError {
    AccessError::UnknownSection {
        hierarchy: hierarchy.to_owned(),
        path: path.trim_matches('/').to_owned(),
    }
}
