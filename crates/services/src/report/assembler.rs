use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use storage::repository::{
    CurriculumRepository, SubmissionRepository, UserRepository, VideoViewRepository,
};
use tracing::{debug, info, warn};
use tutor_core::model::{SectionId, UserAccount};
use tutor_core::progress::ProgressSnapshot;

use super::blocks::Reportable;
use super::column::{ParticipantContext, SharedColumn};
use super::standalone::standalone_columns;
use crate::error::{ProgressError, ReportError};
use crate::progress::{CurriculumTree, ProgressService};

/// Header of the metadata report.
pub const METADATA_HEADER: [&str; 5] = [
    "hierarchy",
    "itemIdentifier",
    "group",
    "itemType",
    "itemText",
];

/// A row of report cells, already rendered to text.
pub type ReportRow = Vec<String>;

/// Lazy, single-pass sequence of report rows. A failed row ends the report.
pub type ReportRows = BoxStream<'static, Result<ReportRow, ReportError>>;

/// Selector assumed when a request names no report type.
pub const DEFAULT_SELECTOR: &str = "key";

/// Label used in the download filename: the requested selector with anything
/// outside `[A-Za-z0-9_-]` dropped, or `key` when nothing is left.
#[must_use]
pub fn selector_label(selector: Option<&str>) -> String {
    let label: String = selector
        .unwrap_or(DEFAULT_SELECTOR)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    if label.is_empty() {
        DEFAULT_SELECTOR.to_owned()
    } else {
        label
    }
}

/// Which report to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Metadata,
    Values,
}

impl ReportKind {
    /// Parse a request selector. Anything but `values` gets the metadata report.
    #[must_use]
    pub fn from_selector(selector: Option<&str>) -> Self {
        match selector.map(str::trim) {
            Some("values") => ReportKind::Values,
            _ => ReportKind::Metadata,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Metadata => "metadata",
            ReportKind::Values => "values",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the research report over every hierarchy.
#[derive(Clone)]
pub struct ReportAssembler {
    users: Arc<dyn UserRepository>,
    curriculum: Arc<dyn CurriculumRepository>,
    video_views: Arc<dyn VideoViewRepository>,
    submissions: Arc<dyn SubmissionRepository>,
    progress: ProgressService,
}

impl ReportAssembler {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        curriculum: Arc<dyn CurriculumRepository>,
        video_views: Arc<dyn VideoViewRepository>,
        submissions: Arc<dyn SubmissionRepository>,
        progress: ProgressService,
    ) -> Self {
        Self {
            users,
            curriculum,
            video_views,
            submissions,
            progress,
        }
    }

    /// Report columns in discovery order: standalone fields, then each
    /// hierarchy's blocks in page order. Repeated identifiers keep their
    /// first column.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Storage` if the curriculum cannot be read.
    pub async fn columns(&self) -> Result<Vec<SharedColumn>, ReportError> {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        let mut push = |column: SharedColumn| {
            if seen.insert(column.identifier().to_owned()) {
                columns.push(column);
            }
        };

        for column in standalone_columns() {
            push(column);
        }

        for hierarchy in self.curriculum.list_hierarchies().await? {
            let positions: HashMap<SectionId, u32> = self
                .curriculum
                .sections(hierarchy.id)
                .await?
                .into_iter()
                .map(|s| (s.id, s.position))
                .collect();
            let mut blocks = self.curriculum.blocks_in_hierarchy(hierarchy.id).await?;
            blocks.sort_by_key(|b| {
                (
                    positions.get(&b.section_id).copied().unwrap_or(u32::MAX),
                    b.ordinal,
                    b.id,
                )
            });
            for block in &blocks {
                for column in block.report_columns(&hierarchy) {
                    push(column);
                }
            }
        }
        Ok(columns)
    }

    /// # Errors
    ///
    /// Returns `ReportError` if column discovery or the participant listing fails.
    pub async fn rows(&self, kind: ReportKind) -> Result<ReportRows, ReportError> {
        match kind {
            ReportKind::Metadata => self.metadata().await,
            ReportKind::Values => self.values().await,
        }
    }

    /// Header plus one row describing each column.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if column discovery fails.
    pub async fn metadata(&self) -> Result<ReportRows, ReportError> {
        let columns = self.columns().await?;
        info!(columns = columns.len(), "assembling metadata report");
        let header: ReportRow = METADATA_HEADER.iter().map(|s| (*s).to_owned()).collect();
        let rows = std::iter::once(header)
            .chain(columns.into_iter().map(|c| c.metadata().into_row()))
            .map(Ok::<_, ReportError>);
        Ok(stream::iter(rows).boxed())
    }

    /// Header of column identifiers plus one row per participant. Rows are
    /// loaded as the stream is polled.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if column discovery or the participant listing fails.
    pub async fn values(&self) -> Result<ReportRows, ReportError> {
        let columns: Arc<[SharedColumn]> = self.columns().await?.into();
        let participants = self.users.list_participants().await?;
        let trees = Arc::new(self.trees().await?);
        info!(
            columns = columns.len(),
            participants = participants.len(),
            "assembling values report"
        );

        let header: ReportRow = columns.iter().map(|c| c.identifier().to_owned()).collect();
        let this = self.clone();
        let body = stream::iter(participants).then(move |user| {
            let this = this.clone();
            let columns = Arc::clone(&columns);
            let trees = Arc::clone(&trees);
            async move {
                let participant = this.participant(user, &trees).await?;
                debug!(user = %participant.user.id, "report row");
                Ok::<_, ReportError>(
                    columns
                        .iter()
                        .map(|c| c.user_value(&participant).to_string())
                        .collect(),
                )
            }
        });
        Ok(stream::once(async move { Ok::<_, ReportError>(header) })
            .chain(body)
            .boxed())
    }

    async fn trees(&self) -> Result<HashMap<String, CurriculumTree>, ReportError> {
        let mut trees = HashMap::new();
        for hierarchy in self.curriculum.list_hierarchies().await? {
            let sections = self.curriculum.sections(hierarchy.id).await?;
            let tree = CurriculumTree::new(hierarchy, sections).map_err(ProgressError::from)?;
            trees.insert(tree.hierarchy().name.clone(), tree);
        }
        Ok(trees)
    }

    async fn participant(
        &self,
        user: UserAccount,
        trees: &HashMap<String, CurriculumTree>,
    ) -> Result<ParticipantContext, ReportError> {
        let group = self.progress.research_group(user.id).await?;
        let name = group.hierarchy_name();
        let snapshot = match trees.get(&name) {
            Some(tree) => {
                let progress = self.progress.in_tree(user.id, tree.clone()).await?;
                progress.snapshot().clone()
            }
            None => {
                warn!(
                    user = %user.id,
                    hierarchy = %name,
                    "no hierarchy for research group, zero progress"
                );
                ProgressSnapshot::empty(0)
            }
        };
        let views = self.video_views.views_for_user(user.id).await?;
        let submissions = self.submissions.submission_counts(user.id).await?;
        Ok(ParticipantContext::new(user, snapshot, views, submissions))
    }
}
