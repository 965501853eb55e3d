use std::sync::Arc;

use tutor_core::model::{BlockId, BlockKind, Hierarchy, PageBlock};

use super::column::{Cell, ColumnMetadata, ParticipantContext, ReportColumn, SharedColumn};

/// Content that contributes columns to the research report.
pub trait Reportable {
    fn report_columns(&self, hierarchy: &Hierarchy) -> Vec<SharedColumn>;
}

impl Reportable for PageBlock {
    fn report_columns(&self, hierarchy: &Hierarchy) -> Vec<SharedColumn> {
        match &self.kind {
            BlockKind::YouTube(video) => vec![Arc::new(YouTubeColumn::new(
                &hierarchy.name,
                &video.video_id,
                &video.title,
            ))],
            BlockKind::Quiz(quiz) => vec![Arc::new(QuizColumn::new(
                &hierarchy.name,
                self.id,
                &quiz.title,
            ))],
            BlockKind::QuizSummary(_) => Vec::new(),
        }
    }
}

/// Percent of one video each participant has watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YouTubeColumn {
    hierarchy: String,
    video_id: String,
    title: String,
}

impl YouTubeColumn {
    #[must_use]
    pub fn new(hierarchy: &str, video_id: &str, title: &str) -> Self {
        Self {
            hierarchy: hierarchy.to_owned(),
            video_id: video_id.to_owned(),
            title: title.to_owned(),
        }
    }
}

impl ReportColumn for YouTubeColumn {
    fn identifier(&self) -> &str {
        &self.video_id
    }

    fn metadata(&self) -> ColumnMetadata {
        ColumnMetadata {
            hierarchy: self.hierarchy.clone(),
            identifier: self.video_id.clone(),
            item_type: "YouTube Video".to_owned(),
            value_type: "percent viewed".to_owned(),
            item_text: self.title.clone(),
        }
    }

    fn user_value(&self, participant: &ParticipantContext) -> Cell {
        participant
            .video_views
            .get(&self.video_id)
            .map_or(Cell::Int(0), |v| Cell::Float(v.percent_viewed()))
    }
}

/// How often each participant submitted one quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizColumn {
    hierarchy: String,
    block_id: BlockId,
    identifier: String,
    title: String,
}

impl QuizColumn {
    #[must_use]
    pub fn new(hierarchy: &str, block_id: BlockId, title: &str) -> Self {
        Self {
            hierarchy: hierarchy.to_owned(),
            block_id,
            identifier: format!("quiz_{block_id}"),
            title: title.to_owned(),
        }
    }
}

impl ReportColumn for QuizColumn {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn metadata(&self) -> ColumnMetadata {
        ColumnMetadata {
            hierarchy: self.hierarchy.clone(),
            identifier: self.identifier.clone(),
            item_type: "Quiz".to_owned(),
            value_type: "submission count".to_owned(),
            item_text: self.title.clone(),
        }
    }

    fn user_value(&self, participant: &ParticipantContext) -> Cell {
        let count = participant
            .submissions
            .get(&self.block_id)
            .copied()
            .unwrap_or(0);
        Cell::Int(i64::from(count))
    }
}
