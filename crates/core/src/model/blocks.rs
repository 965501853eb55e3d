use serde::{Deserialize, Serialize};

use crate::model::ids::{BlockId, SectionId};

/// An embedded YouTube video tracked by the player script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YouTubeBlock {
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub title: String,
}

/// A quiz the learner has to submit before moving on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizBlock {
    #[serde(default)]
    pub title: String,
    /// Grouping class used by quiz summary blocks.
    #[serde(default)]
    pub css_extra: String,
}

/// Summarizes the quizzes sharing a css class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSummaryBlock {
    #[serde(default)]
    pub quiz_class: String,
}

/// Typed payload of a page block. Serializes as a tagged dictionary for
/// curriculum import/export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "block_type", rename_all = "snake_case")]
pub enum BlockKind {
    #[serde(rename = "youtube")]
    YouTube(YouTubeBlock),
    Quiz(QuizBlock),
    QuizSummary(QuizSummaryBlock),
}

impl BlockKind {
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            BlockKind::YouTube(_) => "YouTube Video",
            BlockKind::Quiz(_) => "Quiz",
            BlockKind::QuizSummary(_) => "Quiz Summary Block",
        }
    }

    #[must_use]
    pub fn needs_submit(&self) -> bool {
        matches!(self, BlockKind::Quiz(_))
    }

    /// Whether the block lets the learner past it, given whether they have
    /// submitted it.
    #[must_use]
    pub fn unlocked(&self, submitted: bool) -> bool {
        !self.needs_submit() || submitted
    }
}

/// A block placed on a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBlock {
    pub id: BlockId,
    pub section_id: SectionId,
    pub ordinal: u32,
    #[serde(flatten)]
    pub kind: BlockKind,
}
