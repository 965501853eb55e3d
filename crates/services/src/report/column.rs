use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tutor_core::model::{BlockId, UserAccount, UserVideoView};
use tutor_core::progress::ProgressSnapshot;

/// One cell of a values row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Int(n) => write!(f, "{n}"),
            // always a float literal, e.g. `25.0`
            Cell::Float(x) => write!(f, "{x:?}"),
        }
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<u32> for Cell {
    fn from(value: u32) -> Self {
        Cell::Int(i64::from(value))
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

/// Describes a column in the metadata report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub hierarchy: String,
    pub identifier: String,
    pub item_type: String,
    pub value_type: String,
    pub item_text: String,
}

impl ColumnMetadata {
    #[must_use]
    pub fn into_row(self) -> Vec<String> {
        vec![
            self.hierarchy,
            self.identifier,
            self.item_type,
            self.value_type,
            self.item_text,
        ]
    }
}

/// Everything a column may read about one participant, loaded once per row.
#[derive(Debug, Clone)]
pub struct ParticipantContext {
    pub user: UserAccount,
    pub progress: ProgressSnapshot,
    pub video_views: HashMap<String, UserVideoView>,
    pub submissions: HashMap<BlockId, u32>,
}

impl ParticipantContext {
    #[must_use]
    pub fn new(
        user: UserAccount,
        progress: ProgressSnapshot,
        video_views: impl IntoIterator<Item = UserVideoView>,
        submissions: HashMap<BlockId, u32>,
    ) -> Self {
        Self {
            user,
            progress,
            video_views: video_views
                .into_iter()
                .map(|v| (v.video_id.clone(), v))
                .collect(),
            submissions,
        }
    }
}

/// A report column: a stable identifier, its metadata row, and a per-user value.
///
/// `user_value` never fails; missing data reads as zero.
pub trait ReportColumn: Send + Sync {
    fn identifier(&self) -> &str;

    fn metadata(&self) -> ColumnMetadata;

    fn user_value(&self, participant: &ParticipantContext) -> Cell;
}

pub type SharedColumn = Arc<dyn ReportColumn>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_render_like_the_csv_consumers_expect() {
        assert_eq!(Cell::Float(25.0).to_string(), "25.0");
        assert_eq!(Cell::Float(12.5).to_string(), "12.5");
        assert_eq!(Cell::Int(0).to_string(), "0");
        assert_eq!(Cell::Text(String::new()).to_string(), "");
    }
}
