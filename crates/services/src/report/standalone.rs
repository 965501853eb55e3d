use std::sync::Arc;

use super::column::{Cell, ColumnMetadata, ParticipantContext, ReportColumn, SharedColumn};

/// Tree name used in the metadata of columns that span every hierarchy.
pub const ALL_HIERARCHIES: &str = "All";

/// A fixed per-participant field.
#[derive(Debug, Clone, Copy)]
pub struct StandaloneColumn {
    identifier: &'static str,
    item_type: &'static str,
    value_type: &'static str,
    item_text: &'static str,
    extract: fn(&ParticipantContext) -> Cell,
}

impl StandaloneColumn {
    #[must_use]
    pub const fn new(
        identifier: &'static str,
        item_type: &'static str,
        value_type: &'static str,
        item_text: &'static str,
        extract: fn(&ParticipantContext) -> Cell,
    ) -> Self {
        Self {
            identifier,
            item_type,
            value_type,
            item_text,
            extract,
        }
    }
}

impl ReportColumn for StandaloneColumn {
    fn identifier(&self) -> &str {
        self.identifier
    }

    fn metadata(&self) -> ColumnMetadata {
        ColumnMetadata {
            hierarchy: ALL_HIERARCHIES.to_owned(),
            identifier: self.identifier.to_owned(),
            item_type: self.item_type.to_owned(),
            value_type: self.value_type.to_owned(),
            item_text: self.item_text.to_owned(),
        }
    }

    fn user_value(&self, participant: &ParticipantContext) -> Cell {
        (self.extract)(participant)
    }
}

/// Participant fields that lead every report, in column order.
#[must_use]
pub fn standalone_columns() -> Vec<SharedColumn> {
    [
        StandaloneColumn::new(
            "participant_id",
            "profile",
            "string",
            "Participant Id",
            |p| Cell::Text(p.user.username.clone()),
        ),
        StandaloneColumn::new(
            "percent_complete",
            "profile",
            "percent",
            "% of hierarchy completed",
            |p| p.progress.percent_complete().into(),
        ),
        StandaloneColumn::new(
            "last_access",
            "profile",
            "date string",
            "last access date",
            |p| Cell::Text(p.progress.last_access_formatted()),
        ),
        StandaloneColumn::new("time_spent", "profile", "integer", "minutes", |p| {
            p.progress.time_spent().into()
        }),
    ]
    .into_iter()
    .map(|c| Arc::new(c) as SharedColumn)
    .collect()
}
