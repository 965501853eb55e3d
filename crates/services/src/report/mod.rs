//! Research report: column discovery, metadata rows and per-participant values.

mod assembler;
mod blocks;
mod column;
mod standalone;

pub use assembler::{
    DEFAULT_SELECTOR, METADATA_HEADER, ReportAssembler, ReportKind, ReportRow, ReportRows,
    selector_label,
};
pub use blocks::{QuizColumn, Reportable, YouTubeColumn};
pub use column::{Cell, ColumnMetadata, ParticipantContext, ReportColumn, SharedColumn};
pub use standalone::{ALL_HIERARCHIES, StandaloneColumn, standalone_columns};
