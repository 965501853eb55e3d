use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tutor_core::model::{
    BlockId, BlockKind, Hierarchy, HierarchyId, PageBlock, PageVisit, ResearchGroup, SectionId,
    SectionNode, UserAccount, UserId, UserProfile, UserVideoView,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Maps unique/foreign-key violations to `Conflict`/`NotFound`, anything else to `Connection`.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound;
        }
    }
    conn(e)
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn hierarchy_id_from_i64(v: i64) -> Result<HierarchyId, StorageError> {
    Ok(HierarchyId::new(i64_to_u64("hierarchy_id", v)?))
}

pub(crate) fn section_id_from_i64(v: i64) -> Result<SectionId, StorageError> {
    Ok(SectionId::new(i64_to_u64("section_id", v)?))
}

pub(crate) fn block_id_from_i64(v: i64) -> Result<BlockId, StorageError> {
    Ok(BlockId::new(i64_to_u64("block_id", v)?))
}

pub(crate) fn block_type_str(kind: &BlockKind) -> &'static str {
    match kind {
        BlockKind::YouTube(_) => "youtube",
        BlockKind::Quiz(_) => "quiz",
        BlockKind::QuizSummary(_) => "quiz_summary",
    }
}

pub(crate) fn map_user_row(row: &SqliteRow) -> Result<UserAccount, StorageError> {
    Ok(UserAccount {
        id: user_id_from_i64(row.try_get("id").map_err(ser)?)?,
        username: row.try_get("username").map_err(ser)?,
        is_active: row.try_get::<i64, _>("is_active").map_err(ser)? != 0,
        is_staff: row.try_get::<i64, _>("is_staff").map_err(ser)? != 0,
        is_superuser: row.try_get::<i64, _>("is_superuser").map_err(ser)? != 0,
    })
}

pub(crate) fn map_profile_row(row: &SqliteRow) -> Result<UserProfile, StorageError> {
    let group: String = row.try_get("research_group").map_err(ser)?;
    Ok(UserProfile {
        user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        research_group: group.parse::<ResearchGroup>().map_err(ser)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
        modified_at: row.try_get::<DateTime<Utc>, _>("modified_at").map_err(ser)?,
    })
}

pub(crate) fn map_hierarchy_row(row: &SqliteRow) -> Result<Hierarchy, StorageError> {
    Hierarchy::new(
        hierarchy_id_from_i64(row.try_get("id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<String, _>("base_url").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_section_node_row(row: &SqliteRow) -> Result<SectionNode, StorageError> {
    Ok(SectionNode {
        id: section_id_from_i64(row.try_get("id").map_err(ser)?)?,
        hierarchy_id: hierarchy_id_from_i64(row.try_get("hierarchy_id").map_err(ser)?)?,
        parent_id: row
            .try_get::<Option<i64>, _>("parent_id")
            .map_err(ser)?
            .map(section_id_from_i64)
            .transpose()?,
        slug: row.try_get("slug").map_err(ser)?,
        label: row.try_get("label").map_err(ser)?,
        ordinal: u32_from_i64("ordinal", row.try_get("ordinal").map_err(ser)?)?,
    })
}

pub(crate) fn map_block_row(row: &SqliteRow) -> Result<PageBlock, StorageError> {
    let payload: String = row.try_get("payload").map_err(ser)?;
    let kind: BlockKind = serde_json::from_str(&payload).map_err(ser)?;
    Ok(PageBlock {
        id: block_id_from_i64(row.try_get("id").map_err(ser)?)?,
        section_id: section_id_from_i64(row.try_get("section_id").map_err(ser)?)?,
        ordinal: u32_from_i64("ordinal", row.try_get("ordinal").map_err(ser)?)?,
        kind,
    })
}

pub(crate) fn map_visit_row(row: &SqliteRow) -> Result<PageVisit, StorageError> {
    Ok(PageVisit {
        user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        section_id: section_id_from_i64(row.try_get("section_id").map_err(ser)?)?,
        first_visit: row.try_get("first_visit").map_err(ser)?,
        last_visit: row.try_get("last_visit").map_err(ser)?,
    })
}

pub(crate) fn map_video_view_row(row: &SqliteRow) -> Result<UserVideoView, StorageError> {
    Ok(UserVideoView {
        user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        video_id: row.try_get("video_id").map_err(ser)?,
        video_duration: row.try_get("video_duration").map_err(ser)?,
        seconds_viewed: row.try_get("seconds_viewed").map_err(ser)?,
    })
}
