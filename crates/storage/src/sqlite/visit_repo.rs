use chrono::{DateTime, Utc};
use tutor_core::model::{HierarchyId, PageVisit, SectionId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_visit_row, write_err};
use crate::repository::{StorageError, VisitRepository};

#[async_trait::async_trait]
impl VisitRepository for SqliteRepository {
    async fn record_visit(
        &self,
        user_id: UserId,
        section_id: SectionId,
        at: DateTime<Utc>,
    ) -> Result<PageVisit, StorageError> {
        // timestamps are stored as rfc3339 in UTC, so text order is time order
        let row = sqlx::query(
            r"
            INSERT INTO page_visits (user_id, section_id, first_visit, last_visit)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(user_id, section_id) DO UPDATE SET
                first_visit = MIN(page_visits.first_visit, excluded.first_visit),
                last_visit = MAX(page_visits.last_visit, excluded.last_visit)
            RETURNING user_id, section_id, first_visit, last_visit
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("section_id", section_id.value())?)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;

        map_visit_row(&row)
    }

    async fn visits_in_hierarchy(
        &self,
        user_id: UserId,
        hierarchy_id: HierarchyId,
    ) -> Result<Vec<PageVisit>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT v.user_id, v.section_id, v.first_visit, v.last_visit
            FROM page_visits v
            JOIN sections s ON s.id = v.section_id
            WHERE v.user_id = ?1 AND s.hierarchy_id = ?2
            ORDER BY v.first_visit ASC, v.section_id ASC
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("hierarchy_id", hierarchy_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_visit_row).collect()
    }
}
