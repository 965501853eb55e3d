use sqlx::Row;
use tutor_core::model::{
    BlockKind, Hierarchy, HierarchyId, PageBlock, QuizBlock, Section, SectionId, SectionNode,
    preorder,
};

use super::SqliteRepository;
use super::mapping::{
    block_id_from_i64, block_type_str, conn, hierarchy_id_from_i64, id_to_i64, map_block_row,
    map_hierarchy_row, map_section_node_row, section_id_from_i64, ser, write_err,
};
use crate::repository::{CurriculumRepository, NewSectionRecord, StorageError};

#[async_trait::async_trait]
impl CurriculumRepository for SqliteRepository {
    async fn create_hierarchy(
        &self,
        name: &str,
        base_url: &str,
    ) -> Result<Hierarchy, StorageError> {
        // normalize before touching the database
        let draft = Hierarchy::new(HierarchyId::new(0), name, base_url).map_err(ser)?;

        let mut tx = self.pool.begin().await.map_err(conn)?;
        let res = sqlx::query("INSERT INTO hierarchies (name, base_url) VALUES (?1, ?2)")
            .bind(&draft.name)
            .bind(&draft.base_url)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        let raw_id = res.last_insert_rowid();

        sqlx::query(
            r"
            INSERT INTO sections (hierarchy_id, parent_id, slug, label, ordinal)
            VALUES (?1, NULL, '', ?2, 0)
            ",
        )
        .bind(raw_id)
        .bind(&draft.name)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;
        tx.commit().await.map_err(conn)?;

        Ok(Hierarchy {
            id: hierarchy_id_from_i64(raw_id)?,
            ..draft
        })
    }

    async fn hierarchy_by_name(&self, name: &str) -> Result<Option<Hierarchy>, StorageError> {
        let row = sqlx::query("SELECT id, name, base_url FROM hierarchies WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_hierarchy_row).transpose()
    }

    async fn get_hierarchy(&self, id: HierarchyId) -> Result<Option<Hierarchy>, StorageError> {
        let row = sqlx::query("SELECT id, name, base_url FROM hierarchies WHERE id = ?1")
            .bind(id_to_i64("hierarchy_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_hierarchy_row).transpose()
    }

    async fn list_hierarchies(&self) -> Result<Vec<Hierarchy>, StorageError> {
        let rows = sqlx::query("SELECT id, name, base_url FROM hierarchies ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_hierarchy_row).collect()
    }

    async fn insert_section(&self, section: NewSectionRecord) -> Result<SectionId, StorageError> {
        let hierarchy_id = id_to_i64("hierarchy_id", section.hierarchy_id.value())?;
        let Some(parent_id) = section.parent_id else {
            if self.get_hierarchy(section.hierarchy_id).await?.is_none() {
                return Err(StorageError::NotFound);
            }
            // the root is created with its hierarchy
            return Err(StorageError::Conflict);
        };
        let parent_id = id_to_i64("section_id", parent_id.value())?;
        Section::validate_slug(&section.slug).map_err(ser)?;

        let mut tx = self.pool.begin().await.map_err(conn)?;
        let parent = sqlx::query("SELECT 1 FROM sections WHERE id = ?1 AND hierarchy_id = ?2")
            .bind(parent_id)
            .bind(hierarchy_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if parent.is_none() {
            return Err(StorageError::NotFound);
        }

        let res = sqlx::query(
            r"
            INSERT INTO sections (hierarchy_id, parent_id, slug, label, ordinal)
            VALUES (
                ?1, ?2, ?3, ?4,
                (SELECT COALESCE(MAX(ordinal) + 1, 0) FROM sections WHERE parent_id = ?2)
            )
            ",
        )
        .bind(hierarchy_id)
        .bind(parent_id)
        .bind(&section.slug)
        .bind(&section.label)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;
        tx.commit().await.map_err(conn)?;

        section_id_from_i64(res.last_insert_rowid())
    }

    async fn sections(&self, hierarchy_id: HierarchyId) -> Result<Vec<Section>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, hierarchy_id, parent_id, slug, label, ordinal
            FROM sections
            WHERE hierarchy_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(id_to_i64("hierarchy_id", hierarchy_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let nodes = rows
            .iter()
            .map(map_section_node_row)
            .collect::<Result<Vec<SectionNode>, _>>()?;
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        preorder(nodes).map_err(ser)
    }

    async fn insert_block(
        &self,
        section_id: SectionId,
        kind: BlockKind,
    ) -> Result<PageBlock, StorageError> {
        let raw_section = id_to_i64("section_id", section_id.value())?;
        let payload = serde_json::to_string(&kind).map_err(ser)?;
        let css_extra = match &kind {
            BlockKind::Quiz(QuizBlock { css_extra, .. }) => css_extra.as_str(),
            _ => "",
        };

        let row = sqlx::query(
            r"
            INSERT INTO page_blocks (section_id, ordinal, block_type, css_extra, payload)
            VALUES (
                ?1,
                (SELECT COALESCE(MAX(ordinal) + 1, 0) FROM page_blocks WHERE section_id = ?1),
                ?2, ?3, ?4
            )
            RETURNING id, ordinal
            ",
        )
        .bind(raw_section)
        .bind(block_type_str(&kind))
        .bind(css_extra)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;

        let ordinal: i64 = row.try_get("ordinal").map_err(ser)?;
        Ok(PageBlock {
            id: block_id_from_i64(row.try_get("id").map_err(ser)?)?,
            section_id,
            ordinal: u32::try_from(ordinal).map_err(ser)?,
            kind,
        })
    }

    async fn blocks_in_hierarchy(
        &self,
        hierarchy_id: HierarchyId,
    ) -> Result<Vec<PageBlock>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT b.id, b.section_id, b.ordinal, b.payload
            FROM page_blocks b
            JOIN sections s ON s.id = b.section_id
            WHERE s.hierarchy_id = ?1
            ORDER BY b.section_id ASC, b.ordinal ASC
            ",
        )
        .bind(id_to_i64("hierarchy_id", hierarchy_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_block_row).collect()
    }

    async fn quiz_blocks_by_class(&self, css_class: &str) -> Result<Vec<PageBlock>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, section_id, ordinal, payload
            FROM page_blocks
            WHERE block_type = 'quiz' AND css_extra = ?1
            ORDER BY id ASC
            ",
        )
        .bind(css_class)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_block_row).collect()
    }
}
