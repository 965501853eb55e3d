use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::Row;
use tutor_core::model::{BlockId, QuizSubmission, UserId};

use super::SqliteRepository;
use super::mapping::{block_id_from_i64, conn, id_to_i64, ser, write_err};
use crate::repository::{StorageError, SubmissionRepository};

#[async_trait::async_trait]
impl SubmissionRepository for SqliteRepository {
    async fn record_submission(
        &self,
        user_id: UserId,
        block_id: BlockId,
        at: DateTime<Utc>,
    ) -> Result<QuizSubmission, StorageError> {
        sqlx::query(
            r"
            INSERT INTO quiz_submissions (user_id, block_id, submitted_at)
            VALUES (?1, ?2, ?3)
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("block_id", block_id.value())?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(QuizSubmission {
            user_id,
            block_id,
            submitted_at: at,
        })
    }

    async fn submission_counts(
        &self,
        user_id: UserId,
    ) -> Result<HashMap<BlockId, u32>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT block_id, COUNT(*) AS submissions
            FROM quiz_submissions
            WHERE user_id = ?1
            GROUP BY block_id
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let block = block_id_from_i64(row.try_get("block_id").map_err(ser)?)?;
            let n: i64 = row.try_get("submissions").map_err(ser)?;
            counts.insert(block, u32::try_from(n).map_err(ser)?);
        }
        Ok(counts)
    }
}
