use tutor_core::model::{UserId, UserVideoView};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_video_view_row, write_err};
use crate::repository::{StorageError, VideoViewRepository};

#[async_trait::async_trait]
impl VideoViewRepository for SqliteRepository {
    async fn accumulate_view(
        &self,
        user_id: UserId,
        video_id: &str,
        video_duration: i64,
        seconds_viewed: i64,
    ) -> Result<UserVideoView, StorageError> {
        // single statement so concurrent reports never lose an increment;
        // negative deltas count as zero and the total saturates at i64::MAX
        let row = sqlx::query(
            r"
            INSERT INTO user_video_views (user_id, video_id, video_duration, seconds_viewed)
            VALUES (?1, ?2, ?3, MAX(?4, 0))
            ON CONFLICT(user_id, video_id) DO UPDATE SET
                video_duration = excluded.video_duration,
                seconds_viewed = CASE
                    WHEN user_video_views.seconds_viewed > ?5 - excluded.seconds_viewed THEN ?5
                    ELSE user_video_views.seconds_viewed + excluded.seconds_viewed
                END
            RETURNING user_id, video_id, video_duration, seconds_viewed
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(video_id)
        .bind(video_duration)
        .bind(seconds_viewed)
        .bind(i64::MAX)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;

        map_video_view_row(&row)
    }

    async fn get_view(
        &self,
        user_id: UserId,
        video_id: &str,
    ) -> Result<Option<UserVideoView>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, video_id, video_duration, seconds_viewed
            FROM user_video_views
            WHERE user_id = ?1 AND video_id = ?2
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_video_view_row).transpose()
    }

    async fn views_for_user(&self, user_id: UserId) -> Result<Vec<UserVideoView>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT user_id, video_id, video_duration, seconds_viewed
            FROM user_video_views
            WHERE user_id = ?1
            ORDER BY video_id ASC
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_video_view_row).collect()
    }
}
