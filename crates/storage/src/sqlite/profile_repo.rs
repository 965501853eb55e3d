use chrono::{DateTime, Utc};
use tutor_core::model::{UserId, UserProfile};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_profile_row, write_err};
use crate::repository::{ProfileRepository, StorageError};

#[async_trait::async_trait]
impl ProfileRepository for SqliteRepository {
    async fn get_or_create_profile(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StorageError> {
        let id = id_to_i64("user_id", user_id.value())?;
        let fresh = UserProfile::new(user_id, now);

        // foreign key on users turns an unknown id into NotFound
        sqlx::query(
            r"
            INSERT INTO user_profiles (user_id, research_group, created_at, modified_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO NOTHING
            ",
        )
        .bind(id)
        .bind(fresh.research_group.to_string())
        .bind(fresh.created_at)
        .bind(fresh.modified_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        self.get_profile(user_id).await?.ok_or(StorageError::NotFound)
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, research_group, created_at, modified_at
            FROM user_profiles WHERE user_id = ?1
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_profile_row).transpose()
    }

    async fn update_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE user_profiles
            SET research_group = ?2, modified_at = ?3
            WHERE user_id = ?1
            ",
        )
        .bind(id_to_i64("user_id", profile.user_id.value())?)
        .bind(profile.research_group.to_string())
        .bind(profile.modified_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
