use tutor_core::model::{UserAccount, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_user_row, user_id_from_i64, write_err};
use crate::repository::{NewUserRecord, StorageError, UserRepository};

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn insert_user(&self, user: NewUserRecord) -> Result<UserAccount, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO users (username, is_active, is_staff, is_superuser)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(&user.username)
        .bind(i64::from(user.is_active))
        .bind(i64::from(user.is_staff))
        .bind(i64::from(user.is_superuser))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = user_id_from_i64(res.last_insert_rowid())?;
        Ok(user.into_account(id))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, username, is_active, is_staff, is_superuser
            FROM users WHERE id = ?1
            ",
        )
        .bind(id_to_i64("user_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_user_row).transpose()
    }

    async fn list_participants(&self) -> Result<Vec<UserAccount>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, username, is_active, is_staff, is_superuser
            FROM users
            WHERE is_active = 0
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_user_row).collect()
    }
}
