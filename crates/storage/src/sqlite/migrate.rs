use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL CHECK (is_active IN (0, 1)),
            is_staff INTEGER NOT NULL CHECK (is_staff IN (0, 1)),
            is_superuser INTEGER NOT NULL CHECK (is_superuser IN (0, 1))
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_profiles (
            user_id INTEGER PRIMARY KEY,
            research_group TEXT NOT NULL CHECK (length(research_group) = 1),
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS hierarchies (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            base_url TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS sections (
            id INTEGER PRIMARY KEY,
            hierarchy_id INTEGER NOT NULL,
            parent_id INTEGER,
            slug TEXT NOT NULL,
            label TEXT NOT NULL,
            ordinal INTEGER NOT NULL CHECK (ordinal >= 0),
            FOREIGN KEY (hierarchy_id) REFERENCES hierarchies(id) ON DELETE CASCADE,
            FOREIGN KEY (parent_id) REFERENCES sections(id) ON DELETE CASCADE,
            UNIQUE (parent_id, slug)
        );
    ",
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sections_single_root
            ON sections(hierarchy_id) WHERE parent_id IS NULL;
    ",
    r"
        CREATE TABLE IF NOT EXISTS page_blocks (
            id INTEGER PRIMARY KEY,
            section_id INTEGER NOT NULL,
            ordinal INTEGER NOT NULL CHECK (ordinal >= 0),
            block_type TEXT NOT NULL,
            css_extra TEXT NOT NULL DEFAULT '',
            payload TEXT NOT NULL,
            FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_page_blocks_section_ordinal
            ON page_blocks(section_id, ordinal);
    ",
    r"
        CREATE TABLE IF NOT EXISTS page_visits (
            user_id INTEGER NOT NULL,
            section_id INTEGER NOT NULL,
            first_visit TEXT NOT NULL,
            last_visit TEXT NOT NULL,
            PRIMARY KEY (user_id, section_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_video_views (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            video_id TEXT NOT NULL CHECK (length(video_id) BETWEEN 1 AND 256),
            video_duration INTEGER NOT NULL DEFAULT 0,
            seconds_viewed INTEGER NOT NULL DEFAULT 0,
            UNIQUE (user_id, video_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_submissions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            block_id INTEGER NOT NULL,
            submitted_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (block_id) REFERENCES page_blocks(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_submissions_user
            ON quiz_submissions(user_id, block_id);
    ",
];

/// Runs versioned migrations recorded in `schema_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;
        for statement in SCHEMA_V1.iter().copied() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    }

    Ok(())
}
