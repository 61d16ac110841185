use crate::models::{DownloadRecord, PageView, PageViewSource, Session, SessionStats};
use crate::storage::trait_def::lower_bound;
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn grouped_counts(&self, sql: &str, since: Option<i64>) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(sql)
            .bind(lower_bound(since))
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS template_downloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                template_id TEXT NOT NULL,
                downloaded_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_downloads_at ON template_downloads(downloaded_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS template_clicks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                template_id TEXT NOT NULL,
                clicked_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_clicks_at ON template_clicks(clicked_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                first_page TEXT NOT NULL,
                country TEXT,
                page_count INTEGER NOT NULL DEFAULT 1,
                is_bounce INTEGER NOT NULL DEFAULT 1,
                started_at INTEGER NOT NULL,
                last_activity_at INTEGER NOT NULL,
                ended_at INTEGER
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS page_views (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                page_url TEXT NOT NULL,
                referrer TEXT,
                user_agent TEXT,
                country TEXT,
                viewed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_page_views_at ON page_views(viewed_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn record_download(&self, template_id: &str, at: i64) -> Result<()> {
        sqlx::query("INSERT INTO template_downloads (template_id, downloaded_at) VALUES (?, ?)")
            .bind(template_id)
            .bind(at)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn record_click(&self, template_id: &str, at: i64) -> Result<()> {
        sqlx::query("INSERT INTO template_clicks (template_id, clicked_at) VALUES (?, ?)")
            .bind(template_id)
            .bind(at)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn track_page_view(&self, view: &PageView, at: i64) -> Result<Session> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sessions
                (session_id, first_page, country, page_count, is_bounce,
                 started_at, last_activity_at)
            VALUES (?, ?, ?, 1, 1, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                page_count = sessions.page_count + 1,
                is_bounce = 0,
                last_activity_at = excluded.last_activity_at,
                country = COALESCE(sessions.country, excluded.country)
            "#,
        )
        .bind(&view.session_id)
        .bind(&view.page_url)
        .bind(&view.country)
        .bind(at)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO page_views (session_id, page_url, referrer, user_agent, country, viewed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&view.session_id)
        .bind(&view.page_url)
        .bind(&view.referrer)
        .bind(&view.user_agent)
        .bind(&view.country)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT session_id, first_page, country, page_count, is_bounce,
                   started_at, last_activity_at, ended_at
            FROM sessions
            WHERE session_id = ?
            "#,
        )
        .bind(&view.session_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn end_session(&self, session_id: &str, at: i64) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE sessions SET ended_at = ?, last_activity_at = ? WHERE session_id = ?",
        )
        .bind(at)
        .bind(at)
        .bind(session_id)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn touch_session(&self, session_id: &str, at: i64) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE sessions SET last_activity_at = MAX(last_activity_at, ?) WHERE session_id = ?",
        )
        .bind(at)
        .bind(session_id)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn prune_before(&self, before: i64) -> Result<u64> {
        let statements = [
            "DELETE FROM template_downloads WHERE downloaded_at < ?",
            "DELETE FROM template_clicks WHERE clicked_at < ?",
            "DELETE FROM page_views WHERE viewed_at < ?",
            "DELETE FROM sessions WHERE last_activity_at < ?",
        ];

        let mut removed = 0;
        for sql in statements {
            let result = sqlx::query(sql)
                .bind(before)
                .execute(self.pool.as_ref())
                .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    async fn downloads_by_template(&self, since: Option<i64>) -> Result<Vec<(String, i64)>> {
        self.grouped_counts(
            r#"
            SELECT template_id, COUNT(*) FROM template_downloads
            WHERE downloaded_at >= ?
            GROUP BY template_id
            ORDER BY template_id
            "#,
            since,
        )
        .await
    }

    async fn clicks_by_template(&self, since: Option<i64>) -> Result<Vec<(String, i64)>> {
        self.grouped_counts(
            r#"
            SELECT template_id, COUNT(*) FROM template_clicks
            WHERE clicked_at >= ?
            GROUP BY template_id
            ORDER BY template_id
            "#,
            since,
        )
        .await
    }

    async fn sessions_by_country(&self, since: Option<i64>) -> Result<Vec<(String, i64)>> {
        self.grouped_counts(
            r#"
            SELECT country, COUNT(*) FROM sessions
            WHERE started_at >= ? AND country IS NOT NULL
            GROUP BY country
            ORDER BY country
            "#,
            since,
        )
        .await
    }

    async fn download_times(&self, since: Option<i64>) -> Result<Vec<i64>> {
        let times = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT downloaded_at FROM template_downloads
            WHERE downloaded_at >= ?
            ORDER BY downloaded_at
            "#,
        )
        .bind(lower_bound(since))
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(times)
    }

    async fn recent_downloads(
        &self,
        since: Option<i64>,
        limit: i64,
    ) -> Result<Vec<DownloadRecord>> {
        let records = sqlx::query_as::<_, DownloadRecord>(
            r#"
            SELECT template_id, downloaded_at FROM template_downloads
            WHERE downloaded_at >= ?
            ORDER BY downloaded_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(lower_bound(since))
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(records)
    }

    async fn page_view_sources(&self, since: Option<i64>) -> Result<Vec<PageViewSource>> {
        let sources = sqlx::query_as::<_, PageViewSource>(
            "SELECT referrer, user_agent FROM page_views WHERE viewed_at >= ?",
        )
        .bind(lower_bound(since))
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(sources)
    }

    async fn session_stats(&self, since: Option<i64>, active_since: i64) -> Result<SessionStats> {
        let (sessions, bounces) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_bounce THEN 1 ELSE 0 END), 0)
            FROM sessions
            WHERE started_at >= ?
            "#,
        )
        .bind(lower_bound(since))
        .fetch_one(self.pool.as_ref())
        .await?;

        let active = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sessions WHERE last_activity_at >= ? AND ended_at IS NULL",
        )
        .bind(active_since)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(SessionStats {
            sessions,
            bounces,
            active,
        })
    }
}
