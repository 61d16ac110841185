use crate::models::{DownloadRecord, PageView, PageViewSource, Session, SessionStats};
use crate::storage::trait_def::lower_bound;
use crate::storage::{ChangeEvent, Storage, StorageError, StorageResult, Table};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// `NOTIFY` channel the tracking table triggers publish on
pub const CHANGE_CHANNEL: &str = "folio_changes";

pub struct PostgresStorage {
    pool: Arc<PgPool>,
    changes: Option<ChangeFeed>,
}

/// Relay from `LISTEN` to an in-process broadcast channel
struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
    relay: JoinHandle<()>,
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
            changes: None,
        })
    }

    /// Listen for table changes made by any connection, this process or not.
    ///
    /// Events are raised by the triggers `init` installs, so a `folio-admin`
    /// seed or prune reaches a running server's dashboard view.
    pub async fn with_change_feed(mut self, capacity: usize) -> Result<Self> {
        let mut listener = PgListener::connect_with(self.pool.as_ref()).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        info!(channel = CHANGE_CHANNEL, "Listening for table changes");

        let (sender, _) = broadcast::channel(capacity.max(1));
        let relay = tokio::spawn(relay_changes(listener, sender.clone()));
        self.changes = Some(ChangeFeed { sender, relay });
        Ok(self)
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
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS template_downloads (
                id BIGSERIAL PRIMARY KEY,
                template_id TEXT NOT NULL,
                downloaded_at BIGINT NOT NULL
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
                id BIGSERIAL PRIMARY KEY,
                template_id TEXT NOT NULL,
                clicked_at BIGINT NOT NULL
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
                page_count BIGINT NOT NULL DEFAULT 1,
                is_bounce BOOLEAN NOT NULL DEFAULT TRUE,
                started_at BIGINT NOT NULL,
                last_activity_at BIGINT NOT NULL,
                ended_at BIGINT
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
                id BIGSERIAL PRIMARY KEY,
                session_id TEXT NOT NULL,
                page_url TEXT NOT NULL,
                referrer TEXT,
                user_agent TEXT,
                country TEXT,
                viewed_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_page_views_at ON page_views(viewed_at)")
            .execute(self.pool.as_ref())
            .await?;

        let notify_function = format!(
            r#"
            CREATE OR REPLACE FUNCTION folio_notify_change() RETURNS trigger AS $$
            BEGIN
                PERFORM pg_notify(
                    '{CHANGE_CHANNEL}',
                    TG_TABLE_NAME || ':' || lower(TG_OP)
                );
                RETURN NULL;
            END;
            $$ LANGUAGE plpgsql
            "#
        );
        sqlx::query(&notify_function)
            .execute(self.pool.as_ref())
            .await?;

        // One notification per statement, so a bulk prune stays cheap
        for table in Table::ALL.map(Table::table_name) {
            sqlx::query(&format!("DROP TRIGGER IF EXISTS {table}_notify ON {table}"))
                .execute(self.pool.as_ref())
                .await?;
            sqlx::query(&format!(
                r#"
                CREATE TRIGGER {table}_notify
                AFTER INSERT OR UPDATE OR DELETE ON {table}
                FOR EACH STATEMENT EXECUTE FUNCTION folio_notify_change()
                "#
            ))
            .execute(self.pool.as_ref())
            .await?;
        }

        Ok(())
    }

    async fn record_download(&self, template_id: &str, at: i64) -> Result<()> {
        sqlx::query("INSERT INTO template_downloads (template_id, downloaded_at) VALUES ($1, $2)")
            .bind(template_id)
            .bind(at)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn record_click(&self, template_id: &str, at: i64) -> Result<()> {
        sqlx::query("INSERT INTO template_clicks (template_id, clicked_at) VALUES ($1, $2)")
            .bind(template_id)
            .bind(at)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn track_page_view(&self, view: &PageView, at: i64) -> Result<Session> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions
                (session_id, first_page, country, page_count, is_bounce,
                 started_at, last_activity_at)
            VALUES ($1, $2, $3, 1, TRUE, $4, $4)
            ON CONFLICT (session_id) DO UPDATE SET
                page_count = sessions.page_count + 1,
                is_bounce = FALSE,
                last_activity_at = EXCLUDED.last_activity_at,
                country = COALESCE(sessions.country, EXCLUDED.country)
            RETURNING session_id, first_page, country, page_count, is_bounce,
                      started_at, last_activity_at, ended_at
            "#,
        )
        .bind(&view.session_id)
        .bind(&view.page_url)
        .bind(&view.country)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO page_views (session_id, page_url, referrer, user_agent, country, viewed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
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

        tx.commit().await?;
        Ok(session)
    }

    async fn end_session(&self, session_id: &str, at: i64) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE sessions SET ended_at = $1, last_activity_at = $1 WHERE session_id = $2",
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

    async fn touch_session(&self, session_id: &str, at: i64) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET last_activity_at = GREATEST(last_activity_at, $1)
            WHERE session_id = $2
            "#,
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
            "DELETE FROM template_downloads WHERE downloaded_at < $1",
            "DELETE FROM template_clicks WHERE clicked_at < $1",
            "DELETE FROM page_views WHERE viewed_at < $1",
            "DELETE FROM sessions WHERE last_activity_at < $1",
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
            WHERE downloaded_at >= $1
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
            WHERE clicked_at >= $1
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
            WHERE started_at >= $1 AND country IS NOT NULL
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
            WHERE downloaded_at >= $1
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
            WHERE downloaded_at >= $1
            ORDER BY downloaded_at DESC, id DESC
            LIMIT $2
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
            "SELECT referrer, user_agent FROM page_views WHERE viewed_at >= $1",
        )
        .bind(lower_bound(since))
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(sources)
    }

    async fn session_stats(&self, since: Option<i64>, active_since: i64) -> Result<SessionStats> {
        let (sessions, bounces, active) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE started_at >= $1),
                COUNT(*) FILTER (WHERE started_at >= $1 AND is_bounce),
                COUNT(*) FILTER (WHERE last_activity_at >= $2 AND ended_at IS NULL)
            FROM sessions
            "#,
        )
        .bind(lower_bound(since))
        .bind(active_since)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(SessionStats {
            sessions,
            bounces,
            active,
        })
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ChangeEvent>> {
        self.changes.as_ref().map(|feed| feed.sender.subscribe())
    }
}

async fn relay_changes(mut listener: PgListener, changes: broadcast::Sender<ChangeEvent>) {
    loop {
        match listener.recv().await {
            Ok(notification) => match ChangeEvent::from_payload(notification.payload()) {
                Some(event) => {
                    if changes.send(event).is_err() {
                        debug!(?event, "change event had no subscribers");
                    }
                }
                None => warn!(
                    payload = notification.payload(),
                    "Ignoring unrecognized change notification"
                ),
            },
            Err(e) => {
                // recv reconnects on the next call
                warn!(error = %e, "Change listener lost its connection");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
