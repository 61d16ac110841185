use crate::models::{DownloadRecord, PageView, PageViewSource, Session, SessionStats};
use crate::storage::ChangeEvent;
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Backend holding the tracking tables.
///
/// Range-bounded reads take `since` as a Unix timestamp; `None` reads
/// everything. All timestamps are Unix seconds.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Append one download row for a template
    async fn record_download(&self, template_id: &str, at: i64) -> Result<()>;

    /// Append one preview click row for a template
    async fn record_click(&self, template_id: &str, at: i64) -> Result<()>;

    /// Store a page view and create or extend its session
    async fn track_page_view(&self, view: &PageView, at: i64) -> Result<Session>;

    /// Mark a session as ended
    async fn end_session(&self, session_id: &str, at: i64) -> StorageResult<()>;

    /// Record a heartbeat for an open page; last activity never moves backwards
    async fn touch_session(&self, session_id: &str, at: i64) -> StorageResult<()>;

    /// Delete tracking rows older than `before`, returning how many were removed
    async fn prune_before(&self, before: i64) -> Result<u64>;

    /// Download counts grouped by template id
    async fn downloads_by_template(&self, since: Option<i64>) -> Result<Vec<(String, i64)>>;

    /// Click counts grouped by template id
    async fn clicks_by_template(&self, since: Option<i64>) -> Result<Vec<(String, i64)>>;

    /// Session counts grouped by country, sessions without a country excluded.
    /// Use [`Storage::session_stats`] for the full session count.
    async fn sessions_by_country(&self, since: Option<i64>) -> Result<Vec<(String, i64)>>;

    /// Timestamps of every download in range
    async fn download_times(&self, since: Option<i64>) -> Result<Vec<i64>>;

    /// Most recent downloads in range, newest first
    async fn recent_downloads(
        &self,
        since: Option<i64>,
        limit: i64,
    ) -> Result<Vec<DownloadRecord>>;

    /// Referrer and user agent of every page view in range
    async fn page_view_sources(&self, since: Option<i64>) -> Result<Vec<PageViewSource>>;

    /// Session, bounce and active-session counts.
    /// Active means last activity at or after `active_since` and not ended.
    async fn session_stats(&self, since: Option<i64>, active_since: i64) -> Result<SessionStats>;

    /// Change notifications for table writes, if this backend publishes them
    fn subscribe(&self) -> Option<broadcast::Receiver<ChangeEvent>> {
        None
    }
}

/// Lower bound used in `>=` filters when no range applies
pub(crate) fn lower_bound(since: Option<i64>) -> i64 {
    since.unwrap_or(i64::MIN)
}
