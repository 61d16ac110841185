//! Test doubles for the storage trait

use crate::models::{DownloadRecord, PageView, PageViewSource, Session, SessionStats};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Backend that is always unreachable
pub(crate) struct FailingStorage;

fn unavailable<T>() -> Result<T> {
    Err(anyhow!("backend unavailable"))
}

#[async_trait]
impl Storage for FailingStorage {
    async fn init(&self) -> Result<()> {
        unavailable()
    }

    async fn record_download(&self, _template_id: &str, _at: i64) -> Result<()> {
        unavailable()
    }

    async fn record_click(&self, _template_id: &str, _at: i64) -> Result<()> {
        unavailable()
    }

    async fn track_page_view(&self, _view: &PageView, _at: i64) -> Result<Session> {
        unavailable()
    }

    async fn end_session(&self, _session_id: &str, _at: i64) -> StorageResult<()> {
        Err(StorageError::Other(anyhow!("backend unavailable")))
    }

    async fn touch_session(&self, _session_id: &str, _at: i64) -> StorageResult<()> {
        Err(StorageError::Other(anyhow!("backend unavailable")))
    }

    async fn prune_before(&self, _before: i64) -> Result<u64> {
        unavailable()
    }

    async fn downloads_by_template(&self, _since: Option<i64>) -> Result<Vec<(String, i64)>> {
        unavailable()
    }

    async fn clicks_by_template(&self, _since: Option<i64>) -> Result<Vec<(String, i64)>> {
        unavailable()
    }

    async fn sessions_by_country(&self, _since: Option<i64>) -> Result<Vec<(String, i64)>> {
        unavailable()
    }

    async fn download_times(&self, _since: Option<i64>) -> Result<Vec<i64>> {
        unavailable()
    }

    async fn recent_downloads(
        &self,
        _since: Option<i64>,
        _limit: i64,
    ) -> Result<Vec<DownloadRecord>> {
        unavailable()
    }

    async fn page_view_sources(&self, _since: Option<i64>) -> Result<Vec<PageViewSource>> {
        unavailable()
    }

    async fn session_stats(&self, _since: Option<i64>, _active_since: i64) -> Result<SessionStats> {
        unavailable()
    }
}
