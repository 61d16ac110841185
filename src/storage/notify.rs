use crate::models::{DownloadRecord, PageView, PageViewSource, Session, SessionStats};
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Tracking table a change happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Downloads,
    Clicks,
    Sessions,
    PageViews,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Downloads,
        Table::Clicks,
        Table::Sessions,
        Table::PageViews,
    ];

    /// Name of the backing SQL table
    pub fn table_name(self) -> &'static str {
        match self {
            Table::Downloads => "template_downloads",
            Table::Clicks => "template_clicks",
            Table::Sessions => "sessions",
            Table::PageViews => "page_views",
        }
    }

    fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.table_name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind) -> Self {
        Self { table, kind }
    }

    /// Parse a `<sql table>:<operation>` payload, e.g. `sessions:update`
    pub fn from_payload(payload: &str) -> Option<Self> {
        let (table, operation) = payload.split_once(':')?;
        let kind = match operation.to_ascii_lowercase().as_str() {
            "insert" => ChangeKind::Insert,
            "update" => ChangeKind::Update,
            "delete" => ChangeKind::Delete,
            _ => return None,
        };
        Some(Self::new(Table::from_table_name(table)?, kind))
    }
}

/// Storage wrapper that publishes a [`ChangeEvent`] after every successful write
pub struct NotifyingStorage {
    /// Underlying storage implementation
    inner: Arc<dyn Storage>,
    /// Change feed; sends with no subscribers are dropped
    changes: broadcast::Sender<ChangeEvent>,
}

impl NotifyingStorage {
    pub fn new(inner: Arc<dyn Storage>, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self { inner, changes }
    }

    fn publish(&self, table: Table, kind: ChangeKind) {
        // Err only means nobody is listening right now
        if self.changes.send(ChangeEvent::new(table, kind)).is_err() {
            tracing::trace!(?table, ?kind, "change event had no subscribers");
        }
    }
}

#[async_trait]
impl Storage for NotifyingStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn record_download(&self, template_id: &str, at: i64) -> Result<()> {
        self.inner.record_download(template_id, at).await?;
        self.publish(Table::Downloads, ChangeKind::Insert);
        Ok(())
    }

    async fn record_click(&self, template_id: &str, at: i64) -> Result<()> {
        self.inner.record_click(template_id, at).await?;
        self.publish(Table::Clicks, ChangeKind::Insert);
        Ok(())
    }

    async fn track_page_view(&self, view: &PageView, at: i64) -> Result<Session> {
        let session = self.inner.track_page_view(view, at).await?;
        let kind = if session.page_count > 1 {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        self.publish(Table::Sessions, kind);
        self.publish(Table::PageViews, ChangeKind::Insert);
        Ok(session)
    }

    async fn end_session(&self, session_id: &str, at: i64) -> StorageResult<()> {
        self.inner.end_session(session_id, at).await?;
        self.publish(Table::Sessions, ChangeKind::Update);
        Ok(())
    }

    async fn touch_session(&self, session_id: &str, at: i64) -> StorageResult<()> {
        self.inner.touch_session(session_id, at).await?;
        self.publish(Table::Sessions, ChangeKind::Update);
        Ok(())
    }

    async fn prune_before(&self, before: i64) -> Result<u64> {
        let removed = self.inner.prune_before(before).await?;
        if removed > 0 {
            for table in Table::ALL {
                self.publish(table, ChangeKind::Delete);
            }
        }
        Ok(removed)
    }

    async fn downloads_by_template(&self, since: Option<i64>) -> Result<Vec<(String, i64)>> {
        self.inner.downloads_by_template(since).await
    }

    async fn clicks_by_template(&self, since: Option<i64>) -> Result<Vec<(String, i64)>> {
        self.inner.clicks_by_template(since).await
    }

    async fn sessions_by_country(&self, since: Option<i64>) -> Result<Vec<(String, i64)>> {
        self.inner.sessions_by_country(since).await
    }

    async fn download_times(&self, since: Option<i64>) -> Result<Vec<i64>> {
        self.inner.download_times(since).await
    }

    async fn recent_downloads(
        &self,
        since: Option<i64>,
        limit: i64,
    ) -> Result<Vec<DownloadRecord>> {
        self.inner.recent_downloads(since, limit).await
    }

    async fn page_view_sources(&self, since: Option<i64>) -> Result<Vec<PageViewSource>> {
        self.inner.page_view_sources(since).await
    }

    async fn session_stats(&self, since: Option<i64>, active_since: i64) -> Result<SessionStats> {
        self.inner.session_stats(since, active_since).await
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ChangeEvent>> {
        Some(self.changes.subscribe())
    }
}
