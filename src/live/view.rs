use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analytics::{compose_dashboard, BaselineSet, Dashboard};
use crate::export::{ExportError, ExportGuard};
use crate::live::LiveSource;
use crate::models::{DateRange, LiveData};
use crate::storage::ChangeEvent;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("dashboard view has shut down")]
pub struct ViewClosed;

/// What observers of the view see; always a whole, consistent dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    /// Sequence number of the latest fetch issued
    pub issued: u64,
    /// Sequence number of the fetch the dashboard reflects, 0 before the first
    pub applied: u64,
    /// A fetch newer than `applied` is in flight
    pub pending: bool,
    pub dashboard: Dashboard,
}

/// Message types for the view actor
enum ViewCommand {
    /// Switch range and fetch for it; replies with the fetch sequence
    SetRange {
        range: DateRange,
        ack: oneshot::Sender<u64>,
    },
    /// Re-fetch the current range
    Refresh { ack: Option<oneshot::Sender<u64>> },
    /// A spawned fetch finished
    FetchCompleted { sequence: u64, data: LiveData },
    Shutdown,
}

/// Owns the current range, the sequence counter and the live data.
///
/// All state changes happen on this task, so there is no locking.
struct ViewActor {
    receiver: mpsc::Receiver<ViewCommand>,
    /// Handed to fetch tasks; does not keep the channel open
    loopback: mpsc::WeakSender<ViewCommand>,
    baseline: Arc<BaselineSet>,
    source: Arc<dyn LiveSource>,
    range: DateRange,
    issued: u64,
    applied: u64,
    live: LiveData,
    publisher: watch::Sender<ViewSnapshot>,
}

impl ViewActor {
    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            match command {
                ViewCommand::SetRange { range, ack } => {
                    if range != self.range {
                        debug!(from = %self.range, to = %range, "Dashboard range changed");
                        self.range = range;
                        // Old-range counts must not be blended into the new range
                        self.live = LiveData::unavailable();
                    }
                    let sequence = self.issue_fetch();
                    let _ = ack.send(sequence);
                }
                ViewCommand::Refresh { ack } => {
                    let sequence = self.issue_fetch();
                    if let Some(ack) = ack {
                        let _ = ack.send(sequence);
                    }
                }
                ViewCommand::FetchCompleted { sequence, data } => {
                    if sequence != self.issued {
                        debug!(sequence, latest = self.issued, "Discarding stale live data");
                        continue;
                    }
                    self.live = data;
                    self.applied = sequence;
                    self.publish();
                }
                ViewCommand::Shutdown => {
                    info!("Dashboard view received shutdown signal");
                    break;
                }
            }
        }
        debug!("Dashboard view stopped");
    }

    /// Spawn a fetch for the current range tagged with a fresh sequence number
    fn issue_fetch(&mut self) -> u64 {
        self.issued += 1;
        let sequence = self.issued;
        let range = self.range;
        let source = Arc::clone(&self.source);
        let loopback = self.loopback.clone();

        tokio::spawn(async move {
            let data = source.fetch(range).await;
            // The view is gone when the upgrade fails; the result is dropped
            if let Some(commands) = loopback.upgrade() {
                let _ = commands
                    .send(ViewCommand::FetchCompleted { sequence, data })
                    .await;
            }
        });

        self.publish();
        sequence
    }

    fn publish(&self) {
        let dashboard = compose_dashboard(&self.baseline, self.range, &self.live, Utc::now());
        self.publisher.send_replace(ViewSnapshot {
            issued: self.issued,
            applied: self.applied,
            pending: self.applied < self.issued,
            dashboard,
        });
    }
}

/// Handle to a running dashboard view.
///
/// Dropping the handle stops the actor and the change forwarder; fetches
/// still in flight finish and are discarded.
pub struct DashboardView {
    commands: mpsc::Sender<ViewCommand>,
    snapshots: watch::Receiver<ViewSnapshot>,
    exporting: Arc<AtomicBool>,
    forwarder: Option<JoinHandle<()>>,
}

impl DashboardView {
    /// Start the view and its first fetch. Must be called inside a Tokio runtime.
    ///
    /// When `changes` is given, every change notification (and every gap
    /// after the feed lagged) triggers a refresh of the current range.
    pub fn spawn(
        baseline: Arc<BaselineSet>,
        source: Arc<dyn LiveSource>,
        range: DateRange,
        changes: Option<broadcast::Receiver<ChangeEvent>>,
    ) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let live = LiveData::unavailable();
        let initial = ViewSnapshot {
            issued: 0,
            applied: 0,
            pending: false,
            dashboard: compose_dashboard(&baseline, range, &live, Utc::now()),
        };
        let (publisher, snapshots) = watch::channel(initial);

        let mut actor = ViewActor {
            receiver,
            loopback: commands.downgrade(),
            baseline,
            source,
            range,
            issued: 0,
            applied: 0,
            live,
            publisher,
        };
        // First fetch is issued before anyone can observe the view
        actor.issue_fetch();

        tokio::spawn(async move {
            actor.run().await;
        });

        let forwarder =
            changes.map(|changes| spawn_change_forwarder(changes, commands.downgrade()));

        info!(%range, "Dashboard view started");

        Self {
            commands,
            snapshots,
            exporting: Arc::new(AtomicBool::new(false)),
            forwarder,
        }
    }

    /// Switch the range, returning the sequence number of the fetch it issued
    pub async fn set_range(&self, range: DateRange) -> Result<u64, ViewClosed> {
        let (ack, reply) = oneshot::channel();
        self.commands
            .send(ViewCommand::SetRange { range, ack })
            .await
            .map_err(|_| ViewClosed)?;
        reply.await.map_err(|_| ViewClosed)
    }

    /// Re-fetch the current range, returning the new sequence number
    pub async fn refresh(&self) -> Result<u64, ViewClosed> {
        let (ack, reply) = oneshot::channel();
        self.commands
            .send(ViewCommand::Refresh { ack: Some(ack) })
            .await
            .map_err(|_| ViewClosed)?;
        reply.await.map_err(|_| ViewClosed)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> ViewSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until the fetch numbered `sequence` (or a later one) is applied
    pub async fn wait_for_sequence(&self, sequence: u64) -> Result<ViewSnapshot, ViewClosed> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| snapshot.applied >= sequence)
            .await
            .map_err(|_| ViewClosed)?;
        Ok(snapshot.clone())
    }

    /// Wait until no fetch is in flight
    pub async fn wait_until_settled(&self) -> Result<ViewSnapshot, ViewClosed> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| !snapshot.pending)
            .await
            .map_err(|_| ViewClosed)?;
        Ok(snapshot.clone())
    }

    /// Claim the export slot along with the snapshot to export.
    ///
    /// Refused while another export runs or while live data is loading.
    /// The returned snapshot is the one that was checked, so a range change
    /// landing afterwards cannot slip a pending dashboard into the export.
    pub fn begin_export(&self) -> Result<(ExportGuard, ViewSnapshot), ExportError> {
        let guard = ExportGuard::acquire(&self.exporting)?;
        let snapshot = self.snapshots.borrow().clone();
        if snapshot.pending {
            return Err(ExportError::PendingFetch);
        }
        Ok((guard, snapshot))
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting.load(Ordering::Acquire)
    }

    /// Stop the actor; later calls on this handle return [`ViewClosed`]
    pub async fn shutdown(&self) {
        if let Some(forwarder) = &self.forwarder {
            forwarder.abort();
        }
        if self.commands.send(ViewCommand::Shutdown).await.is_err() {
            warn!("Dashboard view already stopped");
        }
    }
}

impl Drop for DashboardView {
    fn drop(&mut self) {
        if let Some(forwarder) = &self.forwarder {
            forwarder.abort();
        }
    }
}

fn spawn_change_forwarder(
    mut changes: broadcast::Receiver<ChangeEvent>,
    commands: mpsc::WeakSender<ViewCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(event) => {
                    debug!(table = ?event.table, kind = ?event.kind, "Change notification")
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "Change feed lagged, refreshing");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }

            let Some(commands) = commands.upgrade() else {
                break;
            };
            if commands
                .send(ViewCommand::Refresh { ack: None })
                .await
                .is_err()
            {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::BaselineTargets;
    use crate::live::LiveFetcher;
    use crate::models::LiveCounters;
    use crate::storage::testing::FailingStorage;
    use crate::storage::{ChangeKind, Table};
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Answers each range with a fixed download count after a fixed delay
    struct ScriptedSource {
        script: HashMap<DateRange, (u64, u64)>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: &[(DateRange, u64, u64)]) -> Arc<Self> {
            Arc::new(Self {
                script: script
                    .iter()
                    .map(|&(range, delay_ms, downloads)| (range, (delay_ms, downloads)))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LiveSource for ScriptedSource {
        async fn fetch(&self, range: DateRange) -> LiveData {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay_ms, downloads) = self.script.get(&range).copied().unwrap_or((0, 0));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            LiveData {
                counters: LiveCounters::from_rows(
                    vec![("2".to_string(), downloads as i64)],
                    vec![],
                    vec![],
                ),
                available: true,
                ..LiveData::default()
            }
        }
    }

    fn baseline() -> Arc<BaselineSet> {
        Arc::new(BaselineSet::generate(
            BaselineTargets::default(),
            Utc::now(),
            &mut StdRng::seed_from_u64(3),
        ))
    }

    fn live_downloads(snapshot: &ViewSnapshot) -> u64 {
        snapshot.dashboard.templates[0].live_downloads
    }

    #[tokio::test]
    async fn test_first_fetch_is_applied() {
        let source = ScriptedSource::new(&[(DateRange::All, 0, 5)]);
        let view = DashboardView::spawn(baseline(), source, DateRange::All, None);

        let snapshot = view.wait_until_settled().await.unwrap();
        assert_eq!(snapshot.applied, 1);
        assert!(snapshot.dashboard.live_available);
        assert_eq!(live_downloads(&snapshot), 5);
        assert_eq!(snapshot.dashboard.totals.downloads, 50_005);
    }

    #[tokio::test]
    async fn test_stale_fetch_is_discarded() {
        let source = ScriptedSource::new(&[
            (DateRange::Days(30), 10, 30),
            (DateRange::Days(7), 300, 7),
        ]);
        let view = DashboardView::spawn(baseline(), source, DateRange::Days(30), None);
        view.wait_until_settled().await.unwrap();

        // Slow fetch for 7 days, then a fast one for 30 days
        let slow = view.set_range(DateRange::Days(7)).await.unwrap();
        let fast = view.set_range(DateRange::Days(30)).await.unwrap();
        assert!(fast > slow);

        let snapshot = view.wait_for_sequence(fast).await.unwrap();
        assert_eq!(snapshot.dashboard.range, DateRange::Days(30));
        assert_eq!(live_downloads(&snapshot), 30);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let snapshot = view.snapshot();
        assert_eq!(snapshot.applied, fast);
        assert_eq!(snapshot.dashboard.range, DateRange::Days(30));
        assert_eq!(live_downloads(&snapshot), 30);
    }

    #[tokio::test]
    async fn test_range_change_clears_old_live_data() {
        let source = ScriptedSource::new(&[(DateRange::All, 0, 9), (DateRange::Days(7), 300, 1)]);
        let view = DashboardView::spawn(baseline(), source, DateRange::All, None);
        view.wait_until_settled().await.unwrap();

        view.set_range(DateRange::Days(7)).await.unwrap();
        let snapshot = view.snapshot();

        assert!(snapshot.pending);
        assert_eq!(snapshot.dashboard.range, DateRange::Days(7));
        assert!(!snapshot.dashboard.live_available);
        assert_eq!(live_downloads(&snapshot), 0);
    }

    #[tokio::test]
    async fn test_change_notification_triggers_refresh() {
        let source = ScriptedSource::new(&[(DateRange::All, 0, 1)]);
        let (changes, receiver) = broadcast::channel(8);
        let view = DashboardView::spawn(
            baseline(),
            Arc::clone(&source) as Arc<dyn LiveSource>,
            DateRange::All,
            Some(receiver),
        );
        view.wait_until_settled().await.unwrap();
        assert_eq!(source.calls(), 1);

        changes
            .send(ChangeEvent::new(Table::Downloads, ChangeKind::Insert))
            .unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(2), view.wait_for_sequence(2))
            .await
            .expect("refresh was not triggered")
            .unwrap();
        assert_eq!(snapshot.applied, 2);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_backend_failure_shows_baseline() {
        let fetcher = Arc::new(LiveFetcher::new(Arc::new(FailingStorage)));
        let view = DashboardView::spawn(baseline(), fetcher, DateRange::All, None);

        let snapshot = view.wait_until_settled().await.unwrap();
        assert_eq!(snapshot.applied, 1);
        assert!(!snapshot.dashboard.live_available);
        assert_eq!(snapshot.dashboard.totals.downloads, 50_000);
        assert_eq!(snapshot.dashboard.totals.visitors, 120_000);
    }

    #[tokio::test]
    async fn test_export_refused_while_pending_or_busy() {
        let source = ScriptedSource::new(&[(DateRange::All, 200, 1)]);
        let view = DashboardView::spawn(baseline(), source, DateRange::All, None);

        assert!(matches!(view.begin_export(), Err(ExportError::PendingFetch)));
        assert!(!view.is_exporting());

        view.wait_until_settled().await.unwrap();
        let (guard, _) = view.begin_export().unwrap();
        assert!(view.is_exporting());
        assert!(matches!(view.begin_export(), Err(ExportError::InProgress)));

        drop(guard);
        assert!(!view.is_exporting());
        assert!(view.begin_export().is_ok());
    }

    #[tokio::test]
    async fn test_export_keeps_checked_snapshot() {
        let source = ScriptedSource::new(&[(DateRange::All, 0, 1), (DateRange::Days(7), 200, 2)]);
        let view = DashboardView::spawn(baseline(), source, DateRange::All, None);
        view.wait_until_settled().await.unwrap();

        let (_guard, captured) = view.begin_export().unwrap();
        view.set_range(DateRange::Days(7)).await.unwrap();

        assert!(view.snapshot().pending);
        assert!(!captured.pending);
        assert_eq!(captured.dashboard.range, DateRange::All);
        assert_eq!(captured.dashboard.totals.downloads, 50_001);
    }

    #[tokio::test]
    async fn test_shutdown_closes_view() {
        let source = ScriptedSource::new(&[(DateRange::All, 0, 1)]);
        let view = DashboardView::spawn(baseline(), source, DateRange::All, None);
        view.wait_until_settled().await.unwrap();

        view.shutdown().await;

        assert_eq!(view.refresh().await, Err(ViewClosed));
        assert_eq!(view.wait_for_sequence(10).await, Err(ViewClosed));
    }
}
