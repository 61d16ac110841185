//! Report export for the dashboard view
//!
//! An export captures the current snapshot, renders it into pages on the
//! blocking pool and hands back an artifact named after the export date.
//! Only one export runs at a time, and none starts while live data is
//! still loading.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::analytics::Dashboard;
use crate::live::DashboardView;
use crate::models::DateRange;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("an export is already in progress")]
    InProgress,
    #[error("live data is still loading")]
    PendingFetch,
    #[error("failed to render report: {0}")]
    Render(#[source] anyhow::Error),
}

/// Holds the export slot; releasing happens on drop
#[derive(Debug)]
pub struct ExportGuard {
    flag: Arc<AtomicBool>,
}

impl ExportGuard {
    pub fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, ExportError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ExportError::InProgress)?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPage {
    /// 1-based
    pub number: usize,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub file_name: String,
    pub generated_at: DateTime<Utc>,
    pub range: DateRange,
    pub pages: Vec<ReportPage>,
}

/// Turns a dashboard into printable pages. Runs on the blocking pool.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, dashboard: &Dashboard) -> Result<Vec<ReportPage>>;
}

/// Plain-text renderer that splits the report into fixed-height pages
#[derive(Debug, Clone)]
pub struct TextReportRenderer {
    pub lines_per_page: usize,
}

impl Default for TextReportRenderer {
    fn default() -> Self {
        Self { lines_per_page: 40 }
    }
}

impl TextReportRenderer {
    fn report_lines(dashboard: &Dashboard) -> Vec<String> {
        let mut lines = vec![
            "Portfolio Analytics Report".to_string(),
            format!("Range: {}", dashboard.range_label),
            format!(
                "Generated: {}",
                dashboard.generated_at.format("%Y-%m-%d %H:%M UTC")
            ),
        ];
        if !dashboard.live_available {
            lines.push("Live data unavailable; figures show the baseline only".to_string());
        }

        let totals = &dashboard.totals;
        lines.push(String::new());
        lines.push("Summary".to_string());
        lines.push(format!("  Visitors: {}", totals.visitors));
        lines.push(format!("  Template clicks: {}", totals.clicks));
        lines.push(format!("  Downloads: {}", totals.downloads));
        lines.push(format!("  Live sessions: {}", totals.sessions));
        lines.push(format!("  Repeat visitors: {}", totals.repeat_visitors));
        lines.push(format!(
            "  Avg. session: {}m {}s",
            totals.avg_session_seconds / 60,
            totals.avg_session_seconds % 60
        ));

        lines.push(String::new());
        lines.push("Monthly".to_string());
        for month in &dashboard.months {
            lines.push(format!(
                "  {:<9} visitors {:>7}  clicks {:>7}  downloads {:>7}",
                month.month, month.visitors, month.clicks, month.downloads
            ));
        }

        lines.push(String::new());
        lines.push("Visitors by country".to_string());
        for country in &dashboard.countries {
            lines.push(format!(
                "  {:<14} {:>7} ({:.0}%)",
                country.name, country.value, country.percentage
            ));
        }

        lines.push(String::new());
        lines.push("Templates".to_string());
        for template in &dashboard.templates {
            lines.push(format!(
                "  {:<32} downloads {:>6}  clicks {:>6}  {:.1}%",
                template.title, template.downloads, template.clicks, template.share
            ));
        }
        if let Some(top) = &dashboard.top_template {
            lines.push(format!("  Top template: {}", top.title));
        }

        let engagement = &dashboard.engagement;
        lines.push(String::new());
        lines.push("Engagement".to_string());
        lines.push(format!("  Page views: {}", engagement.page_views));
        lines.push(format!("  Bounce rate: {:.2}%", engagement.bounce_rate));
        lines.push(format!("  Active users: {}", engagement.active_users));
        for source in &engagement.traffic_sources {
            lines.push(format!("  Source {}: {}", source.name, source.value));
        }
        for device in &engagement.devices {
            lines.push(format!("  Device {}: {}", device.name, device.value));
        }

        if !dashboard.recent_downloads.is_empty() {
            lines.push(String::new());
            lines.push("Recent downloads".to_string());
            for download in &dashboard.recent_downloads {
                lines.push(format!(
                    "  {} {}",
                    download.downloaded_at.format("%Y-%m-%d %H:%M"),
                    download.title
                ));
            }
        }

        lines
    }
}

impl ReportRenderer for TextReportRenderer {
    fn render(&self, dashboard: &Dashboard) -> Result<Vec<ReportPage>> {
        if self.lines_per_page == 0 {
            bail!("lines per page must be positive");
        }

        let pages = Self::report_lines(dashboard)
            .chunks(self.lines_per_page)
            .enumerate()
            .map(|(index, chunk)| ReportPage {
                number: index + 1,
                lines: chunk.to_vec(),
            })
            .collect();
        Ok(pages)
    }
}

pub fn artifact_file_name(date: NaiveDate) -> String {
    format!("analytics-report-{}.json", date.format("%Y-%m-%d"))
}

/// Render the view's current snapshot.
///
/// The export slot is held until rendering finishes, whether it succeeds
/// or fails.
pub async fn export_dashboard(
    view: &DashboardView,
    renderer: Arc<dyn ReportRenderer>,
) -> Result<ExportArtifact, ExportError> {
    let (_guard, snapshot) = view.begin_export()?;
    let dashboard = snapshot.dashboard;
    let range = dashboard.range;
    let generated_at = Utc::now();

    let pages = tokio::task::spawn_blocking(move || renderer.render(&dashboard))
        .await
        .map_err(|e| ExportError::Render(e.into()))
        .and_then(|rendered| rendered.map_err(ExportError::Render))
        .inspect_err(|e| error!(error = %e, "Report export failed"))?;

    info!(%range, pages = pages.len(), "Report exported");

    Ok(ExportArtifact {
        file_name: artifact_file_name(generated_at.date_naive()),
        generated_at,
        range,
        pages,
    })
}

/// Write the artifact into `dir`, replacing any file with the same name.
///
/// The JSON goes to a temporary file first so a failed write never leaves
/// a truncated report behind.
pub async fn write_artifact(artifact: &ExportArtifact, dir: &Path) -> Result<PathBuf> {
    let body = serde_json::to_vec_pretty(artifact)?;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let target = dir.join(&artifact.file_name);
    let partial = dir.join(format!(".{}.partial", artifact.file_name));

    if let Err(e) = tokio::fs::write(&partial, &body).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e).with_context(|| format!("failed to write {}", partial.display()));
    }
    if let Err(e) = tokio::fs::rename(&partial, &target).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e).with_context(|| format!("failed to move report into {}", target.display()));
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{compose_dashboard, BaselineSet, BaselineTargets};
    use crate::live::LiveSource;
    use crate::models::LiveData;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct StaticSource;

    #[async_trait]
    impl LiveSource for StaticSource {
        async fn fetch(&self, _range: DateRange) -> LiveData {
            LiveData {
                available: true,
                ..LiveData::default()
            }
        }
    }

    struct BrokenRenderer;

    impl ReportRenderer for BrokenRenderer {
        fn render(&self, _dashboard: &Dashboard) -> Result<Vec<ReportPage>> {
            bail!("out of paper")
        }
    }

    fn baseline() -> Arc<BaselineSet> {
        Arc::new(BaselineSet::generate(
            BaselineTargets::default(),
            Utc::now(),
            &mut StdRng::seed_from_u64(11),
        ))
    }

    fn dashboard() -> Dashboard {
        compose_dashboard(&baseline(), DateRange::All, &LiveData::unavailable(), Utc::now())
    }

    #[test]
    fn test_artifact_file_name() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(artifact_file_name(date), "analytics-report-2026-03-07.json");
    }

    #[test]
    fn test_text_renderer_paginates() {
        let dashboard = dashboard();
        let single = TextReportRenderer { lines_per_page: 1000 }
            .render(&dashboard)
            .unwrap();
        let paged = TextReportRenderer { lines_per_page: 10 }
            .render(&dashboard)
            .unwrap();

        assert_eq!(single.len(), 1);
        assert_eq!(single[0].lines[0], "Portfolio Analytics Report");
        assert!(single[0]
            .lines
            .iter()
            .any(|line| line.contains("baseline only")));

        let total_lines = single[0].lines.len();
        assert_eq!(paged.len(), total_lines.div_ceil(10));
        assert_eq!(paged.last().map(|p| p.number), Some(paged.len()));
        assert!(paged.iter().all(|page| page.lines.len() <= 10));
    }

    #[test]
    fn test_text_renderer_rejects_zero_height() {
        let renderer = TextReportRenderer { lines_per_page: 0 };
        assert!(renderer.render(&dashboard()).is_err());
    }

    #[tokio::test]
    async fn test_export_dashboard_releases_slot() {
        let view = DashboardView::spawn(
            baseline(),
            Arc::new(StaticSource),
            DateRange::Days(90),
            None,
        );
        view.wait_until_settled().await.unwrap();

        let artifact = export_dashboard(&view, Arc::new(TextReportRenderer::default()))
            .await
            .unwrap();

        assert_eq!(artifact.range, DateRange::Days(90));
        assert_eq!(
            artifact.file_name,
            artifact_file_name(artifact.generated_at.date_naive())
        );
        assert!(!artifact.pages.is_empty());
        assert!(!view.is_exporting());
    }

    #[tokio::test]
    async fn test_failed_render_releases_slot() {
        let view = DashboardView::spawn(baseline(), Arc::new(StaticSource), DateRange::All, None);
        view.wait_until_settled().await.unwrap();

        let result = export_dashboard(&view, Arc::new(BrokenRenderer)).await;

        assert!(matches!(result, Err(ExportError::Render(_))));
        assert!(!view.is_exporting());
    }

    #[tokio::test]
    async fn test_write_artifact_replaces_atomically() {
        let dir = std::env::temp_dir().join(format!("folio-export-{}", std::process::id()));
        let artifact = ExportArtifact {
            file_name: artifact_file_name(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()),
            generated_at: Utc::now(),
            range: DateRange::Days(7),
            pages: vec![ReportPage {
                number: 1,
                lines: vec!["hello".to_string()],
            }],
        };

        let path = write_artifact(&artifact, &dir).await.unwrap();
        let path_again = write_artifact(&artifact, &dir).await.unwrap();
        assert_eq!(path, path_again);

        let stored: ExportArtifact =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(stored, artifact);
        assert!(!dir.join(".analytics-report-2026-01-02.json.partial").exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_rename_removes_partial_file() {
        let dir = std::env::temp_dir().join(format!("folio-export-blocked-{}", std::process::id()));
        let artifact = ExportArtifact {
            file_name: artifact_file_name(NaiveDate::from_ymd_opt(2026, 4, 5).unwrap()),
            generated_at: Utc::now(),
            range: DateRange::All,
            pages: vec![],
        };
        // A non-empty directory where the report should go blocks the rename
        let blocker = dir.join(&artifact.file_name);
        tokio::fs::create_dir_all(&blocker).await.unwrap();
        tokio::fs::write(blocker.join("keep"), b"x").await.unwrap();

        assert!(write_artifact(&artifact, &dir).await.is_err());
        assert!(!dir.join(".analytics-report-2026-04-05.json.partial").exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
