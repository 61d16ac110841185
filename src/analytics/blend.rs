//! Blending of baseline distributions with live counts
//!
//! Baseline totals are spread over the fixed country and template sets, then
//! live counts are added on top and percentages recomputed. Live keys that no
//! category knows about are ignored: live data can reinforce the fixed
//! categories but never add rows.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::analytics::Totals;
use crate::models::{CountryShare, LiveCounters, TemplateInfo};

/// One category after blending
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlendedCategory {
    pub name: String,
    pub baseline_value: u64,
    pub live_value: u64,
    /// `baseline_value + live_value`
    pub value: u64,
    /// Whole-number share of the combined values
    pub percentage: f64,
}

/// Per-template figures after blending
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateStat {
    pub id: String,
    pub title: String,
    pub baseline_downloads: u64,
    pub live_downloads: u64,
    pub downloads: u64,
    pub baseline_clicks: u64,
    pub live_clicks: u64,
    pub clicks: u64,
    /// Share of all template downloads, in percent
    pub share: f64,
}

/// -1, 0 or +1 depending on how many months the range covers
pub fn seasonal_variation(month_count: usize) -> f64 {
    (month_count % 3) as f64 - 1.0
}

/// Distribute `total_visitors` over the country set and blend in live sessions.
///
/// When every combined value is zero the static percentages are returned.
pub fn blend_countries(
    countries: &[CountryShare],
    month_count: usize,
    total_visitors: u64,
    live_sessions: &BTreeMap<String, u64>,
) -> Vec<BlendedCategory> {
    let variation = seasonal_variation(month_count);
    let perturbed: Vec<f64> = countries
        .iter()
        .map(|country| (country.percentage + variation * country.variation_weight).max(0.0))
        .collect();
    let perturbed_sum: f64 = perturbed.iter().sum();

    let mut blended: Vec<BlendedCategory> = countries
        .iter()
        .zip(&perturbed)
        .map(|(country, &percentage)| {
            let normalized = if perturbed_sum > 0.0 {
                percentage / perturbed_sum * 100.0
            } else {
                country.percentage
            };
            let baseline_value = (total_visitors as f64 * normalized / 100.0).round() as u64;
            let live_value = live_sessions.get(country.name).copied().unwrap_or(0);

            BlendedCategory {
                name: country.name.to_string(),
                baseline_value,
                live_value,
                value: baseline_value + live_value,
                percentage: country.percentage,
            }
        })
        .collect();

    let combined_total: u64 = blended.iter().map(|category| category.value).sum();
    if combined_total > 0 {
        for category in &mut blended {
            category.percentage =
                (category.value as f64 / combined_total as f64 * 100.0).round();
        }
    }

    blended
}

/// Split baseline downloads and clicks over the catalog and add live counts.
pub fn blend_templates(
    catalog: &[TemplateInfo],
    totals: &Totals,
    live: &LiveCounters,
) -> Vec<TemplateStat> {
    let mut stats: Vec<TemplateStat> = catalog
        .iter()
        .map(|template| {
            let baseline_downloads = portion(totals.downloads, template.share);
            let baseline_clicks = portion(totals.clicks, template.share);
            let live_downloads = count_for(&live.downloads_by_template, template.id);
            let live_clicks = count_for(&live.clicks_by_template, template.id);

            TemplateStat {
                id: template.id.to_string(),
                title: template.title.to_string(),
                baseline_downloads,
                live_downloads,
                downloads: baseline_downloads + live_downloads,
                baseline_clicks,
                live_clicks,
                clicks: baseline_clicks + live_clicks,
                share: template.share,
            }
        })
        .collect();

    let all_downloads: u64 = stats.iter().map(|stat| stat.downloads).sum();
    if all_downloads > 0 {
        for stat in &mut stats {
            stat.share = 100.0 * stat.downloads as f64 / all_downloads as f64;
        }
    }

    stats
}

/// Template with the most combined downloads; the earliest wins a tie.
pub fn top_template(stats: &[TemplateStat]) -> Option<&TemplateStat> {
    stats.iter().fold(None, |best, stat| match best {
        Some(current) if current.downloads >= stat.downloads => Some(current),
        _ => Some(stat),
    })
}

fn portion(total: u64, share: f64) -> u64 {
    (total as f64 * share / 100.0).round() as u64
}

fn count_for(counts: &BTreeMap<String, u64>, key: &str) -> u64 {
    counts.get(key).copied().unwrap_or(0)
}
