//! Dashboard analytics
//!
//! Combines a synthetic year of baseline traffic with live counts read from
//! the backend. Everything here is pure computation over values passed in;
//! fetching lives in [`crate::live`].

pub mod baseline;
pub mod blend;
pub mod dashboard;
pub mod range;
pub mod series;
pub mod totals;
pub mod traffic;

pub use baseline::{BaselineSet, BaselineTargets};
pub use blend::{blend_countries, blend_templates, top_template, BlendedCategory, TemplateStat};
pub use dashboard::{compose_dashboard, CombinedTotals, Dashboard};
pub use range::filter_by_range;
pub use series::{daily_downloads, DailyPoint};
pub use totals::{aggregate_totals, Totals};
pub use traffic::{
    categorize_traffic_source, detect_device, tally_devices, tally_traffic_sources, DeviceType,
    TrafficSource,
};
