//! Live counts from the tracking backend and the dashboard view that blends
//! them with the baseline year
//!
//! The view is an actor: range changes, refreshes and fetch results are
//! serialized through one command channel, and each fetch carries a
//! sequence number so a slow response for an old range can never overwrite
//! a newer one.

pub mod fetcher;
pub mod view;

pub use fetcher::{
    bounce_rate, LiveFetcher, LiveSource, ACTIVE_WINDOW_SECS, RECENT_DOWNLOADS_LIMIT,
};
pub use view::{DashboardView, ViewClosed, ViewSnapshot};
