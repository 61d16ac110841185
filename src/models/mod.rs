pub mod category;
pub mod live;
pub mod metric;
pub mod range;
pub mod tracking;

pub use category::{
    country_shares, find_template, template_shares, template_title, CategoryShare, CountryShare,
    TemplateInfo, COUNTRY_SHARES, TEMPLATE_CATALOG,
};
pub use live::{
    DownloadRecord, Engagement, LiveCounters, LiveData, PageViewSource, RecentDownload,
    SessionStats, SourceCount,
};
pub use metric::MonthlyMetric;
pub use range::{DateRange, RangeParseError};
pub use tracking::{SessionRequest, PageView, Session, TrackTemplateRequest};
