//! Referrer and user-agent classification for page views

use serde::{Deserialize, Serialize};

use crate::models::{PageViewSource, SourceCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficSource {
    Direct,
    OrganicSearch,
    SocialMedia,
    Referral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

const SEARCH_MARKERS: [&str; 5] = ["google", "bing", "yahoo", "duckduckgo", "search"];
const SOCIAL_MARKERS: [&str; 8] = [
    "facebook",
    "twitter",
    "linkedin",
    "instagram",
    "tiktok",
    "reddit",
    "youtube",
    "pinterest",
];

impl TrafficSource {
    pub const ALL: [TrafficSource; 4] = [
        TrafficSource::Direct,
        TrafficSource::OrganicSearch,
        TrafficSource::SocialMedia,
        TrafficSource::Referral,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TrafficSource::Direct => "Direct",
            TrafficSource::OrganicSearch => "Organic Search",
            TrafficSource::SocialMedia => "Social Media",
            TrafficSource::Referral => "Referral",
        }
    }
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [DeviceType::Desktop, DeviceType::Mobile, DeviceType::Tablet];

    pub fn label(self) -> &'static str {
        match self {
            DeviceType::Desktop => "Desktop",
            DeviceType::Mobile => "Mobile",
            DeviceType::Tablet => "Tablet",
        }
    }
}

pub fn categorize_traffic_source(referrer: Option<&str>) -> TrafficSource {
    let referrer = match referrer.map(str::trim) {
        None | Some("") => return TrafficSource::Direct,
        Some(r) if r.eq_ignore_ascii_case("direct") => return TrafficSource::Direct,
        Some(r) => r.to_lowercase(),
    };

    if SEARCH_MARKERS.iter().any(|marker| referrer.contains(marker)) {
        TrafficSource::OrganicSearch
    } else if SOCIAL_MARKERS.iter().any(|marker| referrer.contains(marker)) {
        TrafficSource::SocialMedia
    } else {
        TrafficSource::Referral
    }
}

/// Tablets are checked first since many tablet agents also say "mobile".
pub fn detect_device(user_agent: Option<&str>) -> DeviceType {
    let Some(ua) = user_agent.map(str::to_lowercase) else {
        return DeviceType::Desktop;
    };

    let is_tablet = ua.contains("ipad")
        || ua.contains("tablet")
        || ua.contains("kindle")
        || (ua.contains("android") && !ua.contains("mobile"));
    if is_tablet {
        return DeviceType::Tablet;
    }

    let is_mobile = ["mobile", "iphone", "ipod", "android", "blackberry", "windows phone"]
        .iter()
        .any(|marker| ua.contains(marker));
    if is_mobile {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

/// Count page views per traffic source, omitting empty sources
pub fn tally_traffic_sources(views: &[PageViewSource]) -> Vec<SourceCount> {
    let mut counts = [0u64; 4];
    for view in views {
        let source = categorize_traffic_source(view.referrer.as_deref());
        counts[source as usize] += 1;
    }
    non_empty(TrafficSource::ALL.iter().map(|s| s.label()).zip(counts))
}

/// Count page views per device type, omitting empty types
pub fn tally_devices(views: &[PageViewSource]) -> Vec<SourceCount> {
    let mut counts = [0u64; 3];
    for view in views {
        let device = detect_device(view.user_agent.as_deref());
        counts[device as usize] += 1;
    }
    non_empty(DeviceType::ALL.iter().map(|d| d.label()).zip(counts))
}

fn non_empty<'a>(counts: impl Iterator<Item = (&'a str, u64)>) -> Vec<SourceCount> {
    counts
        .filter(|(_, value)| *value > 0)
        .map(|(name, value)| SourceCount {
            name: name.to_string(),
            value,
        })
        .collect()
}
