//! Page Snapshots
//!
//! Point-in-time description of the page and the device it runs on.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use aho_corasick::AhoCorasick;
use serde::Serialize;
use url::Url;

use crate::host::{Environment, Geolocation, Host, Viewport};

/// User-agent indicators, in priority order
const DEVICE_PATTERNS: &[(&str, DeviceType)] = &[
    ("Mobi", DeviceType::Mobile),
    ("Tablet", DeviceType::Tablet),
];

static DEVICE_MATCHER: OnceLock<AhoCorasick> = OnceLock::new();

fn device_matcher() -> &'static AhoCorasick {
    DEVICE_MATCHER.get_or_init(|| {
        AhoCorasick::new(DEVICE_PATTERNS.iter().map(|(p, _)| p))
            .expect("Failed to build user-agent matcher")
    })
}

/// Coarse device class derived from the user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// Where the visitor came from, when it was another site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferrerDetails {
    pub url: String,
    /// `button` query parameter of the referring URL
    pub button: Option<String>,
}

/// Page and environment state at one moment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub referrer: String,
    /// Outgoing URL; empty until the page unloads
    pub next_page: String,
    /// Page clock at capture, in milliseconds
    pub start_time: f64,
    pub user_agent: String,
    pub language: String,
    pub screen_resolution: String,
    pub window_size: String,
    pub color_depth: u32,
    pub java_enabled: bool,
    pub cookies_enabled: bool,
    pub timezone: Option<String>,
    pub platform: String,
    pub online_status: bool,
    pub battery_level: Option<f64>,
    pub geolocation: Option<Geolocation>,
    pub device_type: DeviceType,
    pub orientation: Orientation,
    pub touch_support: bool,
    pub referrer_details: Option<ReferrerDetails>,
    pub query_params: BTreeMap<String, String>,
}

/// Capture a snapshot from a live host
pub fn capture(host: &dyn Host) -> PageSnapshot {
    build_snapshot(&host.environment(), host.now())
}

/// Build a snapshot from environment reads taken at page time `now`
///
/// Battery level and geolocation are always `None` here; they are filled in
/// later by the page session.
pub fn build_snapshot(env: &Environment, now: f64) -> PageSnapshot {
    PageSnapshot {
        url: env.href.clone(),
        referrer: env.referrer.clone(),
        next_page: String::new(),
        start_time: now,
        user_agent: env.user_agent.clone(),
        language: env.language.clone(),
        screen_resolution: format!("{}x{}", env.screen.width, env.screen.height),
        window_size: format!("{}x{}", env.viewport.width, env.viewport.height),
        color_depth: env.screen.color_depth,
        java_enabled: env.java_enabled,
        cookies_enabled: env.cookies_enabled,
        timezone: env.timezone.clone(),
        platform: env.platform.clone(),
        online_status: env.online,
        battery_level: None,
        geolocation: None,
        device_type: device_type(&env.user_agent),
        orientation: orientation(env.viewport),
        touch_support: touch_support(env),
        referrer_details: referrer_details(&env.referrer, &env.href),
        query_params: url_parameters(&env.href),
    }
}

/// Classify a user agent; mobile wins over tablet wherever they appear.
///
/// Modern iPads report a desktop Safari agent and classify as desktop.
pub fn device_type(user_agent: &str) -> DeviceType {
    device_matcher()
        .find_overlapping_iter(user_agent)
        .map(|m| m.pattern().as_usize())
        .min()
        .map(|index| DEVICE_PATTERNS[index].1)
        .unwrap_or(DeviceType::Desktop)
}

/// Landscape only when strictly wider than tall
pub fn orientation(viewport: Viewport) -> Orientation {
    if viewport.width > viewport.height {
        Orientation::Landscape
    } else {
        Orientation::Portrait
    }
}

pub fn touch_support(env: &Environment) -> bool {
    env.touch_start || env.max_touch_points > 0
}

/// Query parameters of `url`; repeated keys keep their last value
pub fn url_parameters(url: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    if let Ok(parsed) = Url::parse(url) {
        for (key, value) in parsed.query_pairs() {
            params.insert(key.into_owned(), value.into_owned());
        }
    }
    params
}

/// Details of a cross-site referrer, `None` for same-site or no referrer
pub fn referrer_details(referrer: &str, current: &str) -> Option<ReferrerDetails> {
    if referrer.is_empty() || is_same_domain(referrer, current) {
        return None;
    }
    Some(ReferrerDetails {
        url: referrer.to_string(),
        button: button_clicked(referrer),
    })
}

/// Hostname equality; scheme and port are not compared
pub fn is_same_domain(a: &str, b: &str) -> bool {
    hostname(a) == hostname(b)
}

fn hostname(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

fn button_clicked(referrer: &str) -> Option<String> {
    let parsed = Url::parse(referrer).ok()?;
    let (_, value) = parsed.query_pairs().find(|(key, _)| key == "button")?;
    (!value.is_empty()).then(|| value.into_owned())
}
