//! Host Surfaces
//!
//! Everything the tracker reads from its surroundings: location, navigator,
//! screen, viewport, the live DOM and the async device capabilities. A real
//! embedding implements [`Host`] over the browser; [`StaticHost`] is an
//! in-memory host for tests and demos.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;

use crate::dom::Document;
use crate::error::{Error, Result};

/// Physical screen (`window.screen`)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
}

/// Layout viewport (`window.innerWidth` / `innerHeight`)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Point-in-time reads of the browser environment
///
/// Optional fields model capabilities a browser may not expose.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// `location.href`
    pub href: String,
    /// `document.referrer` (empty when there is none)
    pub referrer: String,
    pub user_agent: String,
    pub language: String,
    pub platform: String,
    pub screen: Screen,
    pub viewport: Viewport,
    /// `(scrollX, scrollY)`
    pub scroll: (f64, f64),
    pub java_enabled: bool,
    pub cookies_enabled: bool,
    pub online: bool,
    /// IANA timezone, if `Intl` resolves one
    pub timezone: Option<String>,
    /// `'ontouchstart' in window`
    pub touch_start: bool,
    /// `navigator.maxTouchPoints`
    pub max_touch_points: u32,
    /// `document.hidden`
    pub hidden: bool,
}

impl Environment {
    /// A typical desktop Chrome environment on `href`
    pub fn desktop(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
                .to_string(),
            language: "en-US".to_string(),
            platform: "MacIntel".to_string(),
            screen: Screen {
                width: 2560,
                height: 1440,
                color_depth: 24,
            },
            viewport: Viewport {
                width: 1920,
                height: 1080,
            },
            cookies_enabled: true,
            online: true,
            timezone: Some("UTC".to_string()),
            ..Default::default()
        }
    }
}

/// Coordinates from the geolocation capability
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// The document and environment a tracker is attached to
#[async_trait]
pub trait Host: Send + Sync {
    /// Read the environment as it is right now
    fn environment(&self) -> Environment;

    /// The live DOM
    fn document(&self) -> Arc<Document>;

    /// Monotonic page clock in milliseconds (`performance.now()`)
    fn now(&self) -> f64;

    /// Battery charge in `0.0..=1.0`, `None` when the battery API is absent
    async fn battery_level(&self) -> Option<f64> {
        None
    }

    /// Current position; `None` when the geolocation API is absent
    async fn geolocation(&self) -> Option<Result<Geolocation>> {
        None
    }
}

/// In-memory [`Host`] whose state is set directly
pub struct StaticHost {
    environment: RwLock<Environment>,
    document: RwLock<Arc<Document>>,
    origin: Instant,
    battery: RwLock<Option<f64>>,
    geolocation: RwLock<Option<std::result::Result<Geolocation, String>>>,
}

impl StaticHost {
    /// Create a host with an empty document
    pub fn new(environment: Environment) -> Self {
        Self {
            environment: RwLock::new(environment),
            document: RwLock::new(Arc::new(Document::new())),
            origin: Instant::now(),
            battery: RwLock::new(None),
            geolocation: RwLock::new(None),
        }
    }

    /// Builder-style document setter
    pub fn with_document(self, document: Document) -> Self {
        self.set_document(document);
        self
    }

    /// Replace the live DOM
    pub fn set_document(&self, document: Document) {
        *self.document.write() = Arc::new(document);
    }

    /// Mutate the environment in place (navigate, resize, scroll, ...)
    pub fn update_environment(&self, f: impl FnOnce(&mut Environment)) {
        f(&mut *self.environment.write());
    }

    /// Expose a battery API reporting `level`
    pub fn set_battery_level(&self, level: f64) {
        *self.battery.write() = Some(level);
    }

    /// Expose a geolocation API that resolves to `position` or fails with a message
    pub fn set_geolocation(&self, position: std::result::Result<Geolocation, String>) {
        *self.geolocation.write() = Some(position);
    }
}

#[async_trait]
impl Host for StaticHost {
    fn environment(&self) -> Environment {
        self.environment.read().clone()
    }

    fn document(&self) -> Arc<Document> {
        self.document.read().clone()
    }

    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    async fn battery_level(&self) -> Option<f64> {
        *self.battery.read()
    }

    async fn geolocation(&self) -> Option<Result<Geolocation>> {
        self.geolocation
            .read()
            .clone()
            .map(|r| r.map_err(|message| Error::capability("geolocation", message)))
    }
}
