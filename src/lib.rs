//! # Clickstream
//!
//! Page-view and interaction capture for browser documents.
//!
//! A [`Tracker`] attaches to a document through two seams: a [`Host`] that
//! exposes the environment, the live DOM and the async device capabilities,
//! and an [`EventSource`] that delivers document events. Every captured
//! event becomes a [`Record`] that is logged and posted to the collector
//! without waiting for the result.
//!
//! ## Features
//!
//! - **Page snapshots** - URL, referrer, screen, viewport, device class,
//!   query parameters, battery and geolocation
//! - **Element descriptions** - tag, attributes, `data-*`, geometry, CSS path
//! - **Rate limiting** - throttled mousemove and scroll, plus a debounce helper
//! - **Fire-and-forget transport** - JSON POST, failures logged and dropped
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clickstream::{Environment, EventBus, StaticHost, Tracker, TrackerConfig};
//!
//! #[tokio::main]
//! async fn main() -> clickstream::Result<()> {
//!     let host = Arc::new(StaticHost::new(Environment::desktop("https://example.com/")));
//!     let bus = EventBus::new();
//!
//!     let config = TrackerConfig::default().with_endpoint("https://collect.example.com");
//!     let tracker = Tracker::with_http(host, config)?;
//!     tracker.attach(&bus);
//!     tracker.capture_capabilities();
//!     Ok(())
//! }
//! ```

use std::time::Duration;

pub mod dom;
pub mod element;
pub mod error;
pub mod events;
pub mod host;
pub mod limiter;
pub mod record;
pub mod snapshot;
pub mod tracker;
pub mod transport;

// Re-exports
pub use dom::{Document, Layout, NodeId};
pub use element::{css_path, describe, ElementDescription};
pub use error::{Error, Result};
pub use events::{DomEvent, EventBus, EventKind, EventSource, Listener};
pub use host::{Environment, Geolocation, Host, Screen, StaticHost, Viewport};
pub use limiter::{Debounce, Throttle};
pub use record::{EventPayload, EventRecord, Interaction, NavigationRecord, Record};
pub use snapshot::{DeviceType, Orientation, PageSnapshot, ReferrerDetails};
pub use tracker::{PageSession, Tracker};
pub use transport::{Dispatcher, HttpTransport, MemoryTransport, SentRequest, Transport};

/// Configuration for a tracker
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Collector base URL (None = the page's own origin)
    pub endpoint: Option<String>,
    /// Path for navigation records
    pub navigation_path: String,
    /// Path for event records
    pub events_path: String,
    /// Minimum spacing of recorded mousemove events
    pub mousemove_throttle: Duration,
    /// Minimum spacing of recorded scroll events
    pub scroll_throttle: Duration,
    /// Characters of element text kept
    pub text_limit: usize,
    /// Query the battery API at start
    pub capture_battery: bool,
    /// Query the geolocation API at start
    pub capture_geolocation: bool,
    /// HTTP request timeout (None = no timeout)
    pub request_timeout: Option<Duration>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            navigation_path: "/api/navigation".to_string(),
            events_path: "/api/events".to_string(),
            mousemove_throttle: Duration::from_millis(1000),
            scroll_throttle: Duration::from_millis(1000),
            text_limit: element::TEXT_LIMIT,
            capture_battery: true,
            capture_geolocation: true,
            request_timeout: None,
        }
    }
}

impl TrackerConfig {
    /// No capability queries; only page and interaction data
    pub fn offline() -> Self {
        Self {
            capture_battery: false,
            capture_geolocation: false,
            ..Default::default()
        }
    }

    /// Send to `endpoint` instead of the page origin
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}
