//! Page Tracker
//!
//! Wires the host, the event source and the transport together: one
//! listener per event type, a page session captured at load, and the async
//! capability queries that fill it in later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::element::describe;
use crate::error::Result;
use crate::events::{DomEvent, EventKind, EventSource, Listener};
use crate::host::{Environment, Host};
use crate::limiter::Throttle;
use crate::record::{EventRecord, Interaction, NavigationRecord, Record};
use crate::snapshot::{self, build_snapshot, PageSnapshot};
use crate::transport::{Dispatcher, HttpTransport, Transport};
use crate::TrackerConfig;

/// Page-scoped state shared by every listener.
///
/// Holds the snapshot taken at load. Async capability results are written
/// into it through [`PageSession::update`]; event records see them only if
/// the write landed before the event fired.
pub struct PageSession {
    load: RwLock<PageSnapshot>,
    left: AtomicBool,
}

impl PageSession {
    pub fn new(load: PageSnapshot) -> Self {
        Self {
            load: RwLock::new(load),
            left: AtomicBool::new(false),
        }
    }

    /// Copy of the load snapshot with any capability data gathered so far
    pub fn snapshot(&self) -> PageSnapshot {
        self.load.read().clone()
    }

    /// Apply a change to the load snapshot
    pub fn update(&self, f: impl FnOnce(&mut PageSnapshot)) {
        f(&mut *self.load.write());
    }

    /// Copy battery and geolocation data into a fresh snapshot
    pub fn overlay(&self, fresh: &mut PageSnapshot) {
        let load = self.load.read();
        fresh.battery_level = load.battery_level;
        fresh.geolocation = load.geolocation;
    }

    /// Close the session. Only the first call yields a record.
    pub fn leave(&self, next_page: &str, now: f64) -> Option<NavigationRecord> {
        if self.left.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(NavigationRecord::leave(self.snapshot(), next_page, now))
    }

    pub fn has_left(&self) -> bool {
        self.left.load(Ordering::SeqCst)
    }
}

struct Inner {
    host: Arc<dyn Host>,
    session: PageSession,
    dispatcher: Dispatcher,
    config: TrackerConfig,
}

/// Interaction tracker for one page load
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Inner>,
}

impl Tracker {
    /// Capture the load snapshot; no listeners are attached yet
    pub fn new(host: Arc<dyn Host>, transport: Arc<dyn Transport>, config: TrackerConfig) -> Self {
        let session = PageSession::new(snapshot::capture(host.as_ref()));
        let dispatcher = Dispatcher::new(transport, &config);
        Self {
            inner: Arc::new(Inner {
                host,
                session,
                dispatcher,
                config,
            }),
        }
    }

    /// Tracker posting over HTTP to the configured endpoint or the page origin
    pub fn with_http(host: Arc<dyn Host>, config: TrackerConfig) -> Result<Self> {
        let transport = HttpTransport::for_page(&config, &host.environment().href)?;
        Ok(Self::new(host, Arc::new(transport), config))
    }

    /// Document-ready entry point: capture, attach every listener and start
    /// the capability queries.
    pub fn start(
        host: Arc<dyn Host>,
        transport: Arc<dyn Transport>,
        config: TrackerConfig,
        source: &dyn EventSource,
    ) -> Self {
        let tracker = Self::new(host, transport, config);
        tracker.attach(source);
        tracker.capture_capabilities();
        tracing::info!(url = %tracker.inner.session.snapshot().url, "Tracking page");
        tracker
    }

    pub fn session(&self) -> &PageSession {
        &self.inner.session
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Register one listener per tracked event type on `source`
    pub fn attach(&self, source: &dyn EventSource) {
        for kind in EventKind::INTERACTIONS {
            if kind == EventKind::Mousemove {
                continue;
            }
            let tracker = self.clone();
            source.add_listener(
                kind,
                Arc::new(move |event: &DomEvent| {
                    tracker.handle_event(event);
                }),
            );
        }

        source.add_listener(
            EventKind::Mousemove,
            self.throttled(self.inner.config.mousemove_throttle, |tracker, event| {
                tracker.handle_event(event);
            }),
        );
        source.add_listener(
            EventKind::Scroll,
            self.throttled(self.inner.config.scroll_throttle, |tracker, _| {
                tracker.handle_scroll();
            }),
        );

        let tracker = self.clone();
        source.add_listener(
            EventKind::VisibilityChange,
            Arc::new(move |_: &DomEvent| {
                tracker.handle_visibility_change();
            }),
        );
        let tracker = self.clone();
        source.add_listener(
            EventKind::OrientationChange,
            Arc::new(move |_: &DomEvent| {
                tracker.handle_orientation_change();
            }),
        );
        let tracker = self.clone();
        source.add_listener(
            EventKind::BeforeUnload,
            Arc::new(move |_: &DomEvent| {
                tracker.handle_unload();
            }),
        );
    }

    fn throttled(
        &self,
        window: std::time::Duration,
        handler: fn(&Tracker, &DomEvent),
    ) -> Listener {
        let tracker = self.clone();
        let throttle = Throttle::new(window, move |event: &DomEvent| handler(&tracker, event));
        Arc::new(move |event: &DomEvent| {
            if !throttle.call(event) {
                tracing::debug!(kind = %event.kind, "Throttled");
            }
        })
    }

    /// Query battery and geolocation in the background and store the results
    /// in the session.
    pub fn capture_capabilities(&self) -> Vec<JoinHandle<()>> {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No async runtime; skipping capability queries");
            return Vec::new();
        };
        let mut tasks = Vec::new();

        if self.inner.config.capture_battery {
            let inner = self.inner.clone();
            tasks.push(runtime.spawn(async move {
                if let Some(level) = inner.host.battery_level().await {
                    inner.session.update(|page| page.battery_level = Some(level));
                    tracing::debug!(level, "Battery level captured");
                }
            }));
        }

        if self.inner.config.capture_geolocation {
            let inner = self.inner.clone();
            tasks.push(runtime.spawn(async move {
                match inner.host.geolocation().await {
                    Some(Ok(position)) => {
                        inner.session.update(|page| page.geolocation = Some(position));
                        tracing::debug!("Geolocation captured");
                    }
                    Some(Err(e)) => tracing::error!("Error capturing geolocation: {}", e),
                    None => {}
                }
            }));
        }

        tasks
    }

    /// Fresh snapshot of the page right now, with session capability data
    pub fn page_details(&self) -> PageSnapshot {
        self.page_details_from(&self.inner.host.environment())
    }

    fn page_details_from(&self, env: &Environment) -> PageSnapshot {
        let mut page = build_snapshot(env, self.inner.host.now());
        self.inner.session.overlay(&mut page);
        page
    }

    /// Build the record for an interaction event.
    ///
    /// `None` when the event has no target or the target is not an element.
    pub fn interaction_record(&self, event: &DomEvent) -> Option<EventRecord> {
        let Some(target) = event.target else {
            tracing::debug!(kind = %event.kind, "Event without target skipped");
            return None;
        };
        let doc = self.inner.host.document();
        let limit = self.inner.config.text_limit;
        let Some(described) = describe(&doc, target, limit) else {
            tracing::debug!(kind = %event.kind, "Event target is not an element");
            return None;
        };
        let parent = doc
            .parent_element(target)
            .and_then(|parent| describe(&doc, parent, limit));

        let env = self.inner.host.environment();
        let interaction = Interaction::from_event(event, described, parent, env.scroll);
        Some(EventRecord::interaction(
            event.kind,
            self.page_details_from(&env),
            interaction,
        ))
    }

    /// Record and send an interaction event
    pub fn handle_event(&self, event: &DomEvent) -> Option<JoinHandle<()>> {
        let record = self.interaction_record(event)?;
        self.send(record.into())
    }

    pub fn handle_visibility_change(&self) -> Option<JoinHandle<()>> {
        let env = self.inner.host.environment();
        let record = EventRecord::visibility(self.page_details_from(&env), env.hidden);
        self.send(record.into())
    }

    pub fn handle_scroll(&self) -> Option<JoinHandle<()>> {
        let env = self.inner.host.environment();
        let record = EventRecord::scroll(self.page_details_from(&env), env.scroll);
        self.send(record.into())
    }

    pub fn handle_orientation_change(&self) -> Option<JoinHandle<()>> {
        let env = self.inner.host.environment();
        let orientation = snapshot::orientation(env.viewport);
        let record = EventRecord::orientation(self.page_details_from(&env), orientation);
        self.send(record.into())
    }

    /// Send the navigation record; later calls do nothing
    pub fn handle_unload(&self) -> Option<JoinHandle<()>> {
        let next_page = self.inner.host.environment().href;
        let Some(record) = self.inner.session.leave(&next_page, self.inner.host.now()) else {
            tracing::debug!("Page already left");
            return None;
        };
        self.send(record.into())
    }

    fn send(&self, record: Record) -> Option<JoinHandle<()>> {
        self.inner.dispatcher.dispatch(&record)
    }
}
