//! Event Sources
//!
//! Document events and the subscription seam the tracker listens through.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::dom::NodeId;

/// Event types the tracker subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    Submit,
    Input,
    Change,
    Keydown,
    Mousemove,
    #[serde(rename = "visibilitychange")]
    VisibilityChange,
    Scroll,
    #[serde(rename = "orientationchange")]
    OrientationChange,
    #[serde(rename = "beforeunload")]
    BeforeUnload,
}

impl EventKind {
    /// Interaction events: recorded with their target element
    pub const INTERACTIONS: [EventKind; 6] = [
        EventKind::Click,
        EventKind::Submit,
        EventKind::Input,
        EventKind::Change,
        EventKind::Keydown,
        EventKind::Mousemove,
    ];

    /// Mouse events, which carry a pointer position and button
    pub fn is_pointer(&self) -> bool {
        matches!(self, EventKind::Click | EventKind::Mousemove)
    }

    /// DOM event type name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Submit => "submit",
            EventKind::Input => "input",
            EventKind::Change => "change",
            EventKind::Keydown => "keydown",
            EventKind::Mousemove => "mousemove",
            EventKind::VisibilityChange => "visibilitychange",
            EventKind::Scroll => "scroll",
            EventKind::OrientationChange => "orientationchange",
            EventKind::BeforeUnload => "beforeunload",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dispatched document event
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    pub kind: EventKind,
    pub target: Option<NodeId>,
    pub client_x: f64,
    pub client_y: f64,
    /// `KeyboardEvent.key`
    pub key: Option<String>,
    /// `MouseEvent.button`
    pub button: i16,
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
}

impl DomEvent {
    /// Event with no target, no pointer position and no modifiers
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            target: None,
            client_x: 0.0,
            client_y: 0.0,
            key: None,
            button: 0,
            alt_key: false,
            ctrl_key: false,
            shift_key: false,
            meta_key: false,
        }
    }

    /// Click on `target` at client coordinates (x, y)
    pub fn click(target: NodeId, x: f64, y: f64) -> Self {
        Self::new(EventKind::Click).with_target(target).at(x, y)
    }

    /// Keydown of `key` on `target`
    pub fn keydown(target: NodeId, key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            ..Self::new(EventKind::Keydown).with_target(target)
        }
    }

    pub fn with_target(mut self, target: NodeId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.client_x = x;
        self.client_y = y;
        self
    }
}

/// Event handler registered with an [`EventSource`]
pub type Listener = Arc<dyn Fn(&DomEvent) + Send + Sync>;

/// Something listeners can be attached to (`addEventListener`)
pub trait EventSource {
    fn add_listener(&self, kind: EventKind, listener: Listener);
}

/// In-process event source; dispatch runs listeners synchronously in
/// registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every listener of its kind; returns how many ran
    pub fn dispatch(&self, event: &DomEvent) -> usize {
        // Clone out so listeners may register more listeners
        let listeners = self
            .listeners
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }
}

impl EventSource for EventBus {
    fn add_listener(&self, kind: EventKind, listener: Listener) {
        self.listeners.write().entry(kind).or_default().push(listener);
    }
}
