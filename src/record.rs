//! Wire Records
//!
//! The two payload shapes sent to the collector, tagged by `kind`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::element::ElementDescription;
use crate::events::{DomEvent, EventKind};
use crate::snapshot::{Orientation, PageSnapshot};

/// Anything the tracker transmits
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Navigation(NavigationRecord),
    Event(EventRecord),
}

impl Record {
    pub fn is_navigation(&self) -> bool {
        matches!(self, Record::Navigation(_))
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Record::Navigation(_) => "navigation",
            Record::Event(event) => event.event_type.as_str(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<NavigationRecord> for Record {
    fn from(record: NavigationRecord) -> Self {
        Record::Navigation(record)
    }
}

impl From<EventRecord> for Record {
    fn from(record: EventRecord) -> Self {
        Record::Event(record)
    }
}

/// Page leave: the load snapshot with `nextPage` filled in, plus time on page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationRecord {
    #[serde(flatten)]
    pub page: PageSnapshot,
    /// Milliseconds between load and unload
    pub duration: f64,
}

impl NavigationRecord {
    /// Close out `page` at page time `now`, leaving for `next_page`
    pub fn leave(mut page: PageSnapshot, next_page: impl Into<String>, now: f64) -> Self {
        page.next_page = next_page.into();
        let duration = now - page.start_time;
        Self { page, duration }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A single document event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event_type: EventKind,
    #[serde(serialize_with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub page_details: PageSnapshot,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Event-type specific fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Interaction(Box<Interaction>),
    Visibility {
        hidden: bool,
    },
    Scroll {
        #[serde(rename = "scrollPosition")]
        scroll_position: Point,
    },
    Orientation {
        orientation: Orientation,
    },
}

/// Pointer, keyboard and element details of an interaction event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    /// Pointer events only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<Point>,
    pub target: ElementDescription,
    pub scroll_position: Point,
    pub keystroke: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mouse_button: Option<i16>,
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_element: Option<ElementDescription>,
}

impl Interaction {
    /// Combine the raw event with the described target and its parent
    pub fn from_event(
        event: &DomEvent,
        target: ElementDescription,
        parent_element: Option<ElementDescription>,
        scroll: (f64, f64),
    ) -> Self {
        let pointer = event.kind.is_pointer();
        Self {
            cursor_position: pointer.then_some(Point {
                x: event.client_x,
                y: event.client_y,
            }),
            target,
            scroll_position: scroll.into(),
            keystroke: event.key.clone().filter(|k| !k.is_empty()),
            mouse_button: pointer.then_some(event.button),
            alt_key: event.alt_key,
            ctrl_key: event.ctrl_key,
            shift_key: event.shift_key,
            meta_key: event.meta_key,
            parent_element,
        }
    }
}

impl EventRecord {
    pub fn new(event_type: EventKind, page_details: PageSnapshot, payload: EventPayload) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            page_details,
            payload,
        }
    }

    pub fn interaction(
        event_type: EventKind,
        page_details: PageSnapshot,
        interaction: Interaction,
    ) -> Self {
        Self::new(
            event_type,
            page_details,
            EventPayload::Interaction(Box::new(interaction)),
        )
    }

    pub fn visibility(page_details: PageSnapshot, hidden: bool) -> Self {
        Self::new(
            EventKind::VisibilityChange,
            page_details,
            EventPayload::Visibility { hidden },
        )
    }

    pub fn scroll(page_details: PageSnapshot, scroll: (f64, f64)) -> Self {
        Self::new(
            EventKind::Scroll,
            page_details,
            EventPayload::Scroll {
                scroll_position: scroll.into(),
            },
        )
    }

    pub fn orientation(page_details: PageSnapshot, orientation: Orientation) -> Self {
        Self::new(
            EventKind::OrientationChange,
            page_details,
            EventPayload::Orientation { orientation },
        )
    }
}

/// `Date.prototype.toISOString` format
fn iso_millis<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::element::{describe, TEXT_LIMIT};
    use crate::host::Environment;
    use crate::snapshot::build_snapshot;

    fn page() -> PageSnapshot {
        build_snapshot(&Environment::desktop("https://example.com/start"), 1_000.0)
    }

    #[test]
    fn test_navigation_record_json() {
        let record: Record =
            NavigationRecord::leave(page(), "https://example.com/next", 4_500.0).into();
        assert!(record.is_navigation());

        let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["kind"], "navigation");
        assert_eq!(json["url"], "https://example.com/start");
        assert_eq!(json["nextPage"], "https://example.com/next");
        assert_eq!(json["duration"], 3_500.0);
        assert_eq!(json["deviceType"], "desktop");
    }

    #[test]
    fn test_interaction_record_json() {
        let mut doc = Document::new();
        let body = doc.append_element(doc.root(), "body");
        let input = doc.append_element(body, "input");
        doc.set_attribute(input, "name", "email");

        let event = DomEvent::keydown(input, "Enter");
        let interaction = Interaction::from_event(
            &event,
            describe(&doc, input, TEXT_LIMIT).unwrap(),
            describe(&doc, body, TEXT_LIMIT),
            (0.0, 120.0),
        );
        let record: Record =
            EventRecord::interaction(EventKind::Keydown, page(), interaction).into();
        assert_eq!(record.label(), "keydown");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "event");
        assert_eq!(json["type"], "keydown");
        assert_eq!(json["keystroke"], "Enter");
        assert_eq!(json["target"]["name"], "email");
        assert_eq!(json["parentElement"]["tagName"], "BODY");
        assert_eq!(json["scrollPosition"]["y"], 120.0);
        assert_eq!(json["pageDetails"]["url"], "https://example.com/start");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(json.get("cursorPosition").is_none());
        assert!(json.get("mouseButton").is_none());
        assert_eq!(json["altKey"], false);
    }

    #[test]
    fn test_pointer_fields_only_on_pointer_events() {
        let mut doc = Document::new();
        let button = doc.append_element(doc.root(), "button");
        let target = || describe(&doc, button, TEXT_LIMIT).unwrap();

        let click = DomEvent::click(button, 15.0, 30.0);
        let interaction = Interaction::from_event(&click, target(), None, (0.0, 0.0));
        assert_eq!(interaction.cursor_position, Some(Point { x: 15.0, y: 30.0 }));
        assert_eq!(interaction.mouse_button, Some(0));
        let json = serde_json::to_value(EventRecord::interaction(
            EventKind::Click,
            page(),
            interaction,
        ))
        .unwrap();
        assert_eq!(json["cursorPosition"]["y"], 30.0);
        assert_eq!(json["mouseButton"], 0);

        for kind in [EventKind::Submit, EventKind::Input, EventKind::Change] {
            let event = DomEvent::new(kind).with_target(button);
            let interaction = Interaction::from_event(&event, target(), None, (0.0, 0.0));
            assert_eq!(interaction.cursor_position, None, "{}", kind);
            assert_eq!(interaction.mouse_button, None, "{}", kind);
        }
    }

    #[test]
    fn test_empty_key_is_null() {
        let mut doc = Document::new();
        let el = doc.append_element(doc.root(), "div");
        let event = DomEvent::keydown(el, "");
        let target = describe(&doc, el, TEXT_LIMIT).unwrap();
        let interaction = Interaction::from_event(&event, target, None, (0.0, 0.0));
        assert_eq!(interaction.keystroke, None);

        let record = EventRecord::interaction(EventKind::Click, page(), interaction);
        let json = serde_json::to_value(record).unwrap();
        assert!(json["keystroke"].is_null());
        assert!(json.get("parentElement").is_none());
    }

    #[test]
    fn test_environment_record_shapes() {
        let record = Record::from(EventRecord::visibility(page(), true));
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["type"], "visibilitychange");
        assert_eq!(json["hidden"], true);

        let json = serde_json::to_value(EventRecord::scroll(page(), (5.0, 640.0))).unwrap();
        assert_eq!(json["type"], "scroll");
        assert_eq!(json["scrollPosition"]["y"], 640.0);
        assert!(json.get("target").is_none());

        let record = EventRecord::orientation(page(), Orientation::Portrait);
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["type"], "orientationchange");
        assert_eq!(json["orientation"], "portrait");
    }
}
