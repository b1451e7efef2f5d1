//! Element Descriptions
//!
//! Turns a DOM node into the structured description attached to event records.

use std::collections::BTreeMap;

use serde::Serialize;
use smallvec::SmallVec;

use crate::dom::{Document, ElementData, NodeId};

/// Default number of characters of `textContent` kept
pub const TEXT_LIMIT: usize = 100;

/// `type` values an `<input>` accepts; anything else reads as `text`
const INPUT_TYPES: &[&str] = &[
    "button",
    "checkbox",
    "color",
    "date",
    "datetime-local",
    "email",
    "file",
    "hidden",
    "image",
    "month",
    "number",
    "password",
    "radio",
    "range",
    "reset",
    "search",
    "submit",
    "tel",
    "text",
    "time",
    "url",
    "week",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// What an interacted-with element looked like at event time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescription {
    pub tag_name: String,
    pub id: String,
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    pub text_content: String,
    pub data_attributes: BTreeMap<String, String>,
    pub position: Position,
    pub dimensions: Dimensions,
    pub css_path: String,
    pub computed_style: BTreeMap<String, String>,
    pub visibility: bool,
}

/// Describe `node`, keeping at most `text_limit` characters of its text.
///
/// Returns `None` when `node` is not an element.
pub fn describe(doc: &Document, node: NodeId, text_limit: usize) -> Option<ElementDescription> {
    let el = doc.element(node)?;
    let layout = el.layout;

    Some(ElementDescription {
        tag_name: el.tag_name(),
        id: el.id().to_string(),
        class_name: el.class_name().to_string(),
        name: el.attribute("name").map(str::to_string),
        element_type: element_type(el),
        text_content: truncate_text(&doc.text_content(node), text_limit),
        data_attributes: data_attributes(doc, node),
        position: Position {
            x: layout.offset_left,
            y: layout.offset_top,
        },
        dimensions: Dimensions {
            width: layout.offset_width,
            height: layout.offset_height,
        },
        css_path: css_path(doc, node),
        computed_style: el.computed_style.clone(),
        // Ignores visibility:hidden, opacity and clipping
        visibility: layout.offset_width > 0.0 && layout.offset_height > 0.0,
    })
}

/// The element's `type` as the DOM property reports it.
///
/// Form controls get their default type when the attribute is missing or
/// unknown; other elements report the attribute as written.
pub fn element_type(el: &ElementData) -> Option<String> {
    let attr = el.attribute("type");
    let normalized = attr.map(str::to_ascii_lowercase);

    let reflected = match el.local_name.as_str() {
        "input" => match normalized {
            Some(t) if INPUT_TYPES.contains(&t.as_str()) => t,
            _ => "text".to_string(),
        },
        "button" => match normalized {
            Some(t) if t == "reset" || t == "button" => t,
            _ => "submit".to_string(),
        },
        "select" if el.attribute("multiple").is_some() => "select-multiple".to_string(),
        "select" => "select-one".to_string(),
        "textarea" => "textarea".to_string(),
        _ => return attr.map(str::to_string),
    };
    Some(reflected)
}

/// Trim, then keep the first `limit` characters
pub fn truncate_text(text: &str, limit: usize) -> String {
    text.trim().chars().take(limit).collect()
}

/// All `data-*` attributes of an element
pub fn data_attributes(doc: &Document, node: NodeId) -> BTreeMap<String, String> {
    doc.element(node)
        .map(|el| {
            el.attributes
                .iter()
                .filter(|(name, _)| name.starts_with("data-"))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Selector chain from the root (or nearest id'd ancestor) down to `node`.
///
/// Empty for non-element nodes.
pub fn css_path(doc: &Document, node: NodeId) -> String {
    let mut path: SmallVec<[String; 8]> = SmallVec::new();
    let mut current = Some(node);

    while let Some(id) = current {
        let Some(el) = doc.element(id) else {
            break;
        };
        let mut selector = el.local_name.clone();

        if !el.id().is_empty() {
            selector.push('#');
            selector.push_str(el.id());
            path.push(selector);
            break;
        }

        let nth = 1 + doc
            .previous_element_siblings(id)
            .filter(|&s| doc.element(s).is_some_and(|sib| sib.local_name == el.local_name))
            .count();
        if nth != 1 {
            selector.push_str(&format!(":nth-of-type({})", nth));
        }
        path.push(selector);
        current = doc.parent(id);
    }

    path.reverse();
    path.join(" > ")
}
