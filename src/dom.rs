//! Document Model
//!
//! A minimal arena DOM: the part of a browser document the tracker reads.
//! Hosts build and mutate it; the tracker only ever borrows it.

use std::collections::BTreeMap;

/// Handle to a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Layout box of an element, as reported by `offset*` properties
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Layout {
    pub offset_left: f64,
    pub offset_top: f64,
    pub offset_width: f64,
    pub offset_height: f64,
}

impl Layout {
    /// Layout box at (left, top) with the given size
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            offset_left: left,
            offset_top: top,
            offset_width: width,
            offset_height: height,
        }
    }
}

/// Element-specific node data
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    /// Lower-case local name (`div`, `span`, ...)
    pub local_name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    pub layout: Layout,
    /// Resolved style properties (`display` -> `block`, ...)
    pub computed_style: BTreeMap<String, String>,
}

impl ElementData {
    fn new(tag: &str) -> Self {
        Self {
            local_name: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Upper-case tag name, as `Element.tagName` reports for HTML
    pub fn tag_name(&self) -> String {
        self.local_name.to_ascii_uppercase()
    }

    /// Get an attribute value
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of the `id` attribute, empty when absent
    pub fn id(&self) -> &str {
        self.attribute("id").unwrap_or("")
    }

    /// Value of the `class` attribute, empty when absent
    pub fn class_name(&self) -> &str {
        self.attribute("class").unwrap_or("")
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// A document tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document (just the document node)
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
        }
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    /// Append a new element under `parent`
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.push(parent, NodeKind::Element(ElementData::new(tag)))
    }

    /// Append a text node under `parent`
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push(parent, NodeKind::Text(text.to_string()))
    }

    /// Set (or replace) an attribute; no-op for non-elements
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(node) {
            match el.attributes.iter_mut().find(|(n, _)| n == name) {
                Some((_, v)) => *v = value.to_string(),
                None => el.attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    /// Set an element's layout box
    pub fn set_layout(&mut self, node: NodeId, layout: Layout) {
        if let Some(el) = self.element_mut(node) {
            el.layout = layout;
        }
    }

    /// Set one computed style property
    pub fn set_style(&mut self, node: NodeId, property: &str, value: &str) {
        if let Some(el) = self.element_mut(node) {
            el.computed_style
                .insert(property.to_string(), value.to_string());
        }
    }

    /// Element data, or `None` for text/document nodes and foreign ids
    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(node.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    /// Parent node of any kind
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }

    /// Parent node only if it is an element (`Node.parentElement`)
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&p| self.is_element(p))
    }

    /// Child nodes in order
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Element siblings before `node`, nearest first
    pub fn previous_element_siblings(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let siblings = self.parent(node).map(|p| self.children(p)).unwrap_or(&[]);
        let index = siblings.iter().position(|&c| c == node).unwrap_or(0);
        siblings[..index]
            .iter()
            .rev()
            .copied()
            .filter(move |&s| self.is_element(s))
    }

    /// Concatenated text of all descendant text nodes (`Node.textContent`)
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(n) = self.nodes.get(node.0) else {
            return;
        };
        if let NodeKind::Text(text) = &n.kind {
            out.push_str(text);
        }
        for &child in &n.children {
            self.collect_text(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_navigation() {
        let mut doc = Document::new();
        let html = doc.append_element(doc.root(), "HTML");
        let body = doc.append_element(html, "body");
        let p = doc.append_element(body, "p");
        let text = doc.append_text(p, "hello");

        assert_eq!(doc.parent(body), Some(html));
        assert_eq!(doc.parent_element(html), None); // parent is the document
        assert_eq!(doc.parent_element(text), Some(p));
        assert_eq!(doc.element(html).unwrap().local_name, "html");
        assert_eq!(doc.element(html).unwrap().tag_name(), "HTML");
        assert!(!doc.is_element(text));
    }

    #[test]
    fn test_previous_element_siblings_skip_text() {
        let mut doc = Document::new();
        let ul = doc.append_element(doc.root(), "ul");
        let a = doc.append_element(ul, "li");
        doc.append_text(ul, "\n  ");
        let b = doc.append_element(ul, "li");
        let c = doc.append_element(ul, "li");

        let prev: Vec<_> = doc.previous_element_siblings(c).collect();
        assert_eq!(prev, vec![b, a]);
        assert_eq!(doc.previous_element_siblings(a).count(), 0);
    }

    #[test]
    fn test_text_content_is_recursive() {
        let mut doc = Document::new();
        let div = doc.append_element(doc.root(), "div");
        doc.append_text(div, "Hello, ");
        let b = doc.append_element(div, "b");
        doc.append_text(b, "world");
        assert_eq!(doc.text_content(div), "Hello, world");
    }

    #[test]
    fn test_set_attribute_replaces() {
        let mut doc = Document::new();
        let el = doc.append_element(doc.root(), "input");
        doc.set_attribute(el, "name", "q");
        doc.set_attribute(el, "name", "query");
        let data = doc.element(el).unwrap();
        assert_eq!(data.attribute("name"), Some("query"));
        assert_eq!(data.attributes.len(), 1);
        assert_eq!(data.id(), "");
    }
}
