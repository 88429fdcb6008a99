//! Minimal document tree
//!
//! Arena-backed elements and text nodes with parent links. The tracker only
//! needs traversal, attribute/text writes and a stable serialization, so that
//! is all this provides. Writes that leave a value unchanged are not counted
//! as mutations; [`Document::revision`] only moves on real changes.

pub mod events;
pub mod sync;

pub use events::{dispatch, DomEvent, DomListener, EventType, ListenerOptions, Scope, ScrollMetrics};
pub use sync::{DisplayedNumber, DomSynchronizer, NumberBroadcast, SyncReport};

/// Handle to a node inside one [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Document with a single `<body>` root
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    body: NodeId,
    title: String,
    revision: u64,
}

impl Document {
    pub fn new() -> Self {
        let body = Node {
            kind: NodeKind::Element {
                tag: "body".to_string(),
                attributes: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![body],
            body: NodeId(0),
            title: String::new(),
            revision: 0,
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Number of effective mutations applied so far
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        self.revision += 1;
        id
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let attributes = attributes
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        self.push(
            parent,
            NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attributes,
            },
        )
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push(parent, NodeKind::Text(text.to_string()))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Set an attribute; returns whether anything changed
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind else {
            return false;
        };
        match attributes.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, existing)) if existing.as_str() == value => return false,
            Some((_, existing)) => *existing = value.to_string(),
            None => attributes.push((name.to_ascii_lowercase(), value.to_string())),
        }
        self.revision += 1;
        true
    }

    /// Text of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    /// Overwrite a text node; returns whether anything changed
    pub fn set_text(&mut self, id: NodeId, value: &str) -> bool {
        match &mut self.nodes[id.0].kind {
            NodeKind::Text(text) if text.as_str() != value => {
                *text = value.to_string();
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// `id` followed by each ancestor up to the body
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Nearest node (self or ancestor) satisfying `predicate`
    pub fn closest(&self, id: NodeId, predicate: impl Fn(&Document, NodeId) -> bool) -> Option<NodeId> {
        self.ancestors(id).into_iter().find(|n| predicate(self, *n))
    }

    /// Pre-order walk of the subtree rooted at `id` (inclusive)
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Concatenated text of every text node under `id`
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Replace all children of an element with one text node
    ///
    /// No-op (and no revision bump) when the subtree is already exactly that
    /// single text node.
    pub fn replace_children_with_text(&mut self, id: NodeId, text: &str) -> bool {
        if self.text(id).is_some() {
            return self.set_text(id, text);
        }
        if let [only] = self.children(id) {
            if self.text(*only) == Some(text) {
                return false;
            }
        }

        let detached: Vec<NodeId> = std::mem::take(&mut self.nodes[id.0].children);
        for child in detached {
            self.nodes[child.0].parent = None;
        }
        self.push(id, NodeKind::Text(text.to_string()));
        true
    }

    /// Serialize the body subtree
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(self.body, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => out.push_str(&escape(text, false)),
            NodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');
                for child in &self.nodes[id.0].children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(raw: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
