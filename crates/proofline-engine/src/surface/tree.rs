use super::{EditableSurface, MarkerSpec, NodeKind};

/// Index of a node inside a [`TextTree`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq)]
enum NodeData {
    Root,
    Block,
    Text(String),
    Break,
    Marker(MarkerSpec),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed virtual text tree implementing [`EditableSurface`].
///
/// Nodes detached by `wrap_text`, `unwrap_marker` or `normalize` go on a free
/// list and their slots are reused, so repeated repaints do not grow the
/// arena. A `NodeId` is only meaningful while its node is attached; re-read
/// ids from the tree after any of those calls.
#[derive(Debug, Clone)]
pub struct TextTree {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    root: NodeId,
}

impl Default for TextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TextTree {
    /// Create an empty tree holding only the root container
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Root,
                parent: None,
                children: Vec::new(),
            }],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    /// Build a tree with one block per line of `text`
    pub fn from_plain_text(text: &str) -> Self {
        let mut tree = Self::new();
        let root = tree.root;
        for line in text.split('\n') {
            let block = tree.append_block(root);
            if !line.is_empty() {
                tree.append_text(block, line);
            }
        }
        tree
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn append_block(&mut self, parent: NodeId) -> NodeId {
        self.append(parent, NodeData::Block)
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.append(parent, NodeData::Text(text.to_string()))
    }

    pub fn append_break(&mut self, parent: NodeId) -> NodeId {
        self.append(parent, NodeData::Break)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }

    /// Marker attributes when `node` is a marker
    pub fn marker(&self, node: NodeId) -> Option<&MarkerSpec> {
        match self.node(node).map(|n| &n.data) {
            Some(NodeData::Marker(spec)) => Some(spec),
            _ => None,
        }
    }

    /// Concatenated text of every text leaf below `node`
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    /// Replace the content of a text leaf. Returns false for non-text nodes.
    pub fn set_text(&mut self, leaf: NodeId, text: String) -> bool {
        match self.nodes.get_mut(leaf.0).map(|n| &mut n.data) {
            Some(NodeData::Text(existing)) => {
                *existing = text;
                true
            }
            _ => false,
        }
    }

    /// Insert `text` at character offset `at` of a text leaf
    pub fn insert_text(&mut self, leaf: NodeId, at: usize, text: &str) -> bool {
        let Some(current) = self.text(leaf) else {
            return false;
        };
        if at > current.chars().count() {
            return false;
        }
        let byte = byte_offset(current, at);
        let mut updated = current.to_string();
        updated.insert_str(byte, text);
        self.set_text(leaf, updated)
    }

    /// Delete the character range `range` from a text leaf
    pub fn delete_text(&mut self, leaf: NodeId, range: std::ops::Range<usize>) -> bool {
        let Some(current) = self.text(leaf) else {
            return false;
        };
        if range.start > range.end || range.end > current.chars().count() {
            return false;
        }
        let start = byte_offset(current, range.start);
        let end = byte_offset(current, range.end);
        let mut updated = current.to_string();
        updated.replace_range(start..end, "");
        self.set_text(leaf, updated)
    }

    /// Serialize the tree as the HTML a browser surface would hold
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(self.root, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Root => self.write_children_html(node, out),
            NodeData::Block => {
                out.push_str("<p>");
                self.write_children_html(node, out);
                out.push_str("</p>");
            }
            NodeData::Text(text) => out.push_str(&html_escape::encode_text(text)),
            NodeData::Break => out.push_str("<br>"),
            NodeData::Marker(spec) => {
                out.push_str(&format!(
                    "<mark class=\"annotation\" data-annotation-id=\"{}\" data-kind=\"{}\" title=\"{}\">",
                    html_escape::encode_double_quoted_attribute(&spec.annotation_id),
                    html_escape::encode_double_quoted_attribute(&spec.kind),
                    html_escape::encode_double_quoted_attribute(&spec.tooltip),
                ));
                self.write_children_html(node, out);
                out.push_str("</mark>");
            }
        }
    }

    fn write_children_html(&self, node: &Node, out: &mut String) {
        for child in &node.children {
            self.write_html(*child, out);
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn append(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = self.alloc(data, Some(parent));
        if let Some(parent_node) = self.nodes.get_mut(parent.0) {
            parent_node.children.push(id);
        }
        id
    }

    fn alloc(&mut self, data: NodeData, parent: Option<NodeId>) -> NodeId {
        let node = Node {
            data,
            parent,
            children: Vec::new(),
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = node;
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Return a detached node and the subtree it still owns to the free list
    fn release(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            if self.nodes[child.0].parent == Some(id) {
                self.release(child);
            }
        }
        self.nodes[id.0] = Node {
            data: NodeData::Text(String::new()),
            parent: None,
            children: Vec::new(),
        };
        self.free.push(id);
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        if let NodeData::Text(text) = &node.data {
            out.push_str(text);
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    /// Swap `old` for `replacements` in its parent's child list
    fn replace_child(&mut self, old: NodeId, replacements: &[NodeId]) {
        let Some(parent) = self.parent(old) else {
            return;
        };
        let Some(index) = self.nodes[parent.0].children.iter().position(|c| *c == old) else {
            return;
        };
        self.nodes[parent.0]
            .children
            .splice(index..=index, replacements.iter().copied());
        for id in replacements {
            self.nodes[id.0].parent = Some(parent);
        }
        if !replacements.contains(&old) {
            self.release(old);
        }
    }

    fn collect_markers(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.node(id) else {
            return;
        };
        if matches!(node.data, NodeData::Marker(_)) {
            out.push(id);
        }
        for child in &node.children {
            self.collect_markers(*child, out);
        }
    }

    fn normalize_node(&mut self, id: NodeId) {
        let children = self.nodes[id.0].children.clone();
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());

        for child in children {
            let child_text = match &self.nodes[child.0].data {
                NodeData::Text(text) => Some(text.clone()),
                _ => None,
            };
            match child_text {
                Some(text) if text.is_empty() => self.release(child),
                Some(text) => {
                    let previous = kept.last().copied();
                    if let Some(prev) = previous
                        && let NodeData::Text(prev_text) = &mut self.nodes[prev.0].data
                    {
                        prev_text.push_str(&text);
                        self.release(child);
                    } else {
                        kept.push(child);
                    }
                }
                None => {
                    self.normalize_node(child);
                    kept.push(child);
                }
            }
        }

        self.nodes[id.0].children = kept;
    }
}

impl EditableSurface for TextTree {
    type NodeId = NodeId;

    fn root(&self) -> Option<NodeId> {
        Some(self.root)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn kind(&self, node: NodeId) -> NodeKind {
        match self.node(node).map(|n| &n.data) {
            Some(NodeData::Text(_)) => NodeKind::Text,
            Some(NodeData::Break) => NodeKind::Break,
            Some(NodeData::Block) => NodeKind::Block,
            Some(NodeData::Marker(_)) => NodeKind::Marker,
            Some(NodeData::Root) | None => NodeKind::Other,
        }
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match self.node(node).map(|n| &n.data) {
            Some(NodeData::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    fn marker_nodes(&self) -> Vec<NodeId> {
        let mut markers = Vec::new();
        self.collect_markers(self.root, &mut markers);
        markers
    }

    fn unwrap_marker(&mut self, marker: NodeId) {
        if self.marker(marker).is_none() || self.parent(marker).is_none() {
            return;
        }
        let content = self.text_content(marker);
        if content.is_empty() {
            self.replace_child(marker, &[]);
        } else {
            let text = self.alloc(NodeData::Text(content), None);
            self.replace_child(marker, &[text]);
        }
    }

    fn wrap_text(
        &mut self,
        leaf: NodeId,
        range: std::ops::Range<usize>,
        marker: &MarkerSpec,
    ) -> Option<NodeId> {
        let current = self.text(leaf)?.to_string();
        self.parent(leaf)?;
        if range.start >= range.end || range.end > current.chars().count() {
            return None;
        }

        let start = byte_offset(&current, range.start);
        let end = byte_offset(&current, range.end);
        let before = &current[..start];
        let marked = &current[start..end];
        let after = &current[end..];

        let mut pieces = Vec::with_capacity(3);
        if !before.is_empty() {
            self.set_text(leaf, before.to_string());
            pieces.push(leaf);
        }
        let marker_id = self.alloc(NodeData::Marker(marker.clone()), None);
        let inner = self.alloc(NodeData::Text(marked.to_string()), Some(marker_id));
        self.nodes[marker_id.0].children.push(inner);
        pieces.push(marker_id);
        if !after.is_empty() {
            let tail = self.alloc(NodeData::Text(after.to_string()), None);
            pieces.push(tail);
        }

        self.replace_child(leaf, &pieces);
        Some(marker_id)
    }

    fn normalize(&mut self) {
        self.normalize_node(self.root);
    }
}

/// Byte index of character `char_index`, or the string length past the end
fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}
