//! # Flat text extraction
//!
//! Walks an [`EditableSurface`] depth-first and produces the canonical flat
//! string the annotator sees, together with a [`PositionMap`] that ties every
//! flat character back to the tree.
//!
//! ```text
//! <p>Hello</p><p>world<br>again</p>
//!   → "Hello\nworld\nagain"
//!      ^^^^^ text leaf chars, one entry each
//!           ^ synthetic entry owned by the second <p>
//! ```
//!
//! A break or block boundary only emits `"\n"` when the accumulated text does
//! not already end with one, so nested blocks never produce blank lines.

use serde::Serialize;

use crate::surface::{EditableSurface, NodeKind};

/// One flat-text character and the tree position it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionEntry<N> {
    pub flat_offset: usize,
    pub node: N,
    /// Character offset inside the text leaf (0 for synthetic entries)
    pub node_offset: usize,
    /// True for the `"\n"` emitted at break/block boundaries
    pub synthetic: bool,
}

/// Ordered flat-offset → tree-position correspondence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionMap<N> {
    entries: Vec<PositionEntry<N>>,
}

impl<N: Copy + Eq> PositionMap<N> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PositionEntry<N>] {
        &self.entries
    }

    /// Tree position of a flat offset
    pub fn lookup(&self, flat_offset: usize) -> Option<&PositionEntry<N>> {
        self.entries.get(flat_offset)
    }

    /// Flat offset of a character inside a text leaf
    pub fn offset_of(&self, node: N, node_offset: usize) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| !e.synthetic && e.node == node && e.node_offset == node_offset)
            .map(|e| e.flat_offset)
    }

    /// Flat range covered by each text leaf, in document order
    pub fn text_leaves(&self) -> Vec<(N, std::ops::Range<usize>)> {
        let mut leaves: Vec<(N, std::ops::Range<usize>)> = Vec::new();
        for entry in self.entries.iter().filter(|e| !e.synthetic) {
            match leaves.last_mut() {
                Some((node, range)) if *node == entry.node && range.end == entry.flat_offset => {
                    range.end += 1;
                }
                _ => leaves.push((entry.node, entry.flat_offset..entry.flat_offset + 1)),
            }
        }
        leaves
    }
}

/// Immutable flat snapshot of a surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatText<N> {
    pub text: String,
    pub map: PositionMap<N>,
}

impl<N: Copy + Eq> FlatText<N> {
    /// Length in characters; always equal to `map.len()`
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Build the flat text and position map for `surface`
pub fn extract<S: EditableSurface>(surface: &S) -> FlatText<S::NodeId> {
    let mut builder = Builder {
        text: String::new(),
        entries: Vec::new(),
    };
    if let Some(root) = surface.root() {
        builder.visit(surface, root);
    }
    FlatText {
        text: builder.text,
        map: PositionMap {
            entries: builder.entries,
        },
    }
}

/// Character a map entry stands for, read back from the surface
pub fn resolve_char<S: EditableSurface>(
    surface: &S,
    entry: &PositionEntry<S::NodeId>,
) -> Option<char> {
    if entry.synthetic {
        return Some('\n');
    }
    surface.text(entry.node)?.chars().nth(entry.node_offset)
}

struct Builder<N> {
    text: String,
    entries: Vec<PositionEntry<N>>,
}

impl<N: Copy> Builder<N> {
    fn visit<S: EditableSurface<NodeId = N>>(&mut self, surface: &S, node: N) {
        match surface.kind(node) {
            NodeKind::Text => {
                if let Some(text) = surface.text(node) {
                    for (node_offset, ch) in text.chars().enumerate() {
                        self.push(ch, node, node_offset, false);
                    }
                }
            }
            NodeKind::Break => self.line_break(node),
            NodeKind::Block => {
                if !self.text.is_empty() {
                    self.line_break(node);
                }
                self.visit_children(surface, node);
            }
            NodeKind::Marker | NodeKind::Other => self.visit_children(surface, node),
        }
    }

    fn visit_children<S: EditableSurface<NodeId = N>>(&mut self, surface: &S, node: N) {
        for child in surface.children(node) {
            self.visit(surface, child);
        }
    }

    fn line_break(&mut self, node: N) {
        if !self.text.ends_with('\n') {
            self.push('\n', node, 0, true);
        }
    }

    fn push(&mut self, ch: char, node: N, node_offset: usize, synthetic: bool) {
        self.entries.push(PositionEntry {
            flat_offset: self.entries.len(),
            node,
            node_offset,
            synthetic,
        });
        self.text.push(ch);
    }
}
