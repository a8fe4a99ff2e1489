//! # Editable surface abstraction
//!
//! The engine never talks to a concrete DOM. A host exposes its editable
//! content as an ordered tree through [`EditableSurface`]: the engine reads it
//! to build flat text and writes annotation markers back into it.
//!
//! Only three distinctions matter to the engine:
//!
//! - **text leaves** carry characters that become flat text
//! - **breaks/blocks** stand for line or paragraph boundaries and become `"\n"`
//! - **everything else** (including markers) is a transparent container
//!
//! [`TextTree`] is the in-crate implementation used by the CLI and tests.

mod tree;

pub use tree::{NodeId, TextTree};

use serde::{Deserialize, Serialize};

/// How the engine treats a node during extraction and rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf holding text content
    Text,
    /// Explicit line break (`<br>`)
    Break,
    /// Block container; a new block starts a new line
    Block,
    /// Annotation marker painted by the renderer
    Marker,
    /// Any other container
    Other,
}

/// Attributes carried by a painted annotation marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSpec {
    pub annotation_id: String,
    pub kind: String,
    pub tooltip: String,
}

/// A mutable tree the engine can read text from and paint markers onto.
///
/// Offsets passed to [`wrap_text`](EditableSurface::wrap_text) are character
/// offsets local to the text leaf.
pub trait EditableSurface {
    type NodeId: Copy + Eq + std::hash::Hash + std::fmt::Debug;

    /// Root node, or `None` for an absent surface
    fn root(&self) -> Option<Self::NodeId>;

    /// Children in document order
    fn children(&self, node: Self::NodeId) -> Vec<Self::NodeId>;

    fn kind(&self, node: Self::NodeId) -> NodeKind;

    /// Text content of a text leaf, `None` for every other node
    fn text(&self, node: Self::NodeId) -> Option<&str>;

    /// Every marker node currently attached to the tree
    fn marker_nodes(&self) -> Vec<Self::NodeId>;

    /// Replace a marker with a plain text node carrying its text content
    fn unwrap_marker(&mut self, marker: Self::NodeId);

    /// Split `leaf` into before/marked/after pieces and wrap the marked piece
    /// in a new marker. Returns the marker, or `None` when the range is empty
    /// or does not fit the leaf.
    fn wrap_text(
        &mut self,
        leaf: Self::NodeId,
        range: std::ops::Range<usize>,
        marker: &MarkerSpec,
    ) -> Option<Self::NodeId>;

    /// Merge adjacent text leaves and drop empty ones
    fn normalize(&mut self);
}
