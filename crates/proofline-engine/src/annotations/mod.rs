//! # Annotations
//!
//! An annotation starts life as a [`RawAnnotation`] inside an annotator
//! response, positioned against the snapshot that was sent. Once the
//! [`PositionValidator`] accepts it against the current text it becomes a
//! [`TrackedError`], whose `current_range` is then carried through every
//! subsequent edit by the reconciler.

pub mod parse;
pub mod validate;

pub use parse::{CheckResponse, DropReason, RawAnnotation, parse_check_response};
pub use validate::{PositionValidator, Validation, ValidatorConfig};

use serde::{Deserialize, Serialize};

use crate::Span;

/// Lifecycle state of a tracked annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    /// Anchored text is believed intact; eligible for painting
    Pending,
    /// An edit touched the anchored text; position must be re-checked
    NeedsRevalidation,
    /// Anchored text is gone
    Invalid,
}

/// A remotely reported error tracked across local edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedError {
    /// Stable across edits
    pub id: String,
    /// Category tag such as `"spelling"` or `"grammar"`
    pub kind: String,
    pub original_substring: String,
    pub suggestions: Vec<String>,
    pub explanation: String,
    /// In `[0, 1]`
    pub confidence: f32,
    pub status: AnnotationStatus,
    /// Range as first reported; never changes
    pub original_range: Span,
    /// Range in the current text, maintained by the reconciler
    pub current_range: Span,
}

impl TrackedError {
    /// Promote a validated raw annotation placed at `range` in the current text
    pub fn from_raw(raw: RawAnnotation, range: Span) -> Self {
        Self {
            original_range: Span::new(raw.start, raw.end),
            id: raw.id,
            kind: raw.kind,
            original_substring: raw.original,
            suggestions: raw.suggestions,
            explanation: raw.explanation,
            confidence: raw.confidence,
            status: AnnotationStatus::Pending,
            current_range: range,
        }
    }

    pub fn is_paintable(&self) -> bool {
        self.status == AnnotationStatus::Pending && !self.current_range.is_empty()
    }

    /// Text shown when hovering the painted marker
    pub fn tooltip(&self) -> String {
        match (self.suggestions.first(), self.explanation.is_empty()) {
            (Some(first), true) => format!("Suggestion: {first}"),
            (Some(first), false) => format!("{} Suggestion: {first}", self.explanation),
            (None, _) => self.explanation.clone(),
        }
    }
}
