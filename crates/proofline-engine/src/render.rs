//! Painting annotations onto an [`EditableSurface`].
//!
//! Rendering is always a full repaint: every existing marker is unwrapped and
//! the tree normalized before the current set is painted again. An annotation
//! whose range crosses leaf boundaries gets one marker per leaf; synthetic
//! line breaks between leaves are never wrapped.

use serde::Serialize;

use crate::Span;
use crate::annotations::{AnnotationStatus, TrackedError};
use crate::extract::extract;
use crate::surface::{EditableSurface, MarkerSpec};

/// Ids of the annotations painted and skipped by one [`render`] pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderReport {
    pub painted: Vec<String>,
    pub skipped: Vec<String>,
}

/// Remove every marker from `surface`, leaving its text in place
pub fn clear_markers<S: EditableSurface>(surface: &mut S) -> usize {
    let markers = surface.marker_nodes();
    for marker in &markers {
        surface.unwrap_marker(*marker);
    }
    surface.normalize();
    markers.len()
}

/// Repaint `surface` with the paintable annotations in `annotations`.
///
/// Only `Pending` annotations are considered. They are painted in ascending
/// start order; one that overlaps an already painted range, has an empty
/// range, or covers no text leaf is skipped.
pub fn render<S: EditableSurface>(surface: &mut S, annotations: &[TrackedError]) -> RenderReport {
    clear_markers(surface);

    let mut candidates: Vec<&TrackedError> = annotations
        .iter()
        .filter(|a| a.status == AnnotationStatus::Pending)
        .collect();
    candidates.sort_by_key(|a| (a.current_range.start, a.current_range.end));

    let mut report = RenderReport::default();
    let mut painted_ranges: Vec<Span> = Vec::new();

    for annotation in candidates {
        let range = annotation.current_range;
        if range.is_empty() {
            log::debug!("Skipping annotation {} with empty range", annotation.id);
            report.skipped.push(annotation.id.clone());
            continue;
        }
        if let Some(other) = painted_ranges.iter().find(|p| p.intersects(range)) {
            log::debug!(
                "Skipping annotation {} at {:?}: overlaps painted {:?}",
                annotation.id,
                range,
                other
            );
            report.skipped.push(annotation.id.clone());
            continue;
        }

        if paint(surface, annotation) {
            painted_ranges.push(range);
            report.painted.push(annotation.id.clone());
        } else {
            log::debug!(
                "Skipping annotation {} at {:?}: no text leaf in range",
                annotation.id,
                range
            );
            report.skipped.push(annotation.id.clone());
        }
    }

    report
}

/// Wrap every leaf piece of `annotation`'s range; true if anything was wrapped
fn paint<S: EditableSurface>(surface: &mut S, annotation: &TrackedError) -> bool {
    // Earlier wraps split leaves, so positions are re-derived for each annotation
    let flat = extract(surface);
    let range = annotation.current_range.clamp_to(flat.len());
    if range.is_empty() {
        return false;
    }

    let pieces: Vec<(S::NodeId, std::ops::Range<usize>)> = flat
        .map
        .text_leaves()
        .into_iter()
        .filter(|(_, leaf)| leaf.start < range.end && range.start < leaf.end)
        .map(|(node, leaf)| {
            let local_start = range.start.max(leaf.start) - leaf.start;
            let local_end = range.end.min(leaf.end) - leaf.start;
            (node, local_start..local_end)
        })
        .collect();

    let spec = MarkerSpec {
        annotation_id: annotation.id.clone(),
        kind: annotation.kind.clone(),
        tooltip: annotation.tooltip(),
    };

    let mut wrapped = 0;
    for (node, local) in pieces {
        if surface.wrap_text(node, local, &spec).is_some() {
            wrapped += 1;
        }
    }
    wrapped > 0
}
