//! Carry annotation ranges through a confirmed text change.
//!
//! This is a pure function of `(annotations, change, new_len)`: it never
//! reads the surface and returns the same result however often it runs.

use crate::Span;
use crate::annotations::{AnnotationStatus, TrackedError};
use crate::editing::TextChange;

/// Update every annotation's `current_range` for `change`.
///
/// `new_text_len` is the character length of the text after the change;
/// every returned range satisfies `0 <= start <= end <= new_text_len`.
pub fn reconcile(
    annotations: &[TrackedError],
    change: &TextChange,
    new_text_len: usize,
) -> Vec<TrackedError> {
    annotations
        .iter()
        .map(|annotation| reconcile_one(annotation, change, new_text_len))
        .collect()
}

fn reconcile_one(annotation: &TrackedError, change: &TextChange, new_len: usize) -> TrackedError {
    let mut updated = annotation.clone();
    if annotation.status == AnnotationStatus::Invalid {
        updated.current_range = annotation.current_range.clamp_to(new_len);
        return updated;
    }

    let Span { start: s, end: e } = annotation.current_range;
    let (cs, ce) = (change.start, change.end);
    let delta = change.length_delta();

    let (range, touched) = if e <= cs {
        // Entirely before the change
        (Span::new(s, e), false)
    } else if s >= ce {
        (Span::new(shift(s, delta), shift(e, delta)), false)
    } else if cs <= s && e <= ce {
        // Swallowed: the anchored text no longer exists verbatim
        (change.inserted_span(), true)
    } else if s < cs && e > cs {
        if e <= ce {
            (Span::new(s, cs), true)
        } else {
            (Span::new(s, shift(e, delta)), true)
        }
    } else if s >= cs && s < ce && e > ce {
        (Span::new(shift(s, delta), shift(e, delta)), true)
    } else {
        log::debug!(
            "Annotation {} at {:?} not covered by change {}..{}; clamping",
            annotation.id,
            annotation.current_range,
            cs,
            ce
        );
        (Span::new(s, e), true)
    };

    updated.current_range = range.clamp_to(new_len);
    if touched {
        updated.status = AnnotationStatus::NeedsRevalidation;
    }
    updated
}

fn shift(offset: usize, delta: isize) -> usize {
    offset.saturating_add_signed(delta)
}
