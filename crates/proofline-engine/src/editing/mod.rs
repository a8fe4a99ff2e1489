/*!
 * # Editing: change detection and reconciliation
 *
 * Every keystroke produces a new flat text. This module answers two
 * questions about it:
 *
 * 1. **What changed?** [`diff`] trims the common prefix and suffix of the
 *    previous and current text and reports the remaining region as a
 *    [`TextChange`]. [`classify`] adds scheduling hints (substantial paste,
 *    finished sentence).
 * 2. **Where did the annotations go?** [`reconcile`] carries every stored
 *    annotation range through the change: ranges before it stay put, ranges
 *    after it shift, and ranges that overlap it are marked for revalidation.
 *
 * ```rust
 * use proofline_engine::editing::{diff, ChangeKind};
 *
 * let change = diff("The cat", "The fat cat");
 * assert_eq!(change.kind, ChangeKind::Insert);
 * assert_eq!((change.start, change.new_substring.as_str()), (4, "fat "));
 * ```
 */

pub mod change;
pub mod reconcile;

pub use change::{
    ChangeClass, ChangeKind, DEFAULT_SUBSTANTIAL_THRESHOLD, TextChange, classify, diff,
};
pub use reconcile::reconcile;
