use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde::Serialize;

use crate::Span;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s*$").expect("static sentence pattern"));

/// Default size delta at which an edit counts as substantial
pub const DEFAULT_SUBSTANTIAL_THRESHOLD: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Delete,
    Replace,
}

/// Minimal edit turning one flat text into the next.
///
/// `start..end` are character offsets into the *old* text and
/// `old_substring` is exactly that slice; `new_substring` takes its place.
#[derive(Debug, Clone)]
pub struct TextChange {
    pub kind: ChangeKind,
    pub start: usize,
    pub end: usize,
    pub old_substring: String,
    pub new_substring: String,
    pub timestamp: Instant,
}

impl TextChange {
    /// Characters added (positive) or removed (negative) by this change
    pub fn length_delta(&self) -> isize {
        self.new_len() as isize - self.old_len() as isize
    }

    pub fn old_len(&self) -> usize {
        self.end - self.start
    }

    pub fn new_len(&self) -> usize {
        self.new_substring.chars().count()
    }

    /// Where the replacement text sits in the new text
    pub fn inserted_span(&self) -> Span {
        Span::new(self.start, self.start + self.new_len())
    }

    /// Old and new text were identical
    pub fn is_noop(&self) -> bool {
        self.old_substring.is_empty() && self.new_substring.is_empty()
    }

    /// Replay the change against the text it was computed from
    pub fn apply(&self, old: &str) -> String {
        let mut out = String::with_capacity(old.len() + self.new_substring.len());
        out.extend(old.chars().take(self.start));
        out.push_str(&self.new_substring);
        out.extend(old.chars().skip(self.end));
        out
    }
}

/// Scheduling hints derived from a change; they never affect correctness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeClass {
    pub size_delta: usize,
    pub substantial: bool,
    pub sentence_complete: bool,
}

/// Trim the common prefix and suffix of `old` and `new`.
///
/// The result is the shortest differing region, not a word-level diff:
/// typing "aa" after "a" reports an insert at offset 1.
pub fn diff(old: &str, new: &str) -> TextChange {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let mut start = 0;
    while start < old_chars.len() && start < new_chars.len() && old_chars[start] == new_chars[start]
    {
        start += 1;
    }

    let mut old_end = old_chars.len();
    let mut new_end = new_chars.len();
    while old_end > start && new_end > start && old_chars[old_end - 1] == new_chars[new_end - 1] {
        old_end -= 1;
        new_end -= 1;
    }

    let kind = if old_end == start {
        ChangeKind::Insert
    } else if new_end == start {
        ChangeKind::Delete
    } else {
        ChangeKind::Replace
    };

    TextChange {
        kind,
        start,
        end: old_end,
        old_substring: old_chars[start..old_end].iter().collect(),
        new_substring: new_chars[start..new_end].iter().collect(),
        timestamp: Instant::now(),
    }
}

/// Size and sentence-boundary classification of `change`
pub fn classify(change: &TextChange, new_text: &str, threshold: usize) -> ChangeClass {
    let size_delta = change.length_delta().unsigned_abs();
    ChangeClass {
        size_delta,
        substantial: size_delta >= threshold,
        sentence_complete: change.kind == ChangeKind::Insert
            && !change.is_noop()
            && SENTENCE_END.is_match(new_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("The cat", "The fat cat", ChangeKind::Insert, 4, 4, "", "fat ")]
    #[case("The fat cat", "The cat", ChangeKind::Delete, 4, 8, "fat ", "")]
    #[case("The cat sat", "The dog sat", ChangeKind::Replace, 4, 7, "cat", "dog")]
    #[case("a", "aa", ChangeKind::Insert, 1, 1, "", "a")]
    #[case("", "hello", ChangeKind::Insert, 0, 0, "", "hello")]
    #[case("hello", "", ChangeKind::Delete, 0, 5, "hello", "")]
    #[case("same", "same", ChangeKind::Insert, 4, 4, "", "")]
    fn diff_trims_common_affixes(
        #[case] old: &str,
        #[case] new: &str,
        #[case] kind: ChangeKind,
        #[case] start: usize,
        #[case] end: usize,
        #[case] old_sub: &str,
        #[case] new_sub: &str,
    ) {
        let change = diff(old, new);

        assert_eq!(change.kind, kind);
        assert_eq!((change.start, change.end), (start, end));
        assert_eq!(change.old_substring, old_sub);
        assert_eq!(change.new_substring, new_sub);
    }

    #[test]
    fn diff_uses_character_offsets() {
        let change = diff("café bar", "café au bar");

        assert_eq!(change.start, 5);
        assert_eq!(change.new_substring, "au ");
        assert_eq!(change.inserted_span(), Span::new(5, 8));
    }

    #[test]
    fn identical_text_is_a_noop() {
        assert!(diff("x", "x").is_noop());
        assert!(!diff("x", "y").is_noop());
    }

    #[rstest]
    #[case("Hello", "Hello world.", false, true)]
    #[case("Hello", "Hello world!  ", false, true)]
    #[case("Hello world.", "Hello world", false, false)]
    #[case("Hello", "Hello wor", false, false)]
    fn classify_detects_sentence_end(
        #[case] old: &str,
        #[case] new: &str,
        #[case] substantial: bool,
        #[case] sentence_complete: bool,
    ) {
        let change = diff(old, new);
        let class = classify(&change, new, DEFAULT_SUBSTANTIAL_THRESHOLD);

        assert_eq!(class.substantial, substantial);
        assert_eq!(class.sentence_complete, sentence_complete);
    }

    #[test]
    fn classify_flags_substantial_paste() {
        let pasted = "x".repeat(60);
        let change = diff("start ", &format!("start {pasted}"));
        let class = classify(&change, &format!("start {pasted}"), 50);

        assert_eq!(class.size_delta, 60);
        assert!(class.substantial);
    }

    proptest! {
        #[test]
        fn applying_diff_reproduces_new_text(a in "[abc é]{0,12}", b in "[abc é]{0,12}") {
            let change = diff(&a, &b);
            prop_assert_eq!(change.apply(&a), b.clone());
            let old_slice: String = a.chars().skip(change.start).take(change.end - change.start).collect();
            prop_assert_eq!(change.old_substring.clone(), old_slice);
        }

        #[test]
        fn diff_start_is_longest_common_prefix(a in "[ab]{0,10}", b in "[ab]{0,10}") {
            let change = diff(&a, &b);
            let prefix = a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
            prop_assert_eq!(change.start, prefix);

            // Suffix trim is maximal: the characters just inside both ends differ
            // unless one side of the change is empty.
            let old: Vec<char> = a.chars().collect();
            let new: Vec<char> = b.chars().collect();
            let new_end = change.start + change.new_len();
            if change.end > change.start && new_end > change.start {
                prop_assert_ne!(old[change.end - 1], new[new_end - 1]);
            }
        }
    }
}
