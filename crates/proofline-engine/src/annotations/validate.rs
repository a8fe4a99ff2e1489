//! Position validation and drift repair.
//!
//! A reported range is trusted only if the current text still holds the
//! expected substring there. Otherwise the validator searches outward from
//! the claimed start, first exactly and then with whitespace collapsed, and
//! proposes a repaired range.

use serde::{Deserialize, Serialize};

use crate::Span;
use crate::text::normalize_with_offsets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// First search radius around the claimed start, in characters
    pub window: usize,
    /// Multiplier applied to `window` for the second exact pass and the fuzzy pass
    pub expansion: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            window: 100,
            expansion: 4,
        }
    }
}

/// Outcome of validating one claimed range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    /// Set when the substring was found somewhere other than the claimed range
    pub repaired: Option<Span>,
}

impl Validation {
    const INVALID: Validation = Validation {
        valid: false,
        repaired: None,
    };

    /// Where the annotation belongs in the current text, if anywhere
    pub fn resolved(&self, claimed: Span) -> Option<Span> {
        if !self.valid {
            return None;
        }
        Some(self.repaired.unwrap_or(claimed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionValidator {
    config: ValidatorConfig,
}

impl PositionValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Check that `expected` sits at `claimed` in `current_text`, repairing
    /// the range when it has drifted nearby.
    pub fn validate(&self, expected: &str, claimed: Span, current_text: &str) -> Validation {
        let target: Vec<char> = expected.chars().collect();
        if target.is_empty() {
            return Validation::INVALID;
        }
        let text: Vec<char> = current_text.chars().collect();

        if matches_at(&text, &target, claimed.start) && claimed.len() == target.len() {
            return Validation {
                valid: true,
                repaired: None,
            };
        }

        let near = self.config.window;
        let far = near.saturating_mul(self.config.expansion.max(1));

        let exact = search_outward(&text, &target, claimed.start, 0, near)
            .or_else(|| search_outward(&text, &target, claimed.start, near + 1, far));
        if let Some(start) = exact {
            log::debug!(
                "Repaired {:?} from {}..{} to {}..{}",
                expected,
                claimed.start,
                claimed.end,
                start,
                start + target.len()
            );
            return Validation {
                valid: true,
                repaired: Some(Span::new(start, start + target.len())),
            };
        }

        match fuzzy_search(&text, &target, claimed.start, far) {
            Some(span) => {
                log::debug!("Fuzzy-repaired {:?} to {}..{}", expected, span.start, span.end);
                Validation {
                    valid: true,
                    repaired: Some(span),
                }
            }
            None => Validation::INVALID,
        }
    }
}

fn matches_at(text: &[char], target: &[char], start: usize) -> bool {
    start
        .checked_add(target.len())
        .and_then(|end| text.get(start..end))
        == Some(target)
}

/// Exact search at distances `min..=max` from `origin`, trying `+d` before `-d`
fn search_outward(
    text: &[char],
    target: &[char],
    origin: usize,
    min: usize,
    max: usize,
) -> Option<usize> {
    (min..=max).find_map(|d| {
        let forward = origin.checked_add(d).filter(|&at| matches_at(text, target, at));
        let backward = || {
            origin
                .checked_sub(d)
                .filter(|&at| d > 0 && matches_at(text, target, at))
        };
        forward.or_else(backward)
    })
}

/// Whitespace-insensitive search within `radius` of `origin`.
///
/// Picks the match closest to `origin` and maps it back onto the original
/// characters, so the returned span may cover more whitespace than `target`.
fn fuzzy_search(text: &[char], target: &[char], origin: usize, radius: usize) -> Option<Span> {
    let (needle, _) = normalize_with_offsets(target);
    if needle.is_empty() {
        return None;
    }

    let lo = origin.saturating_sub(radius).min(text.len());
    let hi = origin
        .saturating_add(radius)
        .saturating_add(target.len())
        .min(text.len());
    let (haystack, origins) = normalize_with_offsets(&text[lo..hi]);
    if haystack.len() < needle.len() {
        return None;
    }

    (0..=haystack.len() - needle.len())
        .filter(|&i| haystack[i..i + needle.len()] == needle[..])
        .map(|i| {
            let start = lo + origins[i];
            let end = lo + origins[i + needle.len() - 1] + 1;
            Span::new(start, end)
        })
        .min_by_key(|span| span.start.abs_diff(origin))
}
