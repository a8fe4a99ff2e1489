//! # Annotation session
//!
//! [`AnnotationSession`] owns the tracked annotation set for one editable
//! surface and wires the pipeline together:
//!
//! ```text
//! edit ─► on_input ─► extract ─► diff/classify ─► reconcile ─► render
//!                                       │
//!                                       └─► Trigger (host schedules a check)
//!
//! check ─► begin_check ─► cache? ─► run_check (annotator) ─► complete_check
//!                                                     validate/repair ─► render
//! ```
//!
//! Requests may overlap. Each [`CheckTicket`] carries the generation it was
//! issued under and a completion for an older generation is discarded, so
//! only the newest response is ever applied.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::annotations::{
    AnnotationStatus, CheckResponse, DropReason, PositionValidator, TrackedError,
    ValidatorConfig, parse_check_response,
};
use crate::cache::{CacheStats, SharedCache};
use crate::editing::{ChangeClass, TextChange, classify, diff, reconcile};
use crate::extract::extract;
use crate::render::{RenderReport, render};
use crate::schedule::{SchedulePolicy, Trigger};
use crate::surface::EditableSurface;
use crate::text::char_len;
use crate::{EngineError, Span};

/// The remote annotation service
#[async_trait]
pub trait AnnotatorClient: Send + Sync {
    /// Annotate `text`, returning the raw JSON response body
    async fn check(&self, text: &str) -> anyhow::Result<serde_json::Value>;
}

/// What happens to annotations an edit touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevalidationPolicy {
    /// Re-run position validation immediately; repaired ones stay, the rest go
    #[default]
    Relocate,
    /// Drop them until the next check
    Drop,
    /// Keep them unpainted until the next check replaces the set
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Longest text sent to the annotator, in characters
    pub max_text_len: usize,
    pub request_timeout_ms: u64,
    pub revalidation: RevalidationPolicy,
    /// Drop every annotation after a substantial edit instead of reconciling
    pub clear_on_substantial: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_text_len: 10_000,
            request_timeout_ms: 15_000,
            revalidation: RevalidationPolicy::Relocate,
            clear_on_substantial: true,
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct InputOutcome {
    pub change: TextChange,
    pub class: ChangeClass,
    pub trigger: Trigger,
    /// The surface was repainted, because the tracked set changed or the
    /// edit touched a painted range
    pub repainted: bool,
}

/// A check issued against one text snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct CheckTicket {
    pub generation: u64,
    pub text: String,
    /// Result found in the cache when the check began
    pub cached: Option<CheckResponse>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Applied {
        from_cache: bool,
        report: RenderReport,
        /// Annotations moved by drift repair
        repaired: usize,
        /// Dropped by parsing, validation or overlap
        dropped: usize,
    },
    /// A newer check was issued; this result was discarded
    Stale,
    /// The previous annotations were kept
    Failed(EngineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Idle,
    InFlight,
    Failed(String),
}

type Listener = Box<dyn FnMut(&[TrackedError]) + Send>;

pub struct AnnotationSession {
    config: SessionConfig,
    schedule: SchedulePolicy,
    validator: PositionValidator,
    cache: SharedCache<CheckResponse>,
    annotations: Vec<TrackedError>,
    last_text: String,
    generation: u64,
    status: CheckStatus,
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for AnnotationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationSession")
            .field("config", &self.config)
            .field("annotations", &self.annotations.len())
            .field("generation", &self.generation)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl AnnotationSession {
    pub fn new(cache: SharedCache<CheckResponse>) -> Self {
        Self {
            config: SessionConfig::default(),
            schedule: SchedulePolicy::default(),
            validator: PositionValidator::default(),
            cache,
            annotations: Vec::new(),
            last_text: String::new(),
            generation: 0,
            status: CheckStatus::Idle,
            listeners: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_schedule(mut self, schedule: SchedulePolicy) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_validator(mut self, config: ValidatorConfig) -> Self {
        self.validator = PositionValidator::new(config);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn schedule(&self) -> &SchedulePolicy {
        &self.schedule
    }

    pub fn annotations(&self) -> &[TrackedError] {
        &self.annotations
    }

    pub fn status(&self) -> &CheckStatus {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Called with the full annotation set whenever it changes
    pub fn on_annotations_changed<F>(&mut self, listener: F)
    where
        F: FnMut(&[TrackedError]) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Record that the surface was edited.
    ///
    /// Reconciles the tracked set against the edit and returns the trigger the
    /// host should schedule a check with. The surface is repainted when the set
    /// changed or when the edit landed in or next to a painted marker, where the
    /// host may have grown the marker itself.
    pub fn on_input<S: EditableSurface>(&mut self, surface: &mut S) -> InputOutcome {
        let flat = extract(surface);
        let change = diff(&self.last_text, &flat.text);
        let class = classify(&change, &flat.text, self.schedule.substantial_threshold);
        let trigger = self.schedule.decide(&change, &class);
        self.last_text = flat.text;

        if change.is_noop() {
            return InputOutcome {
                change,
                class,
                trigger,
                repainted: false,
            };
        }

        let edited = Span::new(change.start, change.end);
        let touches_painted = self
            .annotations
            .iter()
            .any(|a| a.is_paintable() && touches(a.current_range, edited));

        let updated = if class.substantial && self.config.clear_on_substantial {
            log::debug!(
                "Substantial edit of {} chars; clearing {} annotations",
                class.size_delta,
                self.annotations.len()
            );
            Vec::new()
        } else {
            let reconciled = reconcile(&self.annotations, &change, flat.map.len());
            let (kept, overlapping) = drop_overlaps(self.revalidate(reconciled));
            if overlapping > 0 {
                log::debug!("Dropped {overlapping} annotations relocated onto another");
            }
            kept
        };

        let changed = updated != self.annotations;
        if changed {
            self.replace_annotations(surface, updated);
        } else if touches_painted {
            render(surface, &self.annotations);
        }
        let repainted = changed || touches_painted;

        InputOutcome {
            change,
            class,
            trigger,
            repainted,
        }
    }

    /// Start a check of the surface's current text.
    ///
    /// Blank or oversized text is rejected here and never reaches the cache
    /// or the annotator.
    pub fn begin_check<S: EditableSurface>(&mut self, surface: &S) -> Result<CheckTicket, EngineError> {
        let text = extract(surface).text;
        if text.trim().is_empty() {
            return Err(EngineError::EmptyText);
        }
        let len = char_len(&text);
        if len > self.config.max_text_len {
            return Err(EngineError::TextTooLong {
                len,
                max: self.config.max_text_len,
            });
        }

        self.generation += 1;
        self.status = CheckStatus::InFlight;
        let cached = self.cache.lock().get(&text).map(|entry| entry.result);
        if cached.is_some() {
            log::debug!("Check generation {} served from cache", self.generation);
        }

        Ok(CheckTicket {
            generation: self.generation,
            text,
            cached,
        })
    }

    /// Apply the result of a check started with [`begin_check`](Self::begin_check)
    pub fn complete_check<S: EditableSurface>(
        &mut self,
        surface: &mut S,
        ticket: CheckTicket,
        result: Result<CheckResponse, EngineError>,
    ) -> CheckOutcome {
        let from_cache = ticket.cached.is_some();
        if let Ok(response) = &result
            && !from_cache
        {
            self.cache.lock().set(&ticket.text, response.clone());
        }

        if ticket.generation != self.generation {
            log::debug!(
                "Discarding stale check generation {} (current {})",
                ticket.generation,
                self.generation
            );
            return CheckOutcome::Stale;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                log::warn!("Check failed, keeping previous annotations: {err}");
                self.status = CheckStatus::Failed(err.to_string());
                return CheckOutcome::Failed(err);
            }
        };

        let flat = extract(surface);
        let mut dropped = response.dropped;
        let mut repaired = 0;
        let mut accepted: Vec<TrackedError> = Vec::with_capacity(response.annotations.len());

        for raw in response.annotations {
            let claimed = Span::new(raw.start, raw.end);
            let validation = self.validator.validate(&raw.original, claimed, &flat.text);
            match validation.resolved(claimed) {
                Some(span) => {
                    if validation.repaired.is_some() {
                        repaired += 1;
                    }
                    accepted.push(TrackedError::from_raw(raw, span));
                }
                None => {
                    let reason = DropReason::Unrepairable(raw.original);
                    log::warn!("Dropping annotation {}: {reason}", raw.id);
                    dropped += 1;
                }
            }
        }

        let (annotations, overlapping) = drop_overlaps(accepted);
        dropped += overlapping;

        self.last_text = flat.text;
        self.status = CheckStatus::Idle;
        let report = self.replace_annotations(surface, annotations);

        CheckOutcome::Applied {
            from_cache,
            report,
            repaired,
            dropped,
        }
    }

    /// Check immediately, bypassing any debounce
    pub async fn check_now<S: EditableSurface>(
        &mut self,
        surface: &mut S,
        client: &dyn AnnotatorClient,
    ) -> Result<CheckOutcome, EngineError> {
        let ticket = self.begin_check(surface)?;
        let result = run_check(client, &ticket, self.config.request_timeout()).await;
        Ok(self.complete_check(surface, ticket, result))
    }

    /// Drop every annotation and its markers
    pub fn clear<S: EditableSurface>(&mut self, surface: &mut S) {
        if !self.annotations.is_empty() {
            self.replace_annotations(surface, Vec::new());
        }
    }

    /// Apply the revalidation policy to annotations an edit touched.
    ///
    /// A relocated annotation must still touch its reconciled range; finding
    /// the same substring elsewhere means the anchored text itself was edited.
    fn revalidate(&self, annotations: Vec<TrackedError>) -> Vec<TrackedError> {
        annotations
            .into_iter()
            .filter_map(|mut annotation| {
                if annotation.status != AnnotationStatus::NeedsRevalidation {
                    return Some(annotation);
                }
                match self.config.revalidation {
                    RevalidationPolicy::Keep => Some(annotation),
                    RevalidationPolicy::Drop => None,
                    RevalidationPolicy::Relocate => {
                        let resolved = self
                            .validator
                            .validate(
                                &annotation.original_substring,
                                annotation.current_range,
                                &self.last_text,
                            )
                            .resolved(annotation.current_range);
                        match resolved {
                            Some(span) if touches(span, annotation.current_range) => {
                                annotation.current_range = span;
                                annotation.status = AnnotationStatus::Pending;
                                Some(annotation)
                            }
                            _ => {
                                log::debug!(
                                    "Annotation {} no longer matches {:?}",
                                    annotation.id,
                                    annotation.original_substring
                                );
                                None
                            }
                        }
                    }
                }
            })
            .collect()
    }

    fn replace_annotations<S: EditableSurface>(
        &mut self,
        surface: &mut S,
        annotations: Vec<TrackedError>,
    ) -> RenderReport {
        self.annotations = annotations;
        let report = render(surface, &self.annotations);
        for listener in &mut self.listeners {
            listener(&self.annotations);
        }
        report
    }
}

/// Sort by position and drop every annotation overlapping an earlier one.
/// Returns the survivors and how many were dropped.
fn drop_overlaps(mut annotations: Vec<TrackedError>) -> (Vec<TrackedError>, usize) {
    annotations.sort_by_key(|a| (a.current_range.start, a.current_range.end));
    let mut kept: Vec<TrackedError> = Vec::with_capacity(annotations.len());
    let mut dropped = 0;
    for annotation in annotations {
        if let Some(previous) = kept
            .last()
            .filter(|p| p.current_range.intersects(annotation.current_range))
        {
            log::debug!(
                "Dropping annotation {}: {}",
                annotation.id,
                DropReason::Overlaps(previous.id.clone())
            );
            dropped += 1;
            continue;
        }
        kept.push(annotation);
    }
    (kept, dropped)
}

/// Closed-interval overlap, so empty spans and shared boundaries count
fn touches(a: Span, b: Span) -> bool {
    a.start <= b.end && b.start <= a.end
}

/// Resolve a ticket: the cached result, or a call to `client` bounded by `timeout`
pub async fn run_check(
    client: &dyn AnnotatorClient,
    ticket: &CheckTicket,
    timeout: Duration,
) -> Result<CheckResponse, EngineError> {
    if let Some(cached) = &ticket.cached {
        return Ok(cached.clone());
    }

    let body = match tokio::time::timeout(timeout, client.check(&ticket.text)).await {
        Ok(Ok(body)) => body,
        Ok(Err(err)) => return Err(EngineError::CheckFailed(format!("{err:#}"))),
        Err(_) => {
            return Err(EngineError::CheckFailed(format!(
                "no response within {timeout:?}"
            )));
        }
    };
    parse_check_response(&body, char_len(&ticket.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AnnotationCache, CacheConfig};
    use crate::surface::TextTree;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        body: Value,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnnotatorClient for Fixed {
        async fn check(&self, _text: &str) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl AnnotatorClient for Unreachable {
        async fn check(&self, _text: &str) -> anyhow::Result<Value> {
            anyhow::bail!("connection refused")
        }
    }

    fn session() -> AnnotationSession {
        AnnotationSession::new(AnnotationCache::shared(CacheConfig::default()))
    }

    fn teh_client() -> Fixed {
        Fixed {
            body: json!({"errors": [{
                "id": "e1", "kind": "spelling", "start": 0, "end": 3,
                "original": "Teh", "suggestions": ["The"]
            }]}),
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn check_now_paints_and_caches() {
        let mut tree = TextTree::from_plain_text("Teh cat sat on the mat");
        let mut session = session();
        session.on_input(&mut tree);
        let client = teh_client();

        let outcome = session.check_now(&mut tree, &client).await.unwrap();

        assert!(matches!(outcome, CheckOutcome::Applied { from_cache: false, .. }));
        assert_eq!(session.annotations().len(), 1);
        assert_eq!(tree.marker_nodes().len(), 1);
        assert_eq!(session.status(), &CheckStatus::Idle);

        let again = session.check_now(&mut tree, &client).await.unwrap();
        assert!(matches!(again, CheckOutcome::Applied { from_cache: true, .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn input_guard_rejects_blank_and_oversized_text() {
        let mut session = session().with_config(SessionConfig {
            max_text_len: 5,
            ..SessionConfig::default()
        });
        let client = teh_client();

        let mut blank = TextTree::from_plain_text("   ");
        let err = session.check_now(&mut blank, &client).await.unwrap_err();
        assert_eq!(err, EngineError::EmptyText);

        let mut long = TextTree::from_plain_text("far too long");
        let err = session.check_now(&mut long, &client).await.unwrap_err();
        assert!(err.is_input_rejection());

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.generation(), 0);
    }

    #[tokio::test]
    async fn failure_keeps_previous_annotations() {
        let mut tree = TextTree::from_plain_text("Teh cat sat on the mat");
        let mut session = session();
        session.check_now(&mut tree, &teh_client()).await.unwrap();

        let block = tree.children(tree.root_id())[0];
        let tail = *tree.children(block).last().unwrap();
        let len = tree.text(tail).unwrap().chars().count();
        tree.insert_text(tail, len, "!");
        session.on_input(&mut tree);
        let outcome = session.check_now(&mut tree, &Unreachable).await.unwrap();

        assert!(matches!(outcome, CheckOutcome::Failed(EngineError::CheckFailed(_))));
        assert!(matches!(session.status(), CheckStatus::Failed(_)));
        assert_eq!(session.annotations().len(), 1);
    }

    #[tokio::test]
    async fn typing_before_an_annotation_shifts_it() {
        let mut tree = TextTree::from_plain_text("Teh cat sat on the mat");
        let mut session = session();
        session.check_now(&mut tree, &teh_client()).await.unwrap();

        // Painting split the leaf; the marker is now the block's first child
        let block = tree.children(tree.root_id())[0];
        let marker = tree.children(block)[0];
        let inner = tree.children(marker)[0];
        tree.insert_text(inner, 0, "Well ");
        let outcome = session.on_input(&mut tree);

        assert!(outcome.repainted);
        assert_eq!(session.annotations()[0].current_range, Span::new(5, 8));
        assert_eq!(session.annotations()[0].status, AnnotationStatus::Pending);
    }

    #[tokio::test]
    async fn listeners_see_every_replacement() {
        let mut tree = TextTree::from_plain_text("Teh cat sat on the mat");
        let seen = Arc::new(AtomicUsize::new(0));
        let mut session = session();
        let counter = seen.clone();
        session.on_annotations_changed(move |set| {
            counter.store(set.len() + 100, Ordering::SeqCst);
        });

        session.check_now(&mut tree, &teh_client()).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 101);

        session.clear(&mut tree);
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    fn tracked(id: &str, start: usize, end: usize) -> TrackedError {
        TrackedError {
            id: id.to_string(),
            kind: "spelling".to_string(),
            original_substring: "Teh".to_string(),
            suggestions: vec!["The".to_string()],
            explanation: String::new(),
            confidence: 1.0,
            status: AnnotationStatus::Pending,
            original_range: Span::new(start, end),
            current_range: Span::new(start, end),
        }
    }

    #[test]
    fn drop_overlaps_keeps_the_earliest_of_each_cluster() {
        let (kept, dropped) = drop_overlaps(vec![
            tracked("late", 9, 12),
            tracked("dup", 9, 12),
            tracked("first", 0, 3),
            tracked("adjacent", 3, 5),
        ]);

        let ids: Vec<&str> = kept.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "adjacent", "late"]);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn touches_counts_shared_boundaries_and_empty_spans() {
        assert!(touches(Span::new(0, 3), Span::new(3, 3)));
        assert!(touches(Span::new(4, 4), Span::new(0, 4)));
        assert!(!touches(Span::new(0, 3), Span::new(4, 6)));
    }

    #[test]
    fn substantial_edit_clears_annotations() {
        let mut tree = TextTree::from_plain_text("Teh cat sat on the mat");
        let mut session = session();
        session.on_input(&mut tree);
        let ticket = session.begin_check(&tree).unwrap();
        let response = parse_check_response(&teh_client().body, 22).unwrap();
        session.complete_check(&mut tree, ticket, Ok(response));
        assert_eq!(session.annotations().len(), 1);

        let block = tree.append_block(tree.root_id());
        tree.append_text(block, &"pasted words ".repeat(6));
        let outcome = session.on_input(&mut tree);

        assert!(outcome.class.substantial);
        assert!(matches!(outcome.trigger, Trigger::Immediate(_)));
        assert!(session.annotations().is_empty());
        assert!(tree.marker_nodes().is_empty());
    }
}
