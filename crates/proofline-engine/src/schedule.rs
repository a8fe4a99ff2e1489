//! When to ask the annotator again.
//!
//! [`SchedulePolicy`] turns a classified edit into a [`Trigger`]; the
//! [`Debouncer`] runs the resulting deferred check and cancels it whenever a
//! newer edit reschedules.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::editing::{ChangeClass, DEFAULT_SUBSTANTIAL_THRESHOLD, TextChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePolicy {
    /// Delay after ordinary typing
    pub debounce_ms: u64,
    /// Delay after a finished sentence or a substantial edit
    pub immediate_ms: u64,
    /// Size delta at which an edit counts as substantial
    pub substantial_threshold: usize,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            immediate_ms: 100,
            substantial_threshold: DEFAULT_SUBSTANTIAL_THRESHOLD,
        }
    }
}

/// How soon a check should run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Ordinary typing; wait for a pause
    Debounce(Duration),
    /// Sentence finished or large paste
    Immediate(Duration),
    /// Document load or explicit request
    Force,
}

impl Trigger {
    pub fn delay(&self) -> Duration {
        match self {
            Trigger::Debounce(delay) | Trigger::Immediate(delay) => *delay,
            Trigger::Force => Duration::ZERO,
        }
    }
}

impl SchedulePolicy {
    pub fn decide(&self, change: &TextChange, class: &ChangeClass) -> Trigger {
        if !change.is_noop() && (class.sentence_complete || class.substantial) {
            Trigger::Immediate(Duration::from_millis(self.immediate_ms))
        } else {
            Trigger::Debounce(Duration::from_millis(self.debounce_ms))
        }
    }
}

/// A single cancelable deferred task.
///
/// Scheduling replaces (and cancels) whatever was pending. Dropping the
/// debouncer cancels the pending task too.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless cancelled or rescheduled first
    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            if delay > Duration::ZERO {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sleep(delay) => {}
                }
            } else if token.is_cancelled() {
                return;
            }
            task.await;
        });

        self.pending = Some(Pending { cancel, handle });
    }

    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
        }
    }

    /// A scheduled task has not yet finished or been cancelled
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| !p.cancel.is_cancelled() && !p.handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
