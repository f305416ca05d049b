//! Harvest status and lifecycle tracking.
//!
//! A [`HarvestStatus`] is shared by every worker of one harvest. Counters are
//! atomic; the lifecycle and the message log sit behind one mutex so that
//! exactly one caller performs the terminal bookkeeping.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared count of a source that cannot tell how many entities it has.
pub const UNKNOWN_COUNT: i64 = -1;

/// Maximum number of messages kept in a status log.
pub const MESSAGE_CAPACITY: usize = 100;

/// Lifecycle of one harvest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    New,
    Running,
    Succeeded,
    Aborted,
    Failed,
}

impl Lifecycle {
    /// Whether further progress may still be recorded.
    pub fn is_open(self) -> bool {
        matches!(self, Lifecycle::New | Lifecycle::Running)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::New => "NEW",
            Lifecycle::Running => "RUNNING",
            Lifecycle::Succeeded => "SUCCEEDED",
            Lifecycle::Aborted => "ABORTED",
            Lifecycle::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct StatusState {
    lifecycle: Lifecycle,
    messages: VecDeque<String>,
}

/// Thread-safe progress of one harvest.
#[derive(Debug)]
pub struct HarvestStatus {
    id: String,
    source_key: String,
    started_at: DateTime<Utc>,
    declared: AtomicI64,
    max: AtomicI64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    state: Mutex<StatusState>,
}

impl HarvestStatus {
    pub fn new(source_key: impl Into<String>) -> Self {
        let source_key = source_key.into();
        let started_at = Utc::now();
        Self {
            id: format!("{}-{}", source_key, started_at.format("%Y%m%dT%H%M%S")),
            source_key,
            started_at,
            declared: AtomicI64::new(UNKNOWN_COUNT),
            max: AtomicI64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            state: Mutex::new(StatusState {
                lifecycle: Lifecycle::New,
                messages: VecDeque::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    fn state(&self) -> MutexGuard<'_, StatusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move from `New` to `Running`. No effect in any other state.
    pub fn start(&self) {
        let mut state = self.state();
        if state.lifecycle == Lifecycle::New {
            state.lifecycle = Lifecycle::Running;
        }
    }

    /// Terminal transition for a run that could not get started.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut state = self.state();
        if state.lifecycle.is_open() {
            state.lifecycle = Lifecycle::Failed;
            push_message(&mut state.messages, reason.into());
        }
    }

    /// Record the source's self-reported count; [`UNKNOWN_COUNT`] if unknown.
    pub fn set_declared_count(&self, count: i64) {
        self.declared.store(count, Ordering::SeqCst);
    }

    pub fn declared_count(&self) -> i64 {
        self.declared.load(Ordering::SeqCst)
    }

    /// Cap the number of entities to process. Zero or less means no cap.
    pub fn set_max_count(&self, count: i64) {
        self.max.store(count, Ordering::SeqCst);
    }

    pub fn max_count(&self) -> Option<i64> {
        let max = self.max.load(Ordering::SeqCst);
        (max > 0).then_some(max)
    }

    /// The number of entities this harvest is expected to account for.
    pub fn canonical_count(&self) -> i64 {
        let declared = self.declared_count();
        match self.max_count() {
            Some(max) => declared.min(max),
            None => declared,
        }
    }

    pub fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_failed(&self, delta: u64) {
        self.failed.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state().lifecycle
    }

    /// Append a diagnostic message, evicting the oldest past capacity.
    pub fn add_message(&self, message: impl Into<String>) {
        push_message(&mut self.state().messages, message.into());
    }

    pub fn messages(&self) -> Vec<String> {
        self.state().messages.iter().cloned().collect()
    }

    /// Whether more entities may be processed.
    ///
    /// A source may hold fewer entities than it declares, so only an explicit
    /// cap closes the status before a terminal transition.
    pub fn is_open(&self) -> bool {
        if !self.lifecycle().is_open() {
            return false;
        }
        match self.max_count() {
            Some(max) => ((self.succeeded() + self.failed()) as i64) < max,
            None => true,
        }
    }

    /// Terminal transition after cancellation. Returns whether this call
    /// performed the transition.
    pub fn abort(&self) -> bool {
        self.close(Lifecycle::Aborted)
    }

    /// Terminal transition after the source ran out. Returns whether this
    /// call performed the transition.
    pub fn end(&self) -> bool {
        self.close(Lifecycle::Succeeded)
    }

    fn close(&self, terminal: Lifecycle) -> bool {
        let mut state = self.state();
        if !state.lifecycle.is_open() {
            return false;
        }

        let processed = self.succeeded() + self.failed();
        let remaining = self.canonical_count() - processed as i64;
        if remaining > 0 {
            self.add_failed(remaining as u64);
            let message = match terminal {
                Lifecycle::Aborted => format!(
                    "Harvest aborted with {remaining} entities outstanding; presuming them failed"
                ),
                _ => format!(
                    "Source declared {} entities but only {processed} were discovered; \
                     presuming {remaining} failed",
                    self.canonical_count()
                ),
            };
            push_message(&mut state.messages, message);
        }
        state.lifecycle = terminal;
        true
    }

    /// Point-in-time copy suitable for sending to a sink.
    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state();
        StatusSnapshot {
            id: self.id.clone(),
            source_key: self.source_key.clone(),
            started_at: self.started_at,
            lifecycle: state.lifecycle,
            num_declared: self.declared_count(),
            max: self.max_count(),
            num_succeeded: self.succeeded(),
            num_failed: self.failed(),
            messages: state.messages.iter().cloned().collect(),
        }
    }
}

fn push_message(messages: &mut VecDeque<String>, message: String) {
    messages.push_back(message);
    while messages.len() > MESSAGE_CAPACITY {
        messages.pop_front();
    }
}

/// Serializable copy of a [`HarvestStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub id: String,
    pub source_key: String,
    pub started_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
    pub num_declared: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    pub num_succeeded: u64,
    pub num_failed: u64,
    pub messages: Vec<String>,
}
