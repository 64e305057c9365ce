//! Observer hooks and an in-memory recorder of finished invocations.
//!
//! Observers are registered on a mounted story and called at fixed points of
//! every invocation. They only ever see the context by shared reference.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Context;
use crate::failures::Reason;

/// Get the current Unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Unique identifier of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub Uuid);

impl InvocationId {
    /// Create a new random invocation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Observer Trait
// ============================================================================

/// Listener called by the execution engine.
///
/// Every hook has an empty default, so implementors pick what they need.
pub trait Observer: Send + Sync + 'static {
    /// The context was built from the validated call arguments.
    fn context_created(&self, _id: InvocationId, _story: &str, _ctx: &Context) {}

    /// A step is about to run.
    fn step_invoked(&self, _id: InvocationId, _step: &str, _ctx: &Context) {}

    /// A step reported a legal business failure.
    fn failure_raised(&self, _id: InvocationId, _step: &str, _reason: Option<&Reason>) {}

    /// The invocation ended, successfully or not.
    fn finished(&self, _id: InvocationId, _story: &str, _ctx: &Context) {}
}

// ============================================================================
// Recorder
// ============================================================================

/// A finished invocation, rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The invocation ID.
    pub id: InvocationId,

    /// `Class.story` of the invoked story.
    pub story: String,

    /// Trace and context, as printed by the context's `Display`.
    pub rendered: String,

    /// When the invocation finished (Unix millis).
    pub finished_at: u64,
}

/// Observer keeping a log of finished invocations in memory.
///
/// Uses `parking_lot::RwLock` for thread-safe access.
#[derive(Debug, Default)]
pub struct Recorder {
    records: RwLock<Vec<Record>>,
}

impl Recorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// All records, oldest first.
    pub fn records(&self) -> Vec<Record> {
        self.records.read().clone()
    }

    /// The most recent record.
    pub fn last(&self) -> Option<Record> {
        self.records.read().last().cloned()
    }

    /// Get the number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl Observer for Recorder {
    fn finished(&self, id: InvocationId, story: &str, ctx: &Context) {
        self.records.write().push(Record {
            id,
            story: story.to_string(),
            rendered: ctx.to_string(),
            finished_at: now_millis(),
        });
    }
}
