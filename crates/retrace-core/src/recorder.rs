//! Lookup recording protocol.
//!
//! A compiler front end reports every name resolution through the
//! [`LookupTracker`] trait. [`LookupRecorder`] is the implementation used by
//! the harness: it appends every event, in call order and with multiplicity,
//! interning all strings on the way in. Deduplication happens only when
//! annotations are rendered.
//!
//! A fresh recorder is created for every build step and consumed with
//! [`LookupRecorder::finish`], so raw events never leak across steps.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::intern::{StrId, StringInterner};
use crate::types::{LookupInfo, Position, ScopeKind};

/// Sink a compiler calls into for every name resolution.
///
/// Implementations must tolerate concurrent calls from several threads.
pub trait LookupTracker: Send + Sync {
    /// Whether the compiler must supply real positions.
    fn requires_position(&self) -> bool;

    /// Record one resolution of `name` against the scope `scope_fq_name`
    /// at `position` in `file_path`.
    fn record(
        &self,
        file_path: &str,
        position: Position,
        scope_fq_name: &str,
        scope_kind: ScopeKind,
        name: &str,
    );
}

#[derive(Debug, Default)]
struct RecorderState {
    interner: StringInterner,
    lookups: Vec<LookupInfo>,
}

/// Thread-safe, append-only lookup collector.
#[derive(Debug, Default)]
pub struct LookupRecorder {
    state: Mutex<RecorderState>,
}

impl LookupRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        LookupRecorder::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        // A panic in another recording thread cannot leave the state torn:
        // every mutation is a single push after interning.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of events recorded so far.
    pub fn len(&self) -> usize {
        self.lock().lookups.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop recording and hand the events over for verification.
    pub fn finish(self) -> RecordedLookups {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!(
            lookups = state.lookups.len(),
            distinct_strings = state.interner.len(),
            interned_bytes = state.interner.bytes(),
            "lookup recording finished"
        );
        RecordedLookups {
            interner: state.interner,
            lookups: state.lookups,
        }
    }
}

impl LookupTracker for LookupRecorder {
    fn requires_position(&self) -> bool {
        true
    }

    fn record(
        &self,
        file_path: &str,
        position: Position,
        scope_fq_name: &str,
        scope_kind: ScopeKind,
        name: &str,
    ) {
        let mut state = self.lock();
        let file_path = state.interner.intern(file_path);
        let scope_fq_name = state.interner.intern(scope_fq_name);
        let name = state.interner.intern(name);
        state.lookups.push(LookupInfo {
            file_path,
            position,
            scope_kind,
            scope_fq_name,
            name,
        });
    }
}

/// Frozen result of one step's recording.
#[derive(Debug, Default)]
pub struct RecordedLookups {
    interner: StringInterner,
    lookups: Vec<LookupInfo>,
}

impl RecordedLookups {
    /// Resolve an interned handle.
    pub fn resolve(&self, id: StrId) -> &str {
        self.interner.resolve(id)
    }

    /// Total number of events, duplicates included.
    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    /// Whether no events were recorded.
    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// Events recorded for `file_path`, in recording order.
    pub fn for_file(&self, file_path: &str) -> Vec<LookupInfo> {
        match self.interner.get(file_path) {
            Some(id) => self
                .lookups
                .iter()
                .filter(|lookup| lookup.file_path == id)
                .copied()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of events recorded for `file_path`.
    pub fn count_for_file(&self, file_path: &str) -> usize {
        match self.interner.get(file_path) {
            Some(id) => self
                .lookups
                .iter()
                .filter(|lookup| lookup.file_path == id)
                .count(),
            None => 0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
