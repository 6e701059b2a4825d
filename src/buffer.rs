//! In-memory buffering for log entries

use crate::entry::LogEntry;
use crate::stream::{LabelSet, PushRequest};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Why a push drained the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    BatchFull,
    Forced,
}

/// Thread-safe buffer for log entries.
///
/// Appending, the size check, and draining into a [`PushRequest`] all happen
/// under one lock, so at most one drain observes any given entry.
#[derive(Debug)]
pub struct LogBuffer {
    entries: Mutex<Vec<LogEntry>>,
    batch_size: usize,
}

impl LogBuffer {
    /// Create a new log buffer
    pub fn new(batch_size: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(batch_size)),
            batch_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entry, draining the buffer when it reaches the batch size or
    /// when `force` is set.
    pub fn push(
        &self,
        entry: LogEntry,
        force: bool,
        labels: &LabelSet,
    ) -> Option<(DrainReason, PushRequest)> {
        let mut entries = self.lock();
        entries.push(entry);

        let reason = if force {
            DrainReason::Forced
        } else if entries.len() >= self.batch_size {
            DrainReason::BatchFull
        } else {
            return None;
        };

        let drained = std::mem::take(&mut *entries);
        debug!("Draining {} buffered entries ({:?})", drained.len(), reason);
        Some((reason, PushRequest::from_entries(drained, labels)))
    }

    /// Drain everything buffered into a push request, `None` when empty
    pub fn drain(&self, labels: &LabelSet) -> Option<PushRequest> {
        let mut entries = self.lock();
        if entries.is_empty() {
            return None;
        }

        let drained = std::mem::take(&mut *entries);
        Some(PushRequest::from_entries(drained, labels))
    }

    /// Drop everything buffered, returning how many entries were discarded
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let discarded = entries.len();
        entries.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
