//! Per-stream redelivery filter for lifecycle events.
//!
//! The [`Deduplicator`] keeps exactly one "last processed" event per stream.
//! A new event is a duplicate when it is the same delivery as that last event
//! (see [`LifecycleEvent::is_same_delivery`]). The last event is replaced only
//! after a successful dispatch, via [`Deduplicator::record`], so a dispatch
//! that failed half-way can still be retried by a redelivery.
//!
//! State starts empty at construction and lives for the life of the process.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use lumen_core::StreamId;

use crate::error::{Error, Result};
use crate::events::LifecycleEvent;

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("dedup lock poisoned")
}

/// Returns true if `incoming` repeats `last`.
#[must_use]
pub fn is_duplicate(last: Option<&LifecycleEvent>, incoming: &LifecycleEvent) -> bool {
    last.is_some_and(|last| last.is_same_delivery(incoming))
}

/// Holds the last processed event for each stream.
#[derive(Debug, Default)]
pub struct Deduplicator {
    last: RwLock<HashMap<StreamId, LifecycleEvent>>,
}

impl Deduplicator {
    /// Creates a deduplicator with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `incoming` repeats the last event recorded for its stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn is_duplicate(&self, incoming: &LifecycleEvent) -> Result<bool> {
        let last = self.last.read().map_err(poison_err)?;
        Ok(is_duplicate(last.get(&incoming.stream), incoming))
    }

    /// Replaces the last event for the event's stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn record(&self, event: &LifecycleEvent) -> Result<()> {
        let mut last = self.last.write().map_err(poison_err)?;
        last.insert(event.stream.clone(), event.clone());
        drop(last);
        Ok(())
    }

    /// Returns the last event recorded for `stream`.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn last(&self, stream: &StreamId) -> Result<Option<LifecycleEvent>> {
        let last = self.last.read().map_err(poison_err)?;
        Ok(last.get(stream).cloned())
    }
}
