//! Sequence-keyed lookup of in-flight exchanges.
//!
//! The engine identifies an exchange in its callbacks only by the sequence
//! number handed to it at creation. Entries are non-owning: the registry
//! never keeps an exchange alive, and a dropped exchange simply stops
//! resolving.

use crate::base::neterror::BridgeError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

pub struct DispatchRegistry<T> {
    entries: DashMap<i32, Weak<T>>,
    next_sequence: AtomicI32,
}

impl<T> Default for DispatchRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DispatchRegistry<T> {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Registry whose first allocated sequence is `last + 1`.
    pub fn starting_at(last: i32) -> Self {
        Self { entries: DashMap::new(), next_sequence: AtomicI32::new(last) }
    }

    /// Allocate a sequence number. Wraps on overflow and skips numbers
    /// still registered.
    pub fn next_sequence(&self) -> i32 {
        loop {
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if !self.entries.contains_key(&sequence) {
                return sequence;
            }
            tracing::trace!(sequence, "sequence still in flight, skipping");
        }
    }

    /// Map `sequence` to `exchange`. Fails if a live exchange already owns
    /// the sequence.
    pub fn register(&self, sequence: i32, exchange: &Arc<T>) -> Result<(), BridgeError> {
        match self.entries.entry(sequence) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().strong_count() > 0 {
                    return Err(BridgeError::InvalidState("sequence already registered"));
                }
                occupied.insert(Arc::downgrade(exchange));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::downgrade(exchange));
            }
        }
        tracing::trace!(sequence, "exchange registered");
        Ok(())
    }

    /// The live exchange for `sequence`, if any.
    pub fn resolve(&self, sequence: i32) -> Option<Arc<T>> {
        self.entries.get(&sequence).and_then(|entry| entry.upgrade())
    }

    /// Remove the entry for `sequence`. Returns whether one was present.
    pub fn remove(&self, sequence: i32) -> bool {
        let removed = self.entries.remove(&sequence).is_some();
        if removed {
            tracing::trace!(sequence, "exchange unregistered");
        }
        removed
    }

    pub fn contains(&self, sequence: i32) -> bool {
        self.entries.contains_key(&sequence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
