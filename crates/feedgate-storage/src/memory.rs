//! In-memory tuple store.
//!
//! Uses a `DashMap<StoredTuple, ()>` so point writes and deletes are O(1)
//! and duplicate/absence detection falls out of the map's entry semantics.
//! Reads are a linear scan over the shard contents, which is acceptable for
//! the tuple counts this system holds (bounded by groups plus explicit
//! grants, not feed versions).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{StoredTuple, TupleFilter, TupleStore};

/// In-memory implementation of `TupleStore`.
#[derive(Debug, Default)]
pub struct MemoryTupleStore {
    tuples: DashMap<StoredTuple, ()>,
}

impl MemoryTupleStore {
    /// Creates a new in-memory tuple store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory tuple store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored tuples.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

#[async_trait]
impl TupleStore for MemoryTupleStore {
    async fn read_tuples(&self, filter: &TupleFilter) -> StorageResult<Vec<StoredTuple>> {
        Ok(self
            .tuples
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|t| filter.matches(t))
            .collect())
    }

    #[instrument(skip(self), fields(tuple = %tuple.render()))]
    async fn write_tuple(&self, tuple: StoredTuple) -> StorageResult<()> {
        use dashmap::mapref::entry::Entry;
        // Entry API keeps check-and-insert atomic under concurrent writers.
        match self.tuples.entry(tuple) {
            Entry::Occupied(entry) => Err(StorageError::DuplicateTuple {
                tuple: entry.key().render(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(());
                Ok(())
            }
        }
    }

    #[instrument(skip(self), fields(tuple = %tuple.render()))]
    async fn delete_tuple(&self, tuple: &StoredTuple) -> StorageResult<()> {
        if self.tuples.remove(tuple).is_none() {
            return Err(StorageError::TupleNotFound {
                tuple: tuple.render(),
            });
        }
        Ok(())
    }

    async fn apply(
        &self,
        deletes: Vec<StoredTuple>,
        writes: Vec<StoredTuple>,
    ) -> StorageResult<()> {
        // Deletes first so a write in the same batch may reinstall a tuple.
        // Readers may observe the intermediate state; the engine's
        // normalization callers tolerate that.
        for tuple in deletes {
            self.tuples.remove(&tuple);
        }
        for tuple in writes {
            self.tuples.insert(tuple, ());
        }
        Ok(())
    }
}
