//! Secondary key → entity lookup.
//!
//! An [`Index`] maps zero or more string keys, derived from an entity
//! by its key-extraction function, to that entity. Indexes are not
//! kept incrementally consistent with in-place field mutations that
//! change a key; the owning manager rebuilds them wholesale at its own
//! rebuild points (after download and after each sync pass).

use crate::entity::Entity;
use std::collections::HashMap;
use std::sync::Arc;

type KeysFn<D, C> = Box<dyn Fn(&Entity<D, C>) -> Vec<String> + Send + Sync>;

/// A secondary index over one manager's entities.
///
/// Within one rebuild, the last writer wins on a duplicate key;
/// duplicates are presumed impossible for well-formed data and are not
/// defensively checked.
pub struct Index<D, C> {
    keys_for: KeysFn<D, C>,
    entries: HashMap<String, Arc<Entity<D, C>>>,
}

impl<D, C> Index<D, C> {
    /// Creates an index with the given key-extraction function.
    pub fn new(keys_for: impl Fn(&Entity<D, C>) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self {
            keys_for: Box::new(keys_for),
            entries: HashMap::new(),
        }
    }

    /// Adds every key of every given entity.
    pub fn add_entries_for(&mut self, entities: &[Arc<Entity<D, C>>]) {
        for entity in entities {
            for key in (self.keys_for)(entity) {
                self.entries.insert(key, Arc::clone(entity));
            }
        }
    }

    /// Removes every key of every given entity.
    pub fn remove_entries_for(&mut self, entities: &[Arc<Entity<D, C>>]) {
        for entity in entities {
            for key in (self.keys_for)(entity) {
                self.entries.remove(&key);
            }
        }
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Looks up the entity indexed under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Entity<D, C>>> {
        self.entries.get(key).cloned()
    }

    /// Returns the number of indexed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no keys are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
