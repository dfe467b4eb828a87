//! Cross-kind entity registry.

use crate::entity::DynEntity;
use crmsync_protocol::{EntityKind, RecordId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Resolves `(kind, id)` to an entity across all managers.
///
/// One database spans a whole synchronization run. It is shared as an
/// `Arc` and passed explicitly into every manager at construction, so
/// independent runs (and tests) never share mutable state. Each
/// manager registers its own entities during download, and again when
/// id resolution assigns a remote id to a locally created entity; the
/// linking phase reads it for cross-kind lookups, which is why every
/// kind must finish downloading before any kind links.
#[derive(Default)]
pub struct EntityDatabase {
    entities: RwLock<HashMap<(String, String), DynEntity>>,
}

impl EntityDatabase {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity under its kind and remote id.
    ///
    /// Entities without a remote id are ignored; they are registered
    /// once id resolution has assigned one.
    pub fn register(&self, entity: &DynEntity) {
        if let Some(id) = entity.remote_id() {
            let key = (entity.kind().as_str().to_string(), id.as_str().to_string());
            self.entities.write().insert(key, entity.clone());
        }
    }

    /// Removes an entity registration.
    pub fn unregister(&self, kind: EntityKind, id: &RecordId) {
        let key = (kind.as_str().to_string(), id.as_str().to_string());
        self.entities.write().remove(&key);
    }

    /// Looks up an entity by kind and remote id.
    #[must_use]
    pub fn get_entity(&self, kind: EntityKind, id: &RecordId) -> Option<DynEntity> {
        self.get_by_name(kind.as_str(), id.as_str())
    }

    /// Looks up an entity by the remote kind name, as carried in raw
    /// `"kind:id"` association references.
    #[must_use]
    pub fn get_by_name(&self, kind: &str, id: &str) -> Option<DynEntity> {
        self.entities
            .read()
            .get(&(kind.to_string(), id.to_string()))
            .cloned()
    }

    /// Returns the number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}
