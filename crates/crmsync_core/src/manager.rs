//! Per-kind entity lifecycle and sync orchestration.
//!
//! An [`EntityManager`] owns the full collection of entities of one
//! kind and drives it through the run's phases: download → decode →
//! index → link, then diff → upload → apply for both properties and
//! associations. Cross-kind lookups during linking go through the
//! shared [`EntityDatabase`].

use crate::adapter::{EntityAdapter, FieldSpec};
use crate::database::EntityDatabase;
use crate::entity::{AssociationOp, DynEntity, Entity};
use crate::error::{CoreError, CoreResult};
use crate::index::Index;
use crate::service::{EntityDownloader, EntityUploader, Progress};
use crmsync_protocol::{
    AssociationInput, CreatedRecord, EntityKind, NewRecord, PropertyMap, RecordId, RecordUpdate,
    RelativeAssociation,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Handle to an index registered with [`EntityManager::register_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHandle(usize);

/// Monotonic per-run sync counters.
///
/// Counters accumulate across the run and are reset only by
/// recreating the manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    /// Entities created remotely.
    pub created: u64,
    /// Entities updated remotely.
    pub updated: u64,
    /// Associations created remotely.
    pub associated: u64,
    /// Associations deleted remotely.
    pub disassociated: u64,
}

/// Owns and synchronizes the entities of one kind.
pub struct EntityManager<D, C> {
    kind: EntityKind,
    adapter: EntityAdapter<D, C>,
    db: Arc<EntityDatabase>,
    entities: Vec<Arc<Entity<D, C>>>,
    indexes: Vec<Index<D, C>>,
    /// Raw association references buffered at download time; the
    /// referenced entities of other kinds may not exist yet.
    prelinked: Vec<(RecordId, RelativeAssociation)>,
    counts: SyncCounts,
}

impl<D, C> EntityManager<D, C>
where
    D: Default + Send + Sync + 'static,
    C: Default + Send + Sync + 'static,
{
    /// Creates a manager for `kind` governed by `adapter`, registered
    /// against the shared entity database.
    pub fn new(kind: EntityKind, adapter: EntityAdapter<D, C>, db: Arc<EntityDatabase>) -> Self {
        let mut manager = Self {
            kind,
            adapter,
            db,
            entities: Vec::new(),
            indexes: Vec::new(),
            prelinked: Vec::new(),
            counts: SyncCounts::default(),
        };
        // Built-in index by remote id, used for owner lookups during
        // linking.
        manager.indexes.push(Index::new(|e: &Entity<D, C>| {
            e.id().map(|id| id.as_str().to_string()).into_iter().collect()
        }));
        manager
    }

    /// Returns the kind this manager governs.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the adapter this manager decodes and encodes with.
    #[must_use]
    pub fn adapter(&self) -> &EntityAdapter<D, C> {
        &self.adapter
    }

    /// Returns the accumulated sync counters.
    #[must_use]
    pub fn counts(&self) -> SyncCounts {
        self.counts
    }

    /// Returns every entity in the collection.
    #[must_use]
    pub fn entities(&self) -> &[Arc<Entity<D, C>>] {
        &self.entities
    }

    /// Looks up an entity by its remote id.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<Arc<Entity<D, C>>> {
        self.indexes[0].get(id.as_str())
    }

    /// Registers a secondary index. Existing entities are indexed
    /// immediately; afterwards the index follows the manager's
    /// rebuild points.
    pub fn register_index(
        &mut self,
        keys_for: impl Fn(&Entity<D, C>) -> Vec<String> + Send + Sync + 'static,
    ) -> IndexHandle {
        let mut index = Index::new(keys_for);
        index.add_entries_for(&self.entities);
        self.indexes.push(index);
        IndexHandle(self.indexes.len() - 1)
    }

    /// Looks up an entity in a registered index.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not returned by this manager's
    /// [`register_index`](Self::register_index).
    #[must_use]
    pub fn lookup(&self, handle: IndexHandle, key: &str) -> Option<Arc<Entity<D, C>>> {
        self.indexes[handle.0].get(key)
    }

    /// Downloads every remote record of this kind, decodes it, and
    /// rebuilds all indexes.
    ///
    /// Records matching the adapter's reject predicate are discarded
    /// wholesale. Raw association references are buffered for
    /// [`link_associations`](Self::link_associations); the referenced
    /// kinds may not have downloaded yet.
    pub fn download_all_entities(
        &mut self,
        progress: &dyn Progress,
        downloader: &dyn EntityDownloader,
    ) -> CoreResult<()> {
        let properties = self.adapter.requested_properties();
        let kinds = self.adapter.downloaded_kinds();
        let raw_records = downloader.download_entities(progress, self.kind, &properties, &kinds)?;
        let total = raw_records.len();

        for raw in raw_records {
            if self.adapter.rejects(&raw.properties) {
                continue;
            }
            let data = self.adapter.decode_data(&raw.properties)?;
            let computed = self.adapter.decode_computed(&raw.properties);
            // Baseline is the re-encoding of what was decoded, so
            // decode/encode normalization never reads as a local change.
            let baseline = self.adapter.encode_fields(&data);
            for reference in &raw.associations {
                self.prelinked.push((raw.id.clone(), reference.clone()));
            }
            let entity = Entity::new(self.kind, Some(raw.id), data, computed, baseline);
            let cloned_entity: Arc<Entity<D, C>> = Arc::clone(&entity);
            let handle: DynEntity = cloned_entity;
            self.db.register(&handle);
            self.entities.push(entity);
        }

        self.rebuild_indexes();
        info!(
            kind = %self.kind,
            downloaded = total,
            kept = self.entities.len(),
            "downloaded entities"
        );
        Ok(())
    }

    /// Attaches every buffered raw association reference, resolving
    /// targets through the entity database.
    ///
    /// Must run only after **every** kind's download has completed; a
    /// reference to an entity that is not present is a fatal
    /// referential-integrity error. Only the side whose raw download
    /// produced a reference attaches it; attaching registers the
    /// reciprocal link on the target, so the graph is symmetric
    /// without processing both ends' raw data. The buffer is cleared
    /// afterwards.
    pub fn link_associations(&mut self) -> CoreResult<()> {
        let references = std::mem::take(&mut self.prelinked);
        let total = references.len();
        for (owner_id, reference) in references {
            let owner = self
                .get(&owner_id)
                .ok_or_else(|| CoreError::missing_entity(self.kind.as_str(), owner_id.as_str()))?;
            let target = self
                .db
                .get_by_name(&reference.kind, reference.id.as_str())
                .ok_or_else(|| {
                    CoreError::missing_entity(reference.kind.clone(), reference.id.as_str())
                })?;
            owner.attach_initial(&target);
        }
        debug!(kind = %self.kind, references = total, "linked associations");
        Ok(())
    }

    /// Creates a local entity that does not exist remotely yet.
    ///
    /// The entity is inserted into the collection and into every
    /// index immediately, so same-run lookups find it before the next
    /// sync pass. No remote call occurs until the next property sync.
    pub fn create(&mut self, data: D) -> Arc<Entity<D, C>> {
        let entity = Entity::new(self.kind, None, data, C::default(), PropertyMap::new());
        for index in &mut self.indexes {
            index.add_entries_for(std::slice::from_ref(&entity));
        }
        self.entities.push(Arc::clone(&entity));
        entity
    }

    /// Removes entities from the local collection and all indexes.
    /// Remote state is unaffected.
    pub fn remove_locally(&mut self, entities: &[Arc<Entity<D, C>>]) {
        for index in &mut self.indexes {
            index.remove_entries_for(entities);
        }
        for entity in entities {
            if let Some(id) = entity.id() {
                self.db.unregister(self.kind, &id);
            }
        }
        let removed: HashSet<Uuid> = entities.iter().map(|e| e.local_id()).collect();
        self.entities.retain(|e| !removed.contains(&e.local_id()));
    }

    /// Pushes every entity's property changes to the remote store.
    ///
    /// Entities with a non-empty diff are partitioned into creations
    /// (no remote id) and updates. Creations are bulk-created, their
    /// diffs committed into the baseline, and each local entity is
    /// re-matched to exactly one creation result through its
    /// identifier-marked fields; zero, multiple, or doubly-claimed
    /// matches are fatal. Updates are bulk-updated and committed.
    /// All indexes are rebuilt afterwards.
    pub fn sync_up_all_entities(&mut self, uploader: &dyn EntityUploader) -> CoreResult<()> {
        let mut to_create = Vec::new();
        let mut to_update = Vec::new();
        for entity in &self.entities {
            let changes = entity.changed_properties(&self.adapter);
            if changes.is_empty() {
                continue;
            }
            if entity.id().is_none() {
                to_create.push((Arc::clone(entity), changes));
            } else {
                to_update.push((Arc::clone(entity), changes));
            }
        }

        if !to_create.is_empty() {
            let inputs = to_create
                .iter()
                .map(|(_, changes)| NewRecord::new(changes.clone()))
                .collect();
            let results = uploader.create_entities(self.kind, inputs)?;
            for (entity, changes) in &to_create {
                entity.commit_properties(changes);
            }
            self.resolve_created_ids(&to_create, &results)?;
            self.counts.created += to_create.len() as u64;
        }

        if !to_update.is_empty() {
            let inputs = to_update
                .iter()
                .map(|(entity, changes)| {
                    Ok(RecordUpdate::new(entity.guaranteed_id()?, changes.clone()))
                })
                .collect::<CoreResult<Vec<_>>>()?;
            uploader.update_entities(self.kind, inputs)?;
            for (entity, changes) in &to_update {
                entity.commit_properties(changes);
            }
            self.counts.updated += to_update.len() as u64;
        }

        self.rebuild_indexes();
        info!(
            kind = %self.kind,
            created = to_create.len(),
            updated = to_update.len(),
            "synced entity properties"
        );
        Ok(())
    }

    /// Re-matches locally created entities to their creation results.
    ///
    /// The remote store does not guarantee positional correspondence,
    /// so each local entity must match exactly one result on its
    /// encoded identifier fields, and no result may be claimed twice.
    fn resolve_created_ids(
        &self,
        created: &[(Arc<Entity<D, C>>, PropertyMap)],
        results: &[CreatedRecord],
    ) -> CoreResult<()> {
        let identifiers: Vec<&FieldSpec<D>> = self.adapter.identifier_fields().collect();
        let mut claimed: HashSet<usize> = HashSet::new();

        for (entity, _) in created {
            let local: BTreeMap<&str, String> = identifiers
                .iter()
                .filter_map(|spec| {
                    spec.property()
                        .map(|p| (p, entity.with_data(|data| spec.encode(data))))
                })
                .collect();

            let matches: Vec<usize> = results
                .iter()
                .enumerate()
                .filter(|(_, result)| {
                    local.iter().all(|(property, encoded)| {
                        result.properties.get(*property).map(String::as_str).unwrap_or("")
                            == encoded
                    })
                })
                .map(|(index, _)| index)
                .collect();

            match matches.as_slice() {
                [index] if !claimed.contains(index) => {
                    claimed.insert(*index);
                    entity.assign_remote_id(results[*index].id.clone());
                    let cloned_entity: Arc<Entity<D, C>> = Arc::clone(entity);
                    let handle: DynEntity = cloned_entity;
                    self.db.register(&handle);
                }
                [] => {
                    return Err(CoreError::IdentityUnresolved {
                        kind: self.kind.as_str().to_string(),
                        local: json(&local),
                        remotes: json(&results),
                    });
                }
                matched => {
                    let conflicting: Vec<&CreatedRecord> =
                        matched.iter().map(|index| &results[*index]).collect();
                    return Err(CoreError::IdentityAmbiguous {
                        kind: self.kind.as_str().to_string(),
                        local: json(&local),
                        matched: json(&conflicting),
                    });
                }
            }
        }
        Ok(())
    }

    /// Pushes every pending association operation to the remote
    /// store, grouped by target kind and partitioned into additions
    /// and removals.
    ///
    /// Only kinds declared bidirectional are pushed; operations
    /// toward down-only kinds are dropped. Every pending ledger is
    /// cleared afterwards. Must run after property sync, so that
    /// newly created entities already carry remote ids.
    pub fn sync_up_all_associations(&mut self, uploader: &dyn EntityUploader) -> CoreResult<()> {
        let bidirectional = self.adapter.bidirectional_kinds();
        let mut batches: BTreeMap<EntityKind, (Vec<AssociationInput>, Vec<AssociationInput>)> =
            BTreeMap::new();
        let mut dirty = Vec::new();

        for entity in &self.entities {
            let pending = entity.pending_changes();
            if pending.is_empty() {
                continue;
            }
            dirty.push(Arc::clone(entity));
            for change in pending {
                let other_kind = change.other.kind();
                if !bidirectional.contains(&other_kind) {
                    debug!(
                        kind = %self.kind,
                        other = %other_kind,
                        "dropping association change for down-only kind"
                    );
                    continue;
                }
                let input = AssociationInput::new(
                    entity.guaranteed_id()?,
                    change.other.remote_id().ok_or(CoreError::MissingRemoteId {
                        kind: other_kind.as_str().to_string(),
                        local_id: change.other.local_id(),
                    })?,
                    other_kind.as_str(),
                );
                let batch = batches.entry(other_kind).or_default();
                match change.op {
                    AssociationOp::Add => batch.0.push(input),
                    AssociationOp::Remove => batch.1.push(input),
                }
            }
        }

        let mut added = 0u64;
        let mut removed = 0u64;
        for (other_kind, (to_add, to_remove)) in batches {
            if !to_add.is_empty() {
                let count = to_add.len() as u64;
                uploader.create_associations(self.kind, other_kind, to_add)?;
                self.counts.associated += count;
                added += count;
            }
            if !to_remove.is_empty() {
                let count = to_remove.len() as u64;
                uploader.delete_associations(self.kind, other_kind, to_remove)?;
                self.counts.disassociated += count;
                removed += count;
            }
        }

        for entity in dirty {
            entity.clear_pending();
        }
        info!(kind = %self.kind, added, removed, "synced entity associations");
        Ok(())
    }

    fn rebuild_indexes(&mut self) {
        for index in &mut self.indexes {
            index.clear();
            index.add_entries_for(&self.entities);
        }
    }
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unserializable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AssociationSpec, ComputedSpec};
    use crate::service::{MockRemote, NullProgress};
    use crmsync_protocol::RawRecord;
    use std::collections::BTreeSet;

    const ITEM: EntityKind = EntityKind::new("item");
    const BIN: EntityKind = EntityKind::new("bin");

    #[derive(Debug, Clone, Default, PartialEq)]
    struct ItemData {
        sku: Option<String>,
        label: String,
        tags: BTreeSet<String>,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct ItemComputed {
        archived: bool,
    }

    fn item_adapter() -> EntityAdapter<ItemData, ItemComputed> {
        EntityAdapter::new()
            .field(
                FieldSpec::mapped(
                    "sku",
                    "sku",
                    |d: &mut ItemData, v| {
                        d.sku = v.filter(|s| !s.is_empty()).map(str::to_string);
                        Ok(())
                    },
                    |d| d.sku.clone().unwrap_or_default(),
                )
                .identifier(),
            )
            .field(FieldSpec::mapped(
                "label",
                "label",
                |d: &mut ItemData, v| {
                    d.label = v.unwrap_or_default().to_string();
                    Ok(())
                },
                |d| d.label.clone(),
            ))
            .field(FieldSpec::mapped(
                "tags",
                "tags",
                |d: &mut ItemData, v| {
                    d.tags = v
                        .filter(|s| !s.is_empty())
                        .map(|s| s.split(';').map(str::to_string).collect())
                        .unwrap_or_default();
                    Ok(())
                },
                |d| d.tags.iter().cloned().collect::<Vec<_>>().join(";"),
            ))
            .computed(ComputedSpec::new(
                "archived",
                ["archived_at"],
                |c: &mut ItemComputed, bag| {
                    c.archived = bag.get("archived_at").is_some_and(|s| !s.is_empty());
                },
            ))
            .association(AssociationSpec::down_up(BIN))
            .reject_when(|bag| bag.get("label").map(String::as_str) == Some("rejected"))
    }

    fn manager() -> EntityManager<ItemData, ItemComputed> {
        EntityManager::new(ITEM, item_adapter(), Arc::new(EntityDatabase::new()))
    }

    #[test]
    fn download_decodes_and_indexes() {
        let remote = MockRemote::new();
        remote.set_records(
            ITEM,
            vec![
                RawRecord::new("1")
                    .with_property("sku", "SKU-1")
                    .with_property("label", "anvil")
                    .with_property("tags", "heavy;iron")
                    .with_property("archived_at", "2024-01-01"),
                RawRecord::new("2").with_property("label", "rejected"),
            ],
        );

        let mut manager = manager();
        manager.download_all_entities(&NullProgress, &remote).unwrap();

        assert_eq!(manager.entities().len(), 1);
        let item = manager.get(&RecordId::from("1")).unwrap();
        assert_eq!(item.data().sku.as_deref(), Some("SKU-1"));
        assert_eq!(item.data().tags.len(), 2);
        assert!(item.computed().archived);
        assert!(manager.get(&RecordId::from("2")).is_none());
    }

    #[test]
    fn download_requests_computed_dependencies() {
        let adapter = item_adapter();
        let properties = adapter.requested_properties();
        assert!(properties.contains(&"archived_at".to_string()));
    }

    #[test]
    fn freshly_downloaded_entities_have_empty_diffs() {
        let remote = MockRemote::new();
        remote.set_records(
            ITEM,
            vec![RawRecord::new("1")
                .with_property("sku", "SKU-1")
                .with_property("tags", "iron;heavy")],
        );

        let mut manager = manager();
        manager.download_all_entities(&NullProgress, &remote).unwrap();

        let item = manager.get(&RecordId::from("1")).unwrap();
        assert!(item.changed_properties(manager.adapter()).is_empty());
    }

    #[test]
    fn create_indexes_immediately() {
        let mut manager = manager();
        let by_label = manager.register_index(|e| vec![e.data().label.clone()]);

        let item = manager.create(ItemData {
            sku: Some("SKU-9".into()),
            label: "fresh".into(),
            tags: BTreeSet::new(),
        });

        assert!(item.id().is_none());
        assert!(!item.computed().archived);
        let found = manager.lookup(by_label, "fresh").unwrap();
        assert_eq!(found.local_id(), item.local_id());
    }

    #[test]
    fn remove_locally_strips_collection_and_indexes() {
        let mut manager = manager();
        let by_label = manager.register_index(|e| vec![e.data().label.clone()]);
        let item = manager.create(ItemData {
            sku: None,
            label: "doomed".into(),
            tags: BTreeSet::new(),
        });

        manager.remove_locally(&[item]);

        assert!(manager.entities().is_empty());
        assert!(manager.lookup(by_label, "doomed").is_none());
    }

    #[test]
    fn sync_uploads_only_changed_properties() {
        let remote = MockRemote::new();
        remote.set_records(
            ITEM,
            vec![RawRecord::new("1")
                .with_property("sku", "SKU-1")
                .with_property("label", "anvil")],
        );

        let mut manager = manager();
        manager.download_all_entities(&NullProgress, &remote).unwrap();
        let item = manager.get(&RecordId::from("1")).unwrap();
        item.modify(|d| d.label = "sledge".into());

        manager.sync_up_all_entities(&remote).unwrap();

        let calls = remote.updated_calls();
        assert_eq!(calls.len(), 1);
        let update = &calls[0].1[0];
        assert_eq!(update.id.as_str(), "1");
        assert_eq!(update.properties.len(), 1);
        assert_eq!(update.properties.get("label").unwrap(), "sledge");
        assert_eq!(manager.counts().updated, 1);

        // Committed: a second sync has nothing to push.
        manager.sync_up_all_entities(&remote).unwrap();
        assert_eq!(remote.updated_calls().len(), 1);
    }

    #[test]
    fn sync_resolves_created_ids_out_of_order() {
        let remote = MockRemote::new();
        remote.set_creation_results(
            ITEM,
            vec![
                CreatedRecord::new("102", Default::default()).with_property("sku", "SKU-B"),
                CreatedRecord::new("101", Default::default()).with_property("sku", "SKU-A"),
            ],
        );

        let mut manager = manager();
        let a = manager.create(ItemData {
            sku: Some("SKU-A".into()),
            label: "a".into(),
            tags: BTreeSet::new(),
        });
        let b = manager.create(ItemData {
            sku: Some("SKU-B".into()),
            label: "b".into(),
            tags: BTreeSet::new(),
        });

        manager.sync_up_all_entities(&remote).unwrap();

        assert_eq!(a.id().unwrap().as_str(), "101");
        assert_eq!(b.id().unwrap().as_str(), "102");
        assert_eq!(manager.counts().created, 2);
        // Newly identified entities are resolvable by id.
        assert!(manager.get(&RecordId::from("102")).is_some());
    }

    #[test]
    fn identical_identifiers_fail_fatally() {
        let remote = MockRemote::new();
        remote.set_creation_results(
            ITEM,
            vec![CreatedRecord::new("101", Default::default()).with_property("sku", "SKU-A")],
        );

        let mut manager = manager();
        for label in ["first", "second"] {
            manager.create(ItemData {
                sku: Some("SKU-A".into()),
                label: label.into(),
                tags: BTreeSet::new(),
            });
        }

        let err = manager.sync_up_all_entities(&remote).unwrap_err();
        assert!(matches!(err, CoreError::IdentityAmbiguous { .. }));
    }

    #[test]
    fn unmatched_identifier_fails_fatally() {
        let remote = MockRemote::new();
        remote.set_creation_results(
            ITEM,
            vec![CreatedRecord::new("101", Default::default()).with_property("sku", "SKU-Z")],
        );

        let mut manager = manager();
        manager.create(ItemData {
            sku: Some("SKU-A".into()),
            label: "a".into(),
            tags: BTreeSet::new(),
        });

        let err = manager.sync_up_all_entities(&remote).unwrap_err();
        match err {
            CoreError::IdentityUnresolved { local, remotes, .. } => {
                assert!(local.contains("SKU-A"));
                assert!(remotes.contains("SKU-Z"));
            }
            other => panic!("expected IdentityUnresolved, got {other}"),
        }
    }

    #[test]
    fn linking_before_target_download_is_fatal() {
        let remote = MockRemote::new();
        remote.set_records(
            ITEM,
            vec![RawRecord::new("1")
                .with_property("sku", "SKU-1")
                .with_association(RelativeAssociation::new("bin", "77"))],
        );

        let mut manager = manager();
        manager.download_all_entities(&NullProgress, &remote).unwrap();

        // The bin kind never downloaded, so the reference dangles.
        let err = manager.link_associations().unwrap_err();
        match err {
            CoreError::MissingEntity { kind, id } => {
                assert_eq!(kind, "bin");
                assert_eq!(id, "77");
            }
            other => panic!("expected MissingEntity, got {other}"),
        }
    }
}
