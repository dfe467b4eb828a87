//! Change-tracked entities.
//!
//! An [`Entity`] is one local record: remote identity (absent until
//! first creation), typed data, derived computed data, the encoded
//! baseline used for property diffing, per-kind association sets, and
//! the pending ledger of association operations not yet pushed.
//!
//! Entities are shared as `Arc`s: the owning manager holds the strong
//! references, the entity database holds strong references keyed by
//! remote id, and association links between entities are weak so the
//! cyclic graph does not leak.

use crate::adapter::EntityAdapter;
use crate::error::{CoreError, CoreResult};
use crmsync_protocol::{EntityKind, PropertyMap, RecordId};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// A shared handle to an entity of any kind.
pub type DynEntity = Arc<dyn AnyEntity>;

type WeakEntity = Weak<dyn AnyEntity>;

/// The kind-independent surface of an entity, used where one kind
/// references entities of another.
pub trait AnyEntity: Send + Sync {
    /// Returns the entity's kind.
    fn kind(&self) -> EntityKind;

    /// Returns the run-local identity of this entity.
    fn local_id(&self) -> Uuid;

    /// Returns the remote identifier, if the entity exists remotely.
    fn remote_id(&self) -> Option<RecordId>;

    /// Returns true if `other` is in this entity's association set.
    fn is_linked_to(&self, other: &DynEntity) -> bool;

    /// Registers `other` in this entity's association set without
    /// recording a pending operation. This is the reciprocal half of
    /// an attach; use [`Entity::add_association`] to attach.
    fn register_link(&self, other: &DynEntity);

    /// Removes `other` from this entity's association set without
    /// recording a pending operation.
    fn drop_link(&self, other: &DynEntity);

    /// Upcasts for downcasting back to a typed [`Entity`].
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Downcasts a kind-erased entity handle back to its typed form.
///
/// Returns `None` if `entity` is not an `Entity<D, C>`.
pub fn downcast_entity<D, C>(entity: &DynEntity) -> Option<Arc<Entity<D, C>>>
where
    D: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    Arc::clone(entity).as_any().downcast::<Entity<D, C>>().ok()
}

/// A pending association operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationOp {
    /// The association was added locally.
    Add,
    /// The association was removed locally.
    Remove,
}

/// One entry in an entity's pending-association ledger.
#[derive(Clone)]
pub struct AssociationChange {
    /// Whether the association was added or removed.
    pub op: AssociationOp,
    /// The entity on the other side.
    pub other: DynEntity,
}

struct EntityState<D, C> {
    id: Option<RecordId>,
    data: D,
    computed: C,
    /// Last-synchronized encoded value per remote property.
    baseline: PropertyMap,
    /// Association sets, one per related kind, keyed by the other
    /// entity's run-local identity.
    links: BTreeMap<EntityKind, BTreeMap<Uuid, WeakEntity>>,
    /// Association operations not yet pushed remotely, in order.
    pending: Vec<AssociationChange>,
}

/// One local mirror of a remote record.
pub struct Entity<D, C> {
    kind: EntityKind,
    local_id: Uuid,
    state: RwLock<EntityState<D, C>>,
}

impl<D, C> Entity<D, C> {
    /// Creates an entity. Downloaded entities carry their remote id
    /// and decode-time baseline; locally created entities start with
    /// neither.
    pub(crate) fn new(
        kind: EntityKind,
        id: Option<RecordId>,
        data: D,
        computed: C,
        baseline: PropertyMap,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            local_id: Uuid::new_v4(),
            state: RwLock::new(EntityState {
                id,
                data,
                computed,
                baseline,
                links: BTreeMap::new(),
                pending: Vec::new(),
            }),
        })
    }

    /// Returns the entity's kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the run-local identity of this entity.
    #[must_use]
    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    /// Returns the remote identifier, if the entity exists remotely.
    #[must_use]
    pub fn id(&self) -> Option<RecordId> {
        self.state.read().id.clone()
    }

    /// Returns the remote identifier, or an error if the entity has
    /// not been created remotely yet.
    pub fn guaranteed_id(&self) -> CoreResult<RecordId> {
        self.id().ok_or(CoreError::MissingRemoteId {
            kind: self.kind.as_str().to_string(),
            local_id: self.local_id,
        })
    }

    /// Assigns the remote identifier after creation. May happen at
    /// most once in an entity's life.
    pub(crate) fn assign_remote_id(&self, id: RecordId) {
        let mut state = self.state.write();
        debug_assert!(state.id.is_none(), "remote id assigned twice");
        state.id = Some(id);
    }

    /// Returns a copy of the typed data.
    #[must_use]
    pub fn data(&self) -> D
    where
        D: Clone,
    {
        self.state.read().data.clone()
    }

    /// Returns a copy of the computed data.
    #[must_use]
    pub fn computed(&self) -> C
    where
        C: Clone,
    {
        self.state.read().computed.clone()
    }

    /// Mutates the typed data in place.
    ///
    /// Changes become visible to the diff step of the next property
    /// sync; indexes are only rebuilt at the manager's own rebuild
    /// points.
    pub fn modify(&self, f: impl FnOnce(&mut D)) {
        f(&mut self.state.write().data);
    }

    /// Reads the typed data without cloning it.
    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.state.read().data)
    }

    /// Computes the diff against the baseline: every mapped field
    /// whose freshly encoded value differs from its last-synchronized
    /// encoding. A field with no baseline entry is always a change.
    pub(crate) fn changed_properties(&self, adapter: &EntityAdapter<D, C>) -> PropertyMap {
        let state = self.state.read();
        let mut changes = PropertyMap::new();
        for spec in adapter.fields() {
            let Some(property) = spec.property() else {
                continue;
            };
            let encoded = spec.encode(&state.data);
            if state.baseline.get(property) != Some(&encoded) {
                changes.insert(property.to_string(), encoded);
            }
        }
        changes
    }

    /// Commits uploaded property values into the baseline.
    pub(crate) fn commit_properties(&self, changes: &PropertyMap) {
        let mut state = self.state.write();
        for (property, encoded) in changes {
            state.baseline.insert(property.clone(), encoded.clone());
        }
    }

    /// Returns the live associated entities of `kind`.
    #[must_use]
    pub fn associations(&self, kind: EntityKind) -> Vec<DynEntity> {
        let state = self.state.read();
        state
            .links
            .get(&kind)
            .map(|set| set.values().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Returns true if any association operations are pending.
    #[must_use]
    pub fn has_association_changes(&self) -> bool {
        !self.state.read().pending.is_empty()
    }

    /// Returns the pending association operations, in order.
    #[must_use]
    pub fn pending_changes(&self) -> Vec<AssociationChange> {
        self.state.read().pending.clone()
    }

    /// Clears the pending ledger once a sync pass has pushed (or
    /// dropped) every operation in it.
    pub(crate) fn clear_pending(&self) {
        self.state.write().pending.clear();
    }

    fn insert_link(&self, other: &DynEntity) -> bool {
        let mut state = self.state.write();
        state
            .links
            .entry(other.kind())
            .or_default()
            .insert(other.local_id(), Arc::downgrade(other))
            .is_none()
    }

    fn remove_link(&self, other: &DynEntity) -> bool {
        let mut state = self.state.write();
        state
            .links
            .get_mut(&other.kind())
            .is_some_and(|set| set.remove(&other.local_id()).is_some())
    }
}

impl<D, C> Entity<D, C>
where
    D: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Associates this entity with `other`.
    ///
    /// Both sides' association sets are updated, and the operation is
    /// recorded in this entity's pending ledger for the next
    /// association sync. Attaching an already-associated pair is a
    /// no-op.
    pub fn add_association(self: &Arc<Self>, other: &DynEntity) {
        if !self.insert_link(other) {
            return;
        }
        let cloned_self: Arc<Self> = Arc::clone(self);
        let me: DynEntity = cloned_self;
        other.register_link(&me);
        self.state.write().pending.push(AssociationChange {
            op: AssociationOp::Add,
            other: Arc::clone(other),
        });
    }

    /// Dissociates this entity from `other`.
    ///
    /// Both sides' association sets are updated, and the operation is
    /// recorded in this entity's pending ledger. Removing an absent
    /// association is a no-op.
    pub fn remove_association(self: &Arc<Self>, other: &DynEntity) {
        if !self.remove_link(other) {
            return;
        }
        let cloned_self: Arc<Self> = Arc::clone(self);
        let me: DynEntity = cloned_self;
        other.drop_link(&me);
        self.state.write().pending.push(AssociationChange {
            op: AssociationOp::Remove,
            other: Arc::clone(other),
        });
    }

    /// Attaches an association produced by the raw download of this
    /// entity's side. Both sides' sets are updated; nothing is
    /// recorded as pending. Idempotent.
    pub(crate) fn attach_initial(self: &Arc<Self>, other: &DynEntity) {
        if !self.insert_link(other) {
            return;
        }
        let cloned_self: Arc<Self> = Arc::clone(self);
        let me: DynEntity = cloned_self;
        other.register_link(&me);
    }
}

impl<D, C> AnyEntity for Entity<D, C>
where
    D: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn local_id(&self) -> Uuid {
        self.local_id
    }

    fn remote_id(&self) -> Option<RecordId> {
        self.id()
    }

    fn is_linked_to(&self, other: &DynEntity) -> bool {
        let state = self.state.read();
        state
            .links
            .get(&other.kind())
            .is_some_and(|set| set.contains_key(&other.local_id()))
    }

    fn register_link(&self, other: &DynEntity) {
        self.insert_link(other);
    }

    fn drop_link(&self, other: &DynEntity) {
        self.remove_link(other);
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<D, C> std::fmt::Debug for Entity<D, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Entity")
            .field("kind", &self.kind)
            .field("local_id", &self.local_id)
            .field("id", &state.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FieldSpec;

    const LEFT: EntityKind = EntityKind::new("left");
    const RIGHT: EntityKind = EntityKind::new("right");

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Payload {
        value: String,
    }

    fn payload_adapter() -> EntityAdapter<Payload, ()> {
        EntityAdapter::new().field(FieldSpec::mapped(
            "value",
            "value",
            |d: &mut Payload, v| {
                d.value = v.unwrap_or_default().to_string();
                Ok(())
            },
            |d| d.value.clone(),
        ))
    }

    fn left_entity() -> Arc<Entity<Payload, ()>> {
        Entity::new(LEFT, Some(RecordId::from("L1")), Payload::default(), (), PropertyMap::new())
    }

    fn right_entity() -> Arc<Entity<Payload, ()>> {
        Entity::new(RIGHT, Some(RecordId::from("R1")), Payload::default(), (), PropertyMap::new())
    }

    #[test]
    fn remote_id_assigned_once() {
        let e = Entity::new(LEFT, None, Payload::default(), (), PropertyMap::new());
        assert!(e.id().is_none());
        assert!(e.guaranteed_id().is_err());

        e.assign_remote_id(RecordId::from("42"));
        assert_eq!(e.guaranteed_id().unwrap().as_str(), "42");
    }

    #[test]
    fn diff_against_baseline() {
        let adapter = payload_adapter();
        let baseline: PropertyMap = [("value".to_string(), "a".to_string())].into();
        let e = Entity::new(
            LEFT,
            Some(RecordId::from("1")),
            Payload { value: "a".into() },
            (),
            baseline,
        );

        assert!(e.changed_properties(&adapter).is_empty());

        e.modify(|d| d.value = "b".into());
        let changes = e.changed_properties(&adapter);
        assert_eq!(changes.get("value").unwrap(), "b");

        e.commit_properties(&changes);
        assert!(e.changed_properties(&adapter).is_empty());
    }

    #[test]
    fn missing_baseline_is_always_a_change() {
        let adapter = payload_adapter();
        let e = Entity::new(LEFT, None, Payload::default(), (), PropertyMap::new());
        let changes = e.changed_properties(&adapter);
        assert_eq!(changes.get("value").unwrap(), "");
    }

    #[test]
    fn association_is_symmetric() {
        let a = left_entity();
        let b: DynEntity = right_entity();

        a.add_association(&b);

        assert_eq!(a.associations(RIGHT).len(), 1);
        let back = b.as_any().downcast::<Entity<Payload, ()>>().unwrap();
        assert_eq!(back.associations(LEFT).len(), 1);
        assert_eq!(back.associations(LEFT)[0].local_id(), a.local_id());
    }

    #[test]
    fn add_association_records_pending_once() {
        let a = left_entity();
        let b: DynEntity = right_entity();

        a.add_association(&b);
        a.add_association(&b);

        let pending = a.pending_changes();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].op, AssociationOp::Add);

        // The reciprocal side records nothing.
        let back = downcast_entity::<Payload, ()>(&b).unwrap();
        assert!(!back.has_association_changes());
    }

    #[test]
    fn initial_attach_records_nothing() {
        let a = left_entity();
        let b: DynEntity = right_entity();

        a.attach_initial(&b);
        a.attach_initial(&b);

        assert_eq!(a.associations(RIGHT).len(), 1);
        assert!(!a.has_association_changes());
    }

    #[test]
    fn remove_association_records_pending() {
        let a = left_entity();
        let b: DynEntity = right_entity();

        a.attach_initial(&b);
        a.remove_association(&b);

        assert!(a.associations(RIGHT).is_empty());
        let back = downcast_entity::<Payload, ()>(&b).unwrap();
        assert!(back.associations(LEFT).is_empty());

        let pending = a.pending_changes();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].op, AssociationOp::Remove);
    }

    #[test]
    fn remove_absent_association_is_noop() {
        let a = left_entity();
        let b: DynEntity = right_entity();

        a.remove_association(&b);
        assert!(!a.has_association_changes());
    }

    #[test]
    fn dropped_counterparts_disappear_from_associations() {
        let a = left_entity();
        let b = right_entity();
        let b_cloned = Arc::clone(&b);
        let b_dyn: DynEntity = b_cloned;
        a.attach_initial(&b_dyn);

        drop(b_dyn);
        drop(b);

        assert!(a.associations(RIGHT).is_empty());
    }

    #[test]
    fn clear_pending_empties_ledger() {
        let a = left_entity();
        let b: DynEntity = right_entity();
        a.add_association(&b);

        a.clear_pending();
        assert!(!a.has_association_changes());
        // The link itself survives; only the ledger is cleared.
        assert_eq!(a.associations(RIGHT).len(), 1);
    }
}
