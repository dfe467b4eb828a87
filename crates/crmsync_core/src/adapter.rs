//! Declarative field and association adapters.
//!
//! An [`EntityAdapter`] describes, for one entity kind, how remote
//! property bags map onto typed local data: per-field decode/encode
//! pairs, computed fields with their property dependencies, the
//! related kinds and their sync direction, and an optional reject
//! predicate applied before decoding. Adapters are purely declarative
//! and built once by the configuration layer.

use crate::error::CoreResult;
use crmsync_protocol::{EntityKind, PropertyMap};

type DownFn<D> = Box<dyn Fn(&mut D, Option<&str>) -> CoreResult<()> + Send + Sync>;
type UpFn<D> = Box<dyn Fn(&D) -> String + Send + Sync>;
type ComputedDownFn<C> = Box<dyn Fn(&mut C, &PropertyMap) + Send + Sync>;
type RejectFn = Box<dyn Fn(&PropertyMap) -> bool + Send + Sync>;

/// Sync direction of an association, relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Downloaded only; local changes are never pushed back.
    Down,
    /// Downloaded and pushed back.
    DownUp,
}

impl Direction {
    /// Returns true if local association changes are pushed remotely.
    #[must_use]
    pub fn is_bidirectional(self) -> bool {
        matches!(self, Direction::DownUp)
    }
}

/// Declares that entities of this kind may relate to `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationSpec {
    /// The related kind.
    pub kind: EntityKind,
    /// Sync direction for this relation.
    pub direction: Direction,
}

impl AssociationSpec {
    /// Declares a download-only relation.
    #[must_use]
    pub const fn down(kind: EntityKind) -> Self {
        Self {
            kind,
            direction: Direction::Down,
        }
    }

    /// Declares a bidirectional relation.
    #[must_use]
    pub const fn down_up(kind: EntityKind) -> Self {
        Self {
            kind,
            direction: Direction::DownUp,
        }
    }
}

/// Declarative mapping for one typed field.
///
/// `down` must be total over "value or absence": it is called with
/// `None` when the remote property is missing and must still produce a
/// valid field value. `up` is the left inverse the diff step relies
/// on: re-encoding a freshly decoded value must reproduce a string
/// that reads as "no change".
pub struct FieldSpec<D> {
    name: &'static str,
    property: Option<String>,
    identifier: bool,
    down: DownFn<D>,
    up: UpFn<D>,
}

impl<D> FieldSpec<D> {
    /// Creates a field bound to a remote property.
    pub fn mapped(
        name: &'static str,
        property: impl Into<String>,
        down: impl Fn(&mut D, Option<&str>) -> CoreResult<()> + Send + Sync + 'static,
        up: impl Fn(&D) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            property: Some(property.into()),
            identifier: false,
            down: Box::new(down),
            up: Box::new(up),
        }
    }

    /// Creates a field with no remote property of its own.
    ///
    /// Local-only fields never appear in diffs or upload payloads;
    /// `down` is called with `None` at decode time.
    pub fn local(
        name: &'static str,
        down: impl Fn(&mut D, Option<&str>) -> CoreResult<()> + Send + Sync + 'static,
        up: impl Fn(&D) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            property: None,
            identifier: false,
            down: Box::new(down),
            up: Box::new(up),
        }
    }

    /// Marks this field as an identifier used to re-match locally
    /// created entities to their freshly created remote records.
    #[must_use]
    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }

    /// Returns the local field name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the remote property name, if any.
    #[must_use]
    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// Returns true if this field is identifier-marked.
    #[must_use]
    pub fn is_identifier(&self) -> bool {
        self.identifier
    }

    /// Encodes this field's current value from `data`.
    pub fn encode(&self, data: &D) -> String {
        (self.up)(data)
    }

    /// Decodes a remote value (or absence) into this field of `data`.
    pub fn decode_into(&self, data: &mut D, value: Option<&str>) -> CoreResult<()> {
        (self.down)(data, value)
    }
}

/// Declarative mapping for one computed (derived, read-only) field.
///
/// The listed `properties` are this field's dependencies: they are
/// added to the property set requested at download time even though
/// they are not decoded into direct fields. Omitting a dependency
/// silently yields stale or default computed values.
pub struct ComputedSpec<C> {
    name: &'static str,
    properties: Vec<String>,
    down: ComputedDownFn<C>,
}

impl<C> ComputedSpec<C> {
    /// Creates a computed field derived from the full property bag.
    pub fn new<P, S>(
        name: &'static str,
        properties: P,
        down: impl Fn(&mut C, &PropertyMap) + Send + Sync + 'static,
    ) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            properties: properties.into_iter().map(Into::into).collect(),
            down: Box::new(down),
        }
    }

    /// Returns the local field name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the remote properties this field depends on.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }
}

/// Declarative description of one entity kind's mapping.
pub struct EntityAdapter<D, C> {
    fields: Vec<FieldSpec<D>>,
    computed: Vec<ComputedSpec<C>>,
    associations: Vec<AssociationSpec>,
    reject: Option<RejectFn>,
}

impl<D, C> Default for EntityAdapter<D, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, C> EntityAdapter<D, C> {
    /// Creates an empty adapter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            computed: Vec::new(),
            associations: Vec::new(),
            reject: None,
        }
    }

    /// Adds a field spec.
    #[must_use]
    pub fn field(mut self, spec: FieldSpec<D>) -> Self {
        self.fields.push(spec);
        self
    }

    /// Adds a computed-field spec.
    #[must_use]
    pub fn computed(mut self, spec: ComputedSpec<C>) -> Self {
        self.computed.push(spec);
        self
    }

    /// Adds an association spec.
    #[must_use]
    pub fn association(mut self, spec: AssociationSpec) -> Self {
        self.associations.push(spec);
        self
    }

    /// Sets the reject predicate, applied to the raw property bag
    /// before decoding. Rejected records are discarded wholesale.
    #[must_use]
    pub fn reject_when(
        mut self,
        predicate: impl Fn(&PropertyMap) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.reject = Some(Box::new(predicate));
        self
    }

    /// Returns the field specs.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec<D>] {
        &self.fields
    }

    /// Returns the identifier-marked field specs.
    pub fn identifier_fields(&self) -> impl Iterator<Item = &FieldSpec<D>> {
        self.fields.iter().filter(|f| f.is_identifier())
    }

    /// Returns the association specs.
    #[must_use]
    pub fn associations(&self) -> &[AssociationSpec] {
        &self.associations
    }

    /// Returns the remote properties to request at download time:
    /// every mapped field property plus every computed dependency,
    /// deduplicated in declaration order.
    #[must_use]
    pub fn requested_properties(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let names = self
            .fields
            .iter()
            .filter_map(|f| f.property())
            .chain(self.computed.iter().flat_map(|c| c.properties()).map(String::as_str));
        for name in names {
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
        out
    }

    /// Returns the related kinds requested at download time.
    ///
    /// Both directions include "down", so every declared kind is
    /// downloaded; down-only kinds are simply never pushed back.
    #[must_use]
    pub fn downloaded_kinds(&self) -> Vec<EntityKind> {
        self.associations.iter().map(|a| a.kind).collect()
    }

    /// Returns the kinds whose association changes are pushed back.
    #[must_use]
    pub fn bidirectional_kinds(&self) -> Vec<EntityKind> {
        self.associations
            .iter()
            .filter(|a| a.direction.is_bidirectional())
            .map(|a| a.kind)
            .collect()
    }

    /// Returns true if the reject predicate discards this bag.
    pub fn rejects(&self, bag: &PropertyMap) -> bool {
        self.reject.as_ref().is_some_and(|f| f(bag))
    }

    /// Decodes a property bag into typed data.
    pub fn decode_data(&self, bag: &PropertyMap) -> CoreResult<D>
    where
        D: Default,
    {
        let mut data = D::default();
        for spec in &self.fields {
            let value = spec.property().and_then(|p| bag.get(p)).map(String::as_str);
            spec.decode_into(&mut data, value)?;
        }
        Ok(data)
    }

    /// Decodes the computed fields from the full property bag.
    pub fn decode_computed(&self, bag: &PropertyMap) -> C
    where
        C: Default,
    {
        let mut computed = C::default();
        for spec in &self.computed {
            (spec.down)(&mut computed, bag);
        }
        computed
    }

    /// Encodes every mapped field of `data`, keyed by property name.
    pub fn encode_fields(&self, data: &D) -> PropertyMap {
        self.fields
            .iter()
            .filter_map(|spec| spec.property().map(|p| (p.to_string(), spec.encode(data))))
            .collect()
    }
}
