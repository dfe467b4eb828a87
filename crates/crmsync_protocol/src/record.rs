//! Downloaded record and upload payload shapes.

use crate::association::RelativeAssociation;
use crate::kind::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A remote property bag: property name to stored string value.
///
/// An absent property is an absent key; the remote store does not
/// distinguish "never set" from "cleared" beyond that.
pub type PropertyMap = BTreeMap<String, String>;

/// One record as downloaded from the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Remote identifier of the record.
    pub id: RecordId,
    /// The requested subset of the record's property bag.
    #[serde(default)]
    pub properties: PropertyMap,
    /// References to associated records of the requested kinds.
    #[serde(default)]
    pub associations: Vec<RelativeAssociation>,
}

impl RawRecord {
    /// Creates a record with an empty property bag and no associations.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            properties: PropertyMap::new(),
            associations: Vec::new(),
        }
    }

    /// Adds a property value.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Adds an association reference.
    #[must_use]
    pub fn with_association(mut self, assoc: RelativeAssociation) -> Self {
        self.associations.push(assoc);
        self
    }
}

/// Payload for one record in a bulk-create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    /// Encoded property values to set on the new record.
    pub properties: PropertyMap,
}

impl NewRecord {
    /// Creates a new-record payload.
    pub fn new(properties: PropertyMap) -> Self {
        Self { properties }
    }
}

/// One result of a bulk-create call.
///
/// The remote store does not guarantee that results are returned in
/// submission order; callers re-match results to their local records
/// through identifier-marked properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    /// Identifier assigned by the remote store.
    pub id: RecordId,
    /// Property values as stored remotely.
    #[serde(default)]
    pub properties: PropertyMap,
}

impl CreatedRecord {
    /// Creates a creation result.
    pub fn new(id: impl Into<RecordId>, properties: PropertyMap) -> Self {
        Self {
            id: id.into(),
            properties,
        }
    }

    /// Adds a property value.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Payload for one record in a bulk-update call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUpdate {
    /// Remote identifier of the record to update.
    pub id: RecordId,
    /// Encoded property values that changed since the last sync.
    pub properties: PropertyMap,
}

impl RecordUpdate {
    /// Creates an update payload.
    pub fn new(id: impl Into<RecordId>, properties: PropertyMap) -> Self {
        Self {
            id: id.into(),
            properties,
        }
    }
}

/// Payload for one pair in a bulk-associate or bulk-disassociate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationInput {
    /// Remote identifier on the owning side.
    pub from_id: RecordId,
    /// Remote identifier on the target side.
    pub to_id: RecordId,
    /// Remote name of the target kind.
    pub to_type: String,
}

impl AssociationInput {
    /// Creates an association payload.
    pub fn new(
        from_id: impl Into<RecordId>,
        to_id: impl Into<RecordId>,
        to_type: impl Into<String>,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            to_type: to_type.into(),
        }
    }
}
