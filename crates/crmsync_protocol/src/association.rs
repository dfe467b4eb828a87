//! The `"kind:id"` relative-association reference format.

use crate::kind::RecordId;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error produced when a relative-association string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid association reference {0:?}, expected \"kind:id\"")]
pub struct ParseAssociationError(pub String);

/// A reference from a downloaded record to a record of another kind.
///
/// The remote store reports associations as `"kind:id"` strings
/// relative to the owning record. The kind is carried as a plain
/// string because the referenced kind is resolved against the entity
/// database only during the linking phase.
///
/// Serializes as the `"kind:id"` string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelativeAssociation {
    /// Remote name of the referenced kind.
    pub kind: String,
    /// Remote identifier of the referenced record.
    pub id: RecordId,
}

impl RelativeAssociation {
    /// Creates a reference to the record `id` of `kind`.
    pub fn new(kind: impl Into<String>, id: impl Into<RecordId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RelativeAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for RelativeAssociation {
    type Err = ParseAssociationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() => {
                Ok(Self::new(kind, id))
            }
            _ => Err(ParseAssociationError(s.to_string())),
        }
    }
}

impl Serialize for RelativeAssociation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RelativeAssociation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
