//! Error types for the sync core.
//!
//! Every error in this taxonomy is fatal within a run: the
//! property-bag ↔ entity mapping is a correctness precondition, not a
//! recoverable runtime condition. Callers propagate these upward and
//! abort the run; no retry is implied.

use thiserror::Error;
use uuid::Uuid;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in sync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A remote value could not be matched against a configured
    /// enumerated mapping (e.g. an unrecognized pipeline or stage).
    #[error("cannot map remote value {value:?} for {what} (known mappings: {mapping})")]
    ConfigMapping {
        /// What was being mapped.
        what: String,
        /// The unmatched remote value.
        value: String,
        /// The configured mappings that were tried.
        mapping: String,
    },

    /// An association referenced an entity that is not present, or a
    /// manager could not find an entity by an id it just produced.
    #[error("entity not found: kind={kind} id={id}")]
    MissingEntity {
        /// Remote name of the kind searched.
        kind: String,
        /// The remote identifier that failed to resolve.
        id: String,
    },

    /// An operation that requires a remote ID reached an entity that
    /// has not been created remotely yet.
    #[error("entity kind={kind} local={local_id} has no remote id yet")]
    MissingRemoteId {
        /// Remote name of the entity's kind.
        kind: String,
        /// Run-local identity of the entity.
        local_id: Uuid,
    },

    /// No creation result matched a local entity's identifier fields.
    #[error(
        "no creation result matches identifiers of local {kind} entity {local}; results: {remotes}"
    )]
    IdentityUnresolved {
        /// Remote name of the kind being created.
        kind: String,
        /// Encoded identifier fields of the local entity.
        local: String,
        /// The creation results that were searched.
        remotes: String,
    },

    /// More than one creation result matched a local entity's
    /// identifier fields, or one result matched two local entities.
    #[error("ambiguous creation results for local {kind} entity {local}; matched: {matched}")]
    IdentityAmbiguous {
        /// Remote name of the kind being created.
        kind: String,
        /// Encoded identifier fields of the local entity.
        local: String,
        /// The conflicting creation results.
        matched: String,
    },

    /// A remote property value could not be decoded into its typed
    /// field.
    #[error("invalid value for property {property:?}: {message}")]
    InvalidProperty {
        /// Remote name of the property.
        property: String,
        /// Description of the failure.
        message: String,
    },

    /// The remote collaborator reported a failure.
    #[error("remote service error: {message}")]
    Remote {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a configuration-mapping error.
    pub fn config_mapping(
        what: impl Into<String>,
        value: impl Into<String>,
        mapping: impl Into<String>,
    ) -> Self {
        Self::ConfigMapping {
            what: what.into(),
            value: value.into(),
            mapping: mapping.into(),
        }
    }

    /// Creates a referential-integrity error.
    pub fn missing_entity(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::MissingEntity {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates an invalid-property error.
    pub fn invalid_property(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidProperty {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates a remote-service error.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }
}
