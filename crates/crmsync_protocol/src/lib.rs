//! # crmsync Protocol
//!
//! The shapes exchanged between the sync core and a remote
//! property-bag record store.
//!
//! This crate provides:
//! - Entity kind and remote record identifier types
//! - Raw downloaded record shapes (property bag + association references)
//! - Upload payload shapes (create, update, associate, disassociate)
//! - The `"kind:id"` relative-association reference format
//!
//! The concrete wire format (HTTP, pagination, retries) is the
//! transport's concern; these types only describe what crosses the
//! boundary between the core and a transport implementation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod association;
mod kind;
mod record;

pub use association::{ParseAssociationError, RelativeAssociation};
pub use kind::{EntityKind, RecordId};
pub use record::{AssociationInput, CreatedRecord, NewRecord, PropertyMap, RawRecord, RecordUpdate};
