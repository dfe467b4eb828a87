//! # crmsync Core
//!
//! A local, strongly-typed mirror of records held in a remote
//! property-bag record store, with change tracking and batched
//! write-back.
//!
//! This crate provides:
//! - Declarative field/association adapters (decode, encode, identify)
//! - Change-tracked entities with per-kind association sets
//! - Secondary indexes, rebuilt wholesale at manager sync points
//! - The per-kind entity manager (download, link, diff, upload)
//! - A cross-kind entity database used during association linking
//! - The collaborator contracts a transport implementation satisfies
//!
//! ## Lifecycle
//!
//! One synchronization run proceeds in fixed phases:
//! 1. `download_all_entities` for every kind
//! 2. `link_associations` for every kind (requires step 1 complete)
//! 3. business logic mutates entities and creates new ones
//! 4. `sync_up_all_entities` (properties) for every kind
//! 5. `sync_up_all_associations` for every kind
//!
//! ## Key Invariants
//!
//! - A remote ID transitions absent → present exactly once
//! - A property absent from an up-sync payload is unchanged since the
//!   last sync (its baseline)
//! - Computed fields never appear in up-sync payloads
//! - Mapping failures, dangling references, and unresolved creation
//!   identities abort the run; there is no retry or partial recovery

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod database;
mod entity;
mod error;
mod index;
mod manager;
mod service;

pub use adapter::{AssociationSpec, ComputedSpec, Direction, EntityAdapter, FieldSpec};
pub use database::EntityDatabase;
pub use entity::{downcast_entity, AnyEntity, AssociationChange, AssociationOp, DynEntity, Entity};
pub use error::{CoreError, CoreResult};
pub use index::Index;
pub use manager::{EntityManager, IndexHandle, SyncCounts};
pub use service::{EntityDownloader, EntityUploader, MockRemote, NullProgress, Progress};

pub use crmsync_protocol::{
    AssociationInput, CreatedRecord, EntityKind, NewRecord, PropertyMap, RawRecord, RecordId,
    RecordUpdate, RelativeAssociation,
};
