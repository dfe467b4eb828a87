//! Collaborator contracts for the remote store.
//!
//! These traits abstract the transport layer, allowing different
//! implementations (HTTP client, cached replay, mock for testing).
//! The core suspends only at these bulk-call boundaries; pagination,
//! retry and backoff are the implementation's concern.

use crate::error::{CoreError, CoreResult};
use crmsync_protocol::{
    AssociationInput, CreatedRecord, EntityKind, NewRecord, RawRecord, RecordUpdate,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Receives progress notifications during long downloads.
pub trait Progress: Send + Sync {
    /// Reports the expected total, once known.
    fn set_count(&self, count: usize);

    /// Reports one unit of completed work.
    fn tick(&self);
}

/// A progress handle that ignores all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl Progress for NullProgress {
    fn set_count(&self, _count: usize) {}

    fn tick(&self) {}
}

/// Downloads raw records from the remote store.
pub trait EntityDownloader: Send + Sync {
    /// Downloads every record of `kind`, with the given properties and
    /// the association references toward the given kinds.
    fn download_entities(
        &self,
        progress: &dyn Progress,
        kind: EntityKind,
        properties: &[String],
        association_kinds: &[EntityKind],
    ) -> CoreResult<Vec<RawRecord>>;
}

/// Pushes local changes to the remote store.
pub trait EntityUploader: Send + Sync {
    /// Bulk-creates records, returning one result per created record
    /// in no guaranteed order.
    fn create_entities(
        &self,
        kind: EntityKind,
        inputs: Vec<NewRecord>,
    ) -> CoreResult<Vec<CreatedRecord>>;

    /// Bulk-updates records.
    fn update_entities(&self, kind: EntityKind, inputs: Vec<RecordUpdate>) -> CoreResult<()>;

    /// Bulk-creates associations from `kind` records to `other_kind`
    /// records.
    fn create_associations(
        &self,
        kind: EntityKind,
        other_kind: EntityKind,
        inputs: Vec<AssociationInput>,
    ) -> CoreResult<()>;

    /// Bulk-deletes associations from `kind` records to `other_kind`
    /// records.
    fn delete_associations(
        &self,
        kind: EntityKind,
        other_kind: EntityKind,
        inputs: Vec<AssociationInput>,
    ) -> CoreResult<()>;
}

/// A mock remote store for testing.
///
/// Serves canned records and creation results per kind, and records
/// every upload call for inspection.
#[derive(Default)]
pub struct MockRemote {
    records: Mutex<HashMap<String, Vec<RawRecord>>>,
    creation_results: Mutex<HashMap<String, Vec<CreatedRecord>>>,
    created: Mutex<Vec<(EntityKind, Vec<NewRecord>)>>,
    updated: Mutex<Vec<(EntityKind, Vec<RecordUpdate>)>>,
    associated: Mutex<Vec<(EntityKind, EntityKind, Vec<AssociationInput>)>>,
    disassociated: Mutex<Vec<(EntityKind, EntityKind, Vec<AssociationInput>)>>,
}

impl MockRemote {
    /// Creates an empty mock remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the records served for `kind`.
    pub fn set_records(&self, kind: EntityKind, records: Vec<RawRecord>) {
        self.records
            .lock()
            .unwrap()
            .insert(kind.as_str().to_string(), records);
    }

    /// Sets the creation results returned for `kind`.
    pub fn set_creation_results(&self, kind: EntityKind, results: Vec<CreatedRecord>) {
        self.creation_results
            .lock()
            .unwrap()
            .insert(kind.as_str().to_string(), results);
    }

    /// Returns the captured bulk-create calls.
    pub fn created_calls(&self) -> Vec<(EntityKind, Vec<NewRecord>)> {
        self.created.lock().unwrap().clone()
    }

    /// Returns the captured bulk-update calls.
    pub fn updated_calls(&self) -> Vec<(EntityKind, Vec<RecordUpdate>)> {
        self.updated.lock().unwrap().clone()
    }

    /// Returns the captured bulk-associate calls.
    pub fn associated_calls(&self) -> Vec<(EntityKind, EntityKind, Vec<AssociationInput>)> {
        self.associated.lock().unwrap().clone()
    }

    /// Returns the captured bulk-disassociate calls.
    pub fn disassociated_calls(&self) -> Vec<(EntityKind, EntityKind, Vec<AssociationInput>)> {
        self.disassociated.lock().unwrap().clone()
    }
}

impl EntityDownloader for MockRemote {
    fn download_entities(
        &self,
        progress: &dyn Progress,
        kind: EntityKind,
        _properties: &[String],
        _association_kinds: &[EntityKind],
    ) -> CoreResult<Vec<RawRecord>> {
        let records = self
            .records
            .lock()
            .unwrap()
            .get(kind.as_str())
            .cloned()
            .unwrap_or_default();
        progress.set_count(records.len());
        for _ in &records {
            progress.tick();
        }
        Ok(records)
    }
}

impl EntityUploader for MockRemote {
    fn create_entities(
        &self,
        kind: EntityKind,
        inputs: Vec<NewRecord>,
    ) -> CoreResult<Vec<CreatedRecord>> {
        self.created.lock().unwrap().push((kind, inputs));
        self.creation_results
            .lock()
            .unwrap()
            .get(kind.as_str())
            .cloned()
            .ok_or_else(|| {
                CoreError::remote(format!("no mock creation results set for kind {kind}"))
            })
    }

    fn update_entities(&self, kind: EntityKind, inputs: Vec<RecordUpdate>) -> CoreResult<()> {
        self.updated.lock().unwrap().push((kind, inputs));
        Ok(())
    }

    fn create_associations(
        &self,
        kind: EntityKind,
        other_kind: EntityKind,
        inputs: Vec<AssociationInput>,
    ) -> CoreResult<()> {
        self.associated.lock().unwrap().push((kind, other_kind, inputs));
        Ok(())
    }

    fn delete_associations(
        &self,
        kind: EntityKind,
        other_kind: EntityKind,
        inputs: Vec<AssociationInput>,
    ) -> CoreResult<()> {
        self.disassociated
            .lock()
            .unwrap()
            .push((kind, other_kind, inputs));
        Ok(())
    }
}
