//! Companies: the passive side of deal and contact relations.

use crate::fields::{opt_encode, opt_string};
use crmsync_core::{
    CoreResult, Entity, EntityAdapter, EntityDatabase, EntityDownloader, EntityKind,
    EntityManager, EntityUploader, FieldSpec, Progress, SyncCounts,
};
use std::sync::Arc;

/// The company kind.
pub const COMPANY: EntityKind = EntityKind::new("company");

/// A company entity.
pub type Company = Entity<CompanyData, ()>;

/// Typed company fields.
///
/// Companies are mirrored read-only: deals and contacts own the
/// associations toward them, and nothing here is ever pushed back.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompanyData {
    /// Display name.
    pub name: String,
    /// Company type marker, when set.
    pub company_type: Option<String>,
}

/// Builds the company adapter.
#[must_use]
pub fn company_adapter() -> EntityAdapter<CompanyData, ()> {
    EntityAdapter::new()
        .field(FieldSpec::mapped(
            "name",
            "name",
            |d: &mut CompanyData, v| {
                d.name = v.unwrap_or_default().to_string();
                Ok(())
            },
            |d| d.name.clone(),
        ))
        .field(FieldSpec::mapped(
            "company_type",
            "type",
            |d: &mut CompanyData, v| {
                d.company_type = opt_string(v);
                Ok(())
            },
            |d| opt_encode(&d.company_type),
        ))
}

/// Owns the mirrored companies.
pub struct CompanyManager {
    manager: EntityManager<CompanyData, ()>,
}

impl CompanyManager {
    /// Creates the company manager.
    pub fn new(db: Arc<EntityDatabase>) -> Self {
        Self {
            manager: EntityManager::new(COMPANY, company_adapter(), db),
        }
    }

    /// Returns the underlying manager.
    #[must_use]
    pub fn manager(&self) -> &EntityManager<CompanyData, ()> {
        &self.manager
    }

    /// Downloads and decodes every company.
    pub fn download_all_entities(
        &mut self,
        progress: &dyn Progress,
        downloader: &dyn EntityDownloader,
    ) -> CoreResult<()> {
        self.manager.download_all_entities(progress, downloader)
    }

    /// Companies declare no associations of their own; linking is a
    /// no-op kept for phase symmetry with the other managers.
    pub fn link_associations(&mut self) -> CoreResult<()> {
        self.manager.link_associations()
    }

    /// Pushes company property changes.
    pub fn sync_up_all_entities(&mut self, uploader: &dyn EntityUploader) -> CoreResult<()> {
        self.manager.sync_up_all_entities(uploader)
    }

    /// Returns every mirrored company.
    #[must_use]
    pub fn entities(&self) -> &[Arc<Company>] {
        self.manager.entities()
    }

    /// Returns the accumulated sync counters.
    #[must_use]
    pub fn counts(&self) -> SyncCounts {
        self.manager.counts()
    }
}
