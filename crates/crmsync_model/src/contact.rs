//! Contacts: customers and partner reps, keyed by email.

use crate::company::COMPANY;
use crate::config::ModelConfig;
use crate::deployment::Deployment;
use crate::fields::{join_set, opt_encode, opt_i64, opt_string, split_set, trimmed};
use crmsync_core::{
    AssociationSpec, ComputedSpec, CoreResult, Entity, EntityAdapter, EntityDatabase,
    EntityDownloader, EntityKind, EntityManager, EntityUploader, FieldSpec, IndexHandle, Progress,
    SyncCounts,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The contact kind.
pub const CONTACT: EntityKind = EntityKind::new("contact");

/// A contact entity.
pub type Contact = Entity<ContactData, ContactComputed>;

/// Whether a contact buys licenses or resells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactType {
    /// A reselling partner.
    Partner,
    /// A buying customer.
    Customer,
}

impl ContactType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "Partner" => Some(Self::Partner),
            "Customer" => Some(Self::Customer),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Partner => "Partner",
            Self::Customer => "Customer",
        }
    }
}

/// Typed contact fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContactData {
    /// Primary email; the identifier for re-matching created records.
    pub email: String,
    /// First name, trimmed; blank reads as absent.
    pub first_name: Option<String>,
    /// Last name, trimmed; blank reads as absent.
    pub last_name: Option<String>,
    /// Phone number, trimmed; blank reads as absent.
    pub phone: Option<String>,
    /// City, trimmed; blank reads as absent.
    pub city: Option<String>,
    /// State, trimmed; blank reads as absent.
    pub state: Option<String>,
    /// Partner or customer, when known.
    pub contact_type: Option<ContactType>,
    /// Country.
    pub country: Option<String>,
    /// Derived geographic region.
    pub region: Option<String>,
    /// Licensed products.
    pub products: BTreeSet<String>,
    /// Hosting deployment across the contact's installs.
    pub deployment: Option<Deployment>,
    /// Products related to the contact's licenses.
    pub related_products: BTreeSet<String>,
    /// Highest license tier seen for this contact.
    pub license_tier: Option<i64>,
    /// Timestamp of the last marketplace event.
    pub last_event: Option<String>,
}

impl ContactData {
    /// Returns true if the contact is a reselling partner.
    #[must_use]
    pub fn is_partner(&self) -> bool {
        self.contact_type == Some(ContactType::Partner)
    }

    /// Returns true if the contact is a buying customer.
    #[must_use]
    pub fn is_customer(&self) -> bool {
        self.contact_type == Some(ContactType::Customer)
    }

    /// Returns true if the contact did not come from marketplace data.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.email.is_empty() || self.contact_type.is_none()
    }
}

/// Derived contact fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContactComputed {
    /// Additional emails the remote store knows for this contact.
    pub other_emails: Vec<String>,
}

/// Returns every email of a contact: the primary one plus the
/// remote store's additional emails.
#[must_use]
pub fn all_emails(contact: &Contact) -> Vec<String> {
    let mut emails = Vec::new();
    let primary = contact.data().email;
    if !primary.is_empty() {
        emails.push(primary);
    }
    emails.extend(contact.computed().other_emails);
    emails
}

/// Builds the contact adapter for one remote account.
pub fn contact_adapter(config: &ModelConfig) -> EntityAdapter<ContactData, ContactComputed> {
    let attrs = &config.contact_attrs;

    EntityAdapter::new()
        .field(
            FieldSpec::mapped(
                "email",
                "email",
                |d: &mut ContactData, v| {
                    d.email = v.unwrap_or_default().to_string();
                    Ok(())
                },
                |d| d.email.clone(),
            )
            .identifier(),
        )
        .field(FieldSpec::mapped(
            "contact_type",
            attrs.contact_type.clone(),
            |d: &mut ContactData, v| {
                d.contact_type = v.and_then(ContactType::parse);
                Ok(())
            },
            |d| d.contact_type.map(|t| t.as_str().to_string()).unwrap_or_default(),
        ))
        .field(FieldSpec::mapped(
            "country",
            "country",
            |d: &mut ContactData, v| {
                d.country = opt_string(v);
                Ok(())
            },
            |d| opt_encode(&d.country),
        ))
        .field(FieldSpec::mapped(
            "region",
            attrs.region.clone(),
            |d: &mut ContactData, v| {
                d.region = opt_string(v);
                Ok(())
            },
            |d| opt_encode(&d.region),
        ))
        .field(FieldSpec::mapped(
            "first_name",
            "firstname",
            |d: &mut ContactData, v| {
                d.first_name = trimmed(v);
                Ok(())
            },
            |d| opt_encode(&d.first_name),
        ))
        .field(FieldSpec::mapped(
            "last_name",
            "lastname",
            |d: &mut ContactData, v| {
                d.last_name = trimmed(v);
                Ok(())
            },
            |d| opt_encode(&d.last_name),
        ))
        .field(FieldSpec::mapped(
            "phone",
            "phone",
            |d: &mut ContactData, v| {
                d.phone = trimmed(v);
                Ok(())
            },
            |d| opt_encode(&d.phone),
        ))
        .field(FieldSpec::mapped(
            "city",
            "city",
            |d: &mut ContactData, v| {
                d.city = trimmed(v);
                Ok(())
            },
            |d| opt_encode(&d.city),
        ))
        .field(FieldSpec::mapped(
            "state",
            "state",
            |d: &mut ContactData, v| {
                d.state = trimmed(v);
                Ok(())
            },
            |d| opt_encode(&d.state),
        ))
        .field(FieldSpec::mapped(
            "related_products",
            attrs.related_products.clone(),
            |d: &mut ContactData, v| {
                d.related_products = split_set(v);
                Ok(())
            },
            |d| join_set(&d.related_products),
        ))
        .field(FieldSpec::mapped(
            "license_tier",
            attrs.license_tier.clone(),
            {
                let property = attrs.license_tier.clone();
                move |d: &mut ContactData, v| {
                    d.license_tier = opt_i64(&property, v)?;
                    Ok(())
                }
            },
            |d| d.license_tier.map(|t| t.to_string()).unwrap_or_default(),
        ))
        .field(FieldSpec::mapped(
            "deployment",
            attrs.deployment.clone(),
            |d: &mut ContactData, v| {
                d.deployment = v.and_then(Deployment::parse);
                Ok(())
            },
            |d| d.deployment.map(|dep| dep.as_str().to_string()).unwrap_or_default(),
        ))
        .field(FieldSpec::mapped(
            "products",
            attrs.products.clone(),
            |d: &mut ContactData, v| {
                d.products = split_set(v);
                Ok(())
            },
            |d| join_set(&d.products),
        ))
        .field(FieldSpec::mapped(
            "last_event",
            attrs.last_event.clone(),
            |d: &mut ContactData, v| {
                d.last_event = opt_string(v);
                Ok(())
            },
            |d| opt_encode(&d.last_event),
        ))
        .computed(ComputedSpec::new(
            "other_emails",
            ["additional_emails"],
            |c: &mut ContactComputed, bag| {
                c.other_emails = bag
                    .get("additional_emails")
                    .filter(|s| !s.is_empty())
                    .map(|s| s.split(';').map(str::to_string).collect())
                    .unwrap_or_default();
            },
        ))
        .association(AssociationSpec::down_up(COMPANY))
}

/// Owns the mirrored contacts.
pub struct ContactManager {
    manager: EntityManager<ContactData, ContactComputed>,
    by_email: IndexHandle,
}

impl ContactManager {
    /// Creates the contact manager for one remote account.
    pub fn new(config: &ModelConfig, db: Arc<EntityDatabase>) -> Self {
        let mut manager = EntityManager::new(CONTACT, contact_adapter(config), db);
        let by_email = manager.register_index(|contact| all_emails(contact));
        Self { manager, by_email }
    }

    /// Returns the underlying manager.
    #[must_use]
    pub fn manager(&self) -> &EntityManager<ContactData, ContactComputed> {
        &self.manager
    }

    /// Downloads and decodes every contact.
    pub fn download_all_entities(
        &mut self,
        progress: &dyn Progress,
        downloader: &dyn EntityDownloader,
    ) -> CoreResult<()> {
        self.manager.download_all_entities(progress, downloader)
    }

    /// Attaches downloaded company references.
    pub fn link_associations(&mut self) -> CoreResult<()> {
        self.manager.link_associations()
    }

    /// Pushes contact property changes.
    pub fn sync_up_all_entities(&mut self, uploader: &dyn EntityUploader) -> CoreResult<()> {
        self.manager.sync_up_all_entities(uploader)
    }

    /// Pushes contact association changes.
    pub fn sync_up_all_associations(&mut self, uploader: &dyn EntityUploader) -> CoreResult<()> {
        self.manager.sync_up_all_associations(uploader)
    }

    /// Creates a contact that does not exist remotely yet.
    pub fn create(&mut self, data: ContactData) -> Arc<Contact> {
        self.manager.create(data)
    }

    /// Returns every mirrored contact.
    #[must_use]
    pub fn entities(&self) -> &[Arc<Contact>] {
        self.manager.entities()
    }

    /// Returns the accumulated sync counters.
    #[must_use]
    pub fn counts(&self) -> SyncCounts {
        self.manager.counts()
    }

    /// Looks up a contact by any of its emails.
    #[must_use]
    pub fn get_by_email(&self, email: &str) -> Option<Arc<Contact>> {
        self.manager.lookup(self.by_email, email)
    }
}
