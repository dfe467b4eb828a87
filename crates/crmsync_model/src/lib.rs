//! # crmsync Model
//!
//! The CRM domain schemas, expressed through the core adapter
//! contract: deals, contacts, and companies, with their configured
//! custom properties, enumerated mappings, identifier fields, and
//! secondary indexes.
//!
//! The property names and mapping values that vary per remote account
//! are injected through [`ModelConfig`]; everything else is fixed
//! remote-store vocabulary.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod company;
mod config;
mod contact;
mod deal;
mod deployment;
mod fields;

pub use company::{company_adapter, Company, CompanyData, CompanyManager, COMPANY};
pub use config::{ContactAttrs, DealAttrs, DealStageValues, ModelConfig};
pub use contact::{
    all_emails, contact_adapter, Contact, ContactComputed, ContactData, ContactManager,
    ContactType, CONTACT,
};
pub use deal::{deal_adapter, Deal, DealComputed, DealData, DealManager, DealStage, Pipeline, DEAL};
pub use deployment::Deployment;
