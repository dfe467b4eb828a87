//! Deals: one per license or transaction in the mirrored pipeline.

use crate::company::COMPANY;
use crate::config::{DealStageValues, ModelConfig};
use crate::contact::CONTACT;
use crate::deployment::Deployment;
use crate::fields::{
    is_non_blank, is_non_zero_number, opt_encode, opt_f64, opt_i64, opt_string,
};
use crmsync_core::{
    AssociationSpec, ComputedSpec, CoreError, CoreResult, Entity, EntityAdapter, EntityDatabase,
    EntityDownloader, EntityKind, EntityManager, EntityUploader, FieldSpec, IndexHandle, Progress,
    SyncCounts,
};
use std::sync::Arc;

/// The deal kind.
pub const DEAL: EntityKind = EntityKind::new("deal");

/// A deal entity.
pub type Deal = Entity<DealData, DealComputed>;

/// The pipeline a mirrored deal lives in.
///
/// Only the marketplace pipeline is mirrored; deals in other
/// pipelines are rejected at download time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pipeline {
    /// The marketplace sales pipeline.
    #[default]
    Marketplace,
}

/// Stage of a deal within its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DealStage {
    /// License under evaluation.
    #[default]
    Eval,
    /// Deal won.
    ClosedWon,
    /// Deal lost.
    ClosedLost,
}

impl DealStage {
    fn from_value(stages: &DealStageValues, value: &str) -> CoreResult<Self> {
        if value == stages.eval {
            Ok(Self::Eval)
        } else if value == stages.closed_won {
            Ok(Self::ClosedWon)
        } else if value == stages.closed_lost {
            Ok(Self::ClosedLost)
        } else {
            Err(CoreError::config_mapping(
                "deal stage",
                value,
                format!(
                    "eval={}, closed_won={}, closed_lost={}",
                    stages.eval, stages.closed_won, stages.closed_lost
                ),
            ))
        }
    }

    fn value(self, stages: &DealStageValues) -> String {
        match self {
            Self::Eval => stages.eval.clone(),
            Self::ClosedWon => stages.closed_won.clone(),
            Self::ClosedLost => stages.closed_lost.clone(),
        }
    }
}

/// Typed deal fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DealData {
    /// Semicolon-joined related products, if set.
    pub related_products: Option<String>,
    /// Product key, if the account has the custom property.
    pub app: Option<String>,
    /// License identifier the deal was opened for.
    pub addon_license_id: Option<String>,
    /// Transaction identifier the deal was closed against.
    pub transaction_id: Option<String>,
    /// Close date, truncated to `YYYY-MM-DD`.
    pub close_date: String,
    /// Customer country.
    pub country: String,
    /// Display name of the deal.
    pub deal_name: String,
    /// Origin marker for deals this system created.
    pub origin: Option<String>,
    /// Hosting deployment, if the account has the custom property.
    pub deployment: Option<Deployment>,
    /// License tier.
    pub license_tier: i64,
    /// The pipeline the deal lives in.
    pub pipeline: Pipeline,
    /// Current stage.
    pub deal_stage: DealStage,
    /// Deal amount, if priced.
    pub amount: Option<f64>,
}

impl DealData {
    /// Returns true if the deal is still under evaluation.
    #[must_use]
    pub fn is_eval(&self) -> bool {
        self.deal_stage == DealStage::Eval
    }

    /// Returns true if the deal is won or lost.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.deal_stage, DealStage::ClosedWon | DealStage::ClosedLost)
    }
}

/// Derived deal fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DealComputed {
    /// True if any owner or engagement activity signal is set; used
    /// to decide which of two duplicate deals to keep.
    pub has_activity: bool,
}

/// Activity signals that count when non-blank.
const BLANK_ACTIVITY_PROPERTIES: [&str; 7] = [
    "user_ids_of_all_owners",
    "engagements_last_meeting_booked",
    "latest_meeting_activity",
    "notes_last_contacted",
    "notes_last_updated",
    "notes_next_activity_date",
    "sales_email_last_replied",
];

/// Activity signals that count when a non-zero number.
const COUNT_ACTIVITY_PROPERTIES: [&str; 2] = ["num_contacted_notes", "num_notes"];

/// Builds the deal adapter for one remote account.
pub fn deal_adapter(config: &ModelConfig) -> EntityAdapter<DealData, DealComputed> {
    let reject_pipeline = config.pipeline.clone();
    let down_pipeline = config.pipeline.clone();
    let up_pipeline = config.pipeline.clone();
    let down_stages = config.deal_stages.clone();
    let up_stages = config.deal_stages.clone();

    let adapter = EntityAdapter::new()
        .reject_when(move |bag| {
            bag.get("pipeline").map(String::as_str) != Some(reject_pipeline.as_str())
        })
        .field(FieldSpec::mapped(
            "related_products",
            "related_products",
            |d: &mut DealData, v| {
                d.related_products = opt_string(v);
                Ok(())
            },
            |d| opt_encode(&d.related_products),
        ))
        .field(
            FieldSpec::mapped(
                "addon_license_id",
                config.deal_attrs.addon_license_id.clone(),
                |d: &mut DealData, v| {
                    d.addon_license_id = opt_string(v);
                    Ok(())
                },
                |d| opt_encode(&d.addon_license_id),
            )
            .identifier(),
        )
        .field(
            FieldSpec::mapped(
                "transaction_id",
                config.deal_attrs.transaction_id.clone(),
                |d: &mut DealData, v| {
                    d.transaction_id = opt_string(v);
                    Ok(())
                },
                |d| opt_encode(&d.transaction_id),
            )
            .identifier(),
        )
        .field(FieldSpec::mapped(
            "close_date",
            "closedate",
            |d: &mut DealData, v| {
                let s = v.unwrap_or_default();
                d.close_date = s.get(..10).unwrap_or(s).to_string();
                Ok(())
            },
            |d| d.close_date.clone(),
        ))
        .field(FieldSpec::mapped(
            "country",
            "country",
            |d: &mut DealData, v| {
                d.country = v.unwrap_or_default().to_string();
                Ok(())
            },
            |d| d.country.clone(),
        ))
        .field(FieldSpec::mapped(
            "deal_name",
            "dealname",
            |d: &mut DealData, v| {
                d.deal_name = v.unwrap_or_default().to_string();
                Ok(())
            },
            |d| d.deal_name.clone(),
        ))
        .field(FieldSpec::mapped(
            "origin",
            "origin",
            |d: &mut DealData, v| {
                d.origin = opt_string(v);
                Ok(())
            },
            |d| opt_encode(&d.origin),
        ))
        .field(FieldSpec::mapped(
            "license_tier",
            "license_tier",
            |d: &mut DealData, v| {
                d.license_tier = opt_i64("license_tier", v)?.unwrap_or(0);
                Ok(())
            },
            |d| d.license_tier.to_string(),
        ))
        .field(FieldSpec::mapped(
            "pipeline",
            "pipeline",
            move |d: &mut DealData, v| {
                let value = v.unwrap_or_default();
                if value == down_pipeline {
                    d.pipeline = Pipeline::Marketplace;
                    Ok(())
                } else {
                    Err(CoreError::config_mapping(
                        "deal pipeline",
                        value,
                        down_pipeline.clone(),
                    ))
                }
            },
            move |_| up_pipeline.clone(),
        ))
        .field(FieldSpec::mapped(
            "deal_stage",
            "dealstage",
            move |d: &mut DealData, v| {
                d.deal_stage = DealStage::from_value(&down_stages, v.unwrap_or_default())?;
                Ok(())
            },
            move |d| d.deal_stage.value(&up_stages),
        ))
        .field(FieldSpec::mapped(
            "amount",
            "amount",
            |d: &mut DealData, v| {
                d.amount = opt_f64("amount", v)?;
                Ok(())
            },
            |d| d.amount.map(|a| a.to_string()).unwrap_or_default(),
        ));

    let adapter = match &config.deal_attrs.app {
        Some(attr) => adapter.field(FieldSpec::mapped(
            "app",
            attr.clone(),
            |d: &mut DealData, v| {
                d.app = opt_string(v);
                Ok(())
            },
            |d| opt_encode(&d.app),
        )),
        None => adapter.field(FieldSpec::local(
            "app",
            |d: &mut DealData, _| {
                d.app = None;
                Ok(())
            },
            |d| opt_encode(&d.app),
        )),
    };

    let adapter = match &config.deal_attrs.deployment {
        Some(attr) => adapter.field(FieldSpec::mapped(
            "deployment",
            attr.clone(),
            |d: &mut DealData, v| {
                d.deployment = v.and_then(Deployment::parse);
                Ok(())
            },
            |d| d.deployment.map(|dep| dep.as_str().to_string()).unwrap_or_default(),
        )),
        None => adapter.field(FieldSpec::local(
            "deployment",
            |d: &mut DealData, _| {
                d.deployment = None;
                Ok(())
            },
            |d| d.deployment.map(|dep| dep.as_str().to_string()).unwrap_or_default(),
        )),
    };

    adapter
        .computed(ComputedSpec::new(
            "has_activity",
            BLANK_ACTIVITY_PROPERTIES
                .iter()
                .chain(COUNT_ACTIVITY_PROPERTIES.iter())
                .copied(),
            |c: &mut DealComputed, bag| {
                c.has_activity = BLANK_ACTIVITY_PROPERTIES
                    .iter()
                    .any(|p| is_non_blank(bag.get(*p)))
                    || COUNT_ACTIVITY_PROPERTIES
                        .iter()
                        .any(|p| is_non_zero_number(bag.get(*p)));
            },
        ))
        .association(AssociationSpec::down_up(COMPANY))
        .association(AssociationSpec::down_up(CONTACT))
}

/// Owns the mirrored deals.
pub struct DealManager {
    manager: EntityManager<DealData, DealComputed>,
    by_addon_license_id: IndexHandle,
    by_transaction_id: IndexHandle,
}

impl DealManager {
    /// Creates the deal manager for one remote account.
    pub fn new(config: &ModelConfig, db: Arc<EntityDatabase>) -> Self {
        let mut manager = EntityManager::new(DEAL, deal_adapter(config), db);
        let by_addon_license_id =
            manager.register_index(|deal| deal.data().addon_license_id.into_iter().collect());
        let by_transaction_id =
            manager.register_index(|deal| deal.data().transaction_id.into_iter().collect());
        Self {
            manager,
            by_addon_license_id,
            by_transaction_id,
        }
    }

    /// Returns the underlying manager.
    #[must_use]
    pub fn manager(&self) -> &EntityManager<DealData, DealComputed> {
        &self.manager
    }

    /// Downloads and decodes every deal in the mirrored pipeline.
    pub fn download_all_entities(
        &mut self,
        progress: &dyn Progress,
        downloader: &dyn EntityDownloader,
    ) -> CoreResult<()> {
        self.manager.download_all_entities(progress, downloader)
    }

    /// Attaches downloaded company and contact references.
    pub fn link_associations(&mut self) -> CoreResult<()> {
        self.manager.link_associations()
    }

    /// Pushes deal property changes.
    pub fn sync_up_all_entities(&mut self, uploader: &dyn EntityUploader) -> CoreResult<()> {
        self.manager.sync_up_all_entities(uploader)
    }

    /// Pushes deal association changes.
    pub fn sync_up_all_associations(&mut self, uploader: &dyn EntityUploader) -> CoreResult<()> {
        self.manager.sync_up_all_associations(uploader)
    }

    /// Creates a deal that does not exist remotely yet.
    pub fn create(&mut self, data: DealData) -> Arc<Deal> {
        self.manager.create(data)
    }

    /// Returns every mirrored deal.
    #[must_use]
    pub fn entities(&self) -> &[Arc<Deal>] {
        self.manager.entities()
    }

    /// Returns the accumulated sync counters.
    #[must_use]
    pub fn counts(&self) -> SyncCounts {
        self.manager.counts()
    }

    /// Looks up the deal opened for a license.
    #[must_use]
    pub fn get_by_addon_license_id(&self, id: &str) -> Option<Arc<Deal>> {
        self.manager.lookup(self.by_addon_license_id, id)
    }

    /// Looks up the deal closed against a transaction.
    #[must_use]
    pub fn get_by_transaction_id(&self, id: &str) -> Option<Arc<Deal>> {
        self.manager.lookup(self.by_transaction_id, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_core::PropertyMap;

    fn config() -> ModelConfig {
        ModelConfig::default()
    }

    fn bag(entries: &[(&str, &str)]) -> PropertyMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_bag() -> PropertyMap {
        bag(&[
            ("pipeline", "marketplace"),
            ("dealstage", "evaluation"),
            ("closedate", "2024-05-01T12:30:00Z"),
            ("country", "DE"),
            ("dealname", "Example Co at 50 Users"),
            ("license_tier", "7"),
            ("amount", "1000.00"),
            ("addon_license_id", "AL-1"),
            ("transaction_id", ""),
            ("deployment", "Data Center"),
            ("product_key", "example-app"),
        ])
    }

    #[test]
    fn decode_full_record() {
        let adapter = deal_adapter(&config());
        let data = adapter.decode_data(&full_bag()).unwrap();

        assert_eq!(data.pipeline, Pipeline::Marketplace);
        assert_eq!(data.deal_stage, DealStage::Eval);
        assert_eq!(data.close_date, "2024-05-01");
        assert_eq!(data.license_tier, 7);
        assert_eq!(data.amount, Some(1000.0));
        assert_eq!(data.addon_license_id.as_deref(), Some("AL-1"));
        assert_eq!(data.transaction_id, None);
        assert_eq!(data.deployment, Some(Deployment::DataCenter));
        assert_eq!(data.app.as_deref(), Some("example-app"));
        assert!(data.is_eval());
        assert!(!data.is_closed());
    }

    #[test]
    fn numeric_tier_round_trip() {
        let adapter = deal_adapter(&config());
        let data = adapter.decode_data(&full_bag()).unwrap();
        let encoded = adapter.encode_fields(&data);
        assert_eq!(encoded.get("license_tier").unwrap(), "7");
    }

    #[test]
    fn encode_normalizes_amount() {
        let adapter = deal_adapter(&config());
        let data = adapter.decode_data(&full_bag()).unwrap();
        // "1000.00" decodes to 1000 and re-encodes canonically; the
        // baseline keeps the canonical form so no diff appears.
        let encoded = adapter.encode_fields(&data);
        assert_eq!(encoded.get("amount").unwrap(), "1000");
    }

    #[test]
    fn foreign_pipeline_is_rejected() {
        let adapter = deal_adapter(&config());
        assert!(adapter.rejects(&bag(&[("pipeline", "enterprise")])));
        assert!(adapter.rejects(&PropertyMap::new()));
        assert!(!adapter.rejects(&bag(&[("pipeline", "marketplace")])));
    }

    #[test]
    fn unknown_stage_is_a_mapping_error() {
        let adapter = deal_adapter(&config());
        let mut properties = full_bag();
        properties.insert("dealstage".to_string(), "negotiation".to_string());

        let err = adapter.decode_data(&properties).unwrap_err();
        assert!(matches!(err, CoreError::ConfigMapping { .. }));
        assert!(err.to_string().contains("negotiation"));
    }

    #[test]
    fn stage_values_round_trip() {
        let stages = config().deal_stages;
        for stage in [DealStage::Eval, DealStage::ClosedWon, DealStage::ClosedLost] {
            assert_eq!(
                DealStage::from_value(&stages, &stage.value(&stages)).unwrap(),
                stage
            );
        }
    }

    #[test]
    fn has_activity_from_signals() {
        let adapter = deal_adapter(&config());

        let computed = adapter.decode_computed(&bag(&[("notes_last_updated", "2024-01-01")]));
        assert!(computed.has_activity);

        let computed = adapter.decode_computed(&bag(&[("num_notes", "2")]));
        assert!(computed.has_activity);

        let computed = adapter.decode_computed(&bag(&[("num_notes", "0")]));
        assert!(!computed.has_activity);

        assert!(!adapter.decode_computed(&PropertyMap::new()).has_activity);
    }

    #[test]
    fn activity_signals_are_requested_at_download() {
        let adapter = deal_adapter(&config());
        let properties = adapter.requested_properties();
        assert!(properties.contains(&"num_notes".to_string()));
        assert!(properties.contains(&"notes_last_contacted".to_string()));
    }

    #[test]
    fn unconfigured_attrs_are_neither_requested_nor_encoded() {
        let mut config = config();
        config.deal_attrs.app = None;
        config.deal_attrs.deployment = None;
        let adapter = deal_adapter(&config);

        let properties = adapter.requested_properties();
        assert!(!properties.contains(&"product_key".to_string()));
        assert!(!properties.contains(&"deployment".to_string()));

        let data = DealData {
            app: Some("example-app".to_string()),
            deployment: Some(Deployment::Cloud),
            ..DealData::default()
        };
        let encoded = adapter.encode_fields(&data);
        assert!(!encoded.contains_key("product_key"));
        assert!(!encoded.contains_key("deployment"));
    }
}
