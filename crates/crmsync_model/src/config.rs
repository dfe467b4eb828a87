//! Configured remote-store property names and mapping values.
//!
//! These are opaque strings that vary per remote account: internal
//! pipeline and stage identifiers, and the names of the custom
//! properties the account administrator created. The configuration
//! layer fills them in; the adapters only carry them.

/// Remote-account configuration injected into the domain adapters.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Internal value of the pipeline deals are mirrored from; deals
    /// in any other pipeline are rejected at download time.
    pub pipeline: String,
    /// Internal values of the deal stages.
    pub deal_stages: DealStageValues,
    /// Custom deal property names.
    pub deal_attrs: DealAttrs,
    /// Custom contact property names.
    pub contact_attrs: ContactAttrs,
}

/// Internal remote values of the three deal stages.
#[derive(Debug, Clone)]
pub struct DealStageValues {
    /// Stage for deals under evaluation.
    pub eval: String,
    /// Stage for won deals.
    pub closed_won: String,
    /// Stage for lost deals.
    pub closed_lost: String,
}

/// Names of the custom deal properties.
#[derive(Debug, Clone)]
pub struct DealAttrs {
    /// Property holding the license identifier a deal was opened for.
    pub addon_license_id: String,
    /// Property holding the transaction identifier a deal was closed
    /// against.
    pub transaction_id: String,
    /// Optional property holding the hosting deployment.
    pub deployment: Option<String>,
    /// Optional property holding the product key.
    pub app: Option<String>,
}

/// Names of the custom contact properties.
#[derive(Debug, Clone)]
pub struct ContactAttrs {
    /// Property distinguishing partners from customers.
    pub contact_type: String,
    /// Property holding the derived geographic region.
    pub region: String,
    /// Property holding the semicolon-joined related products.
    pub related_products: String,
    /// Property holding the highest seen license tier.
    pub license_tier: String,
    /// Property holding the hosting deployment.
    pub deployment: String,
    /// Property holding the semicolon-joined licensed products.
    pub products: String,
    /// Property holding the timestamp of the last marketplace event.
    pub last_event: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            pipeline: "marketplace".to_string(),
            deal_stages: DealStageValues {
                eval: "evaluation".to_string(),
                closed_won: "closedwon".to_string(),
                closed_lost: "closedlost".to_string(),
            },
            deal_attrs: DealAttrs {
                addon_license_id: "addon_license_id".to_string(),
                transaction_id: "transaction_id".to_string(),
                deployment: Some("deployment".to_string()),
                app: Some("product_key".to_string()),
            },
            contact_attrs: ContactAttrs {
                contact_type: "contact_type".to_string(),
                region: "region".to_string(),
                related_products: "related_products".to_string(),
                license_tier: "license_tier".to_string(),
                deployment: "deployment".to_string(),
                products: "products".to_string(),
                last_event: "last_marketplace_event".to_string(),
            },
        }
    }
}
