//! Services the orchestrator consumes but does not own: content generation,
//! audience resolution and downstream suggestions.

use async_trait::async_trait;
use campaign_core::types::{Campaign, ContentBundle, Customer, Product};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─── Content supplier ──────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("content supplier unavailable: {0}")]
    Unavailable(String),

    #[error("content supplier returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Base copy for a campaign run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignAssets {
    pub title: String,
    pub subject_line: String,
    pub summary: String,
    pub hashtags: Vec<String>,
    pub email_body: String,
    pub whatsapp_message: String,
    pub social_post: String,
}

impl CampaignAssets {
    /// Channel templates; there is no base SMS copy.
    pub fn content(&self) -> ContentBundle {
        ContentBundle {
            email_body: Some(self.email_body.clone()),
            whatsapp_message: Some(self.whatsapp_message.clone()),
            sms_text: None,
            social_post: Some(self.social_post.clone()),
            subject_line: Some(self.subject_line.clone()),
            title: Some(self.title.clone()),
            hashtags: self.hashtags.clone(),
            call_to_action: None,
        }
    }
}

/// One A/B test variation as produced by the supplier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantDraft {
    pub label: String,
    pub email_body: String,
    pub sms_text: String,
    pub whatsapp_message: String,
    pub social_post: String,
    pub subject_line: String,
    pub call_to_action: String,
}

impl VariantDraft {
    pub fn payload(&self) -> ContentBundle {
        let non_blank = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        ContentBundle {
            email_body: non_blank(&self.email_body),
            whatsapp_message: non_blank(&self.whatsapp_message),
            sms_text: non_blank(&self.sms_text),
            social_post: non_blank(&self.social_post),
            subject_line: non_blank(&self.subject_line),
            title: None,
            hashtags: Vec::new(),
            call_to_action: non_blank(&self.call_to_action),
        }
    }
}

#[async_trait]
pub trait ContentSupplier: Send + Sync {
    async fn generate_campaign_assets(
        &self,
        product: &Product,
        language_code: &str,
        audience_notes: Option<&str>,
    ) -> Result<CampaignAssets, ContentError>;

    async fn generate_campaign_variants(
        &self,
        product: &Product,
        count: usize,
        language_code: &str,
        segment_profile: Option<&str>,
    ) -> Result<Vec<VariantDraft>, ContentError>;
}

/// Deterministic offline supplier. Copy carries personalization tokens so
/// the builder can fill them per customer.
#[derive(Debug, Default)]
pub struct TemplateContentSupplier;

const VARIANT_ANGLES: [(&str, &str); 4] = [
    ("A", "Limited time"),
    ("B", "Customer favourite"),
    ("C", "Just launched"),
    ("D", "Back in stock"),
];

impl TemplateContentSupplier {
    pub fn new() -> Self {
        Self
    }

    fn hashtag(name: &str) -> String {
        let tag: String = name.chars().filter(|c| c.is_alphanumeric()).collect();
        format!("#{tag}")
    }
}

#[async_trait]
impl ContentSupplier for TemplateContentSupplier {
    async fn generate_campaign_assets(
        &self,
        product: &Product,
        language_code: &str,
        audience_notes: Option<&str>,
    ) -> Result<CampaignAssets, ContentError> {
        if product.name.trim().is_empty() {
            return Err(ContentError::InvalidResponse("product has no name".into()));
        }
        debug!(
            product = %product.name,
            language = language_code,
            audience = audience_notes.unwrap_or("general audience"),
            "Generating campaign assets from templates"
        );
        Ok(CampaignAssets {
            title: format!("Meet {}", product.name),
            subject_line: format!("{{{{first_name}}}}, {} is here", product.name),
            summary: product.description.clone(),
            hashtags: vec![Self::hashtag(&product.name), "#NewArrival".to_string()],
            email_body: format!(
                "Hi {{{{first_name}}}},\n\n{}\n\nDiscover {{{{product_name}}}} today.",
                product.description
            ),
            whatsapp_message: "Hi {{first_name}}! {{product_name}} just landed. Reply YES to learn more."
                .to_string(),
            social_post: format!(
                "{} is here. {} {}",
                product.name,
                product.description,
                Self::hashtag(&product.name)
            ),
        })
    }

    async fn generate_campaign_variants(
        &self,
        product: &Product,
        count: usize,
        language_code: &str,
        segment_profile: Option<&str>,
    ) -> Result<Vec<VariantDraft>, ContentError> {
        debug!(
            product = %product.name,
            count,
            language = language_code,
            segment = segment_profile.unwrap_or("general audience"),
            "Generating variants from templates"
        );
        Ok(VARIANT_ANGLES
            .iter()
            .take(count)
            .map(|(label, angle)| VariantDraft {
                label: (*label).to_string(),
                email_body: format!("Hi {{{{first_name}}}}, {angle}: {{{{product_name}}}}."),
                sms_text: format!("{angle}: {{{{product_name}}}}. Reply STOP to opt out."),
                whatsapp_message: format!("Hi {{{{first_name}}}}! {angle}: {{{{product_name}}}}."),
                social_post: format!("{angle}: {} {}", product.name, Self::hashtag(&product.name)),
                subject_line: format!("{angle}: {}", product.name),
                call_to_action: "Shop now".to_string(),
            })
            .collect())
    }
}

// ─── Audience ──────────────────────────────────────────────────────────────

pub trait AudienceResolver: Send + Sync {
    /// Customers targeted by `campaign`, in a stable order.
    fn customers_for(&self, campaign: &Campaign) -> Vec<Customer>;
}

/// Customer book held in memory. A campaign reaches its owner's customers,
/// narrowed to those carrying any of the segment's tags when a segment with
/// tags is linked.
#[derive(Debug, Default)]
pub struct InMemoryAudience {
    customers: RwLock<Vec<Customer>>,
}

impl InMemoryAudience {
    pub fn new(customers: Vec<Customer>) -> Self {
        Self {
            customers: RwLock::new(customers),
        }
    }

    pub fn add(&self, customer: Customer) {
        self.customers.write().push(customer);
    }
}

impl AudienceResolver for InMemoryAudience {
    fn customers_for(&self, campaign: &Campaign) -> Vec<Customer> {
        let segment_tags = campaign
            .segment
            .as_ref()
            .map(|s| s.tags.as_slice())
            .unwrap_or_default();
        self.customers
            .read()
            .iter()
            .filter(|c| c.owner_id == campaign.owner_id)
            .filter(|c| segment_tags.is_empty() || c.tags.iter().any(|t| segment_tags.contains(t)))
            .cloned()
            .collect()
    }
}

// ─── Suggestions ───────────────────────────────────────────────────────────

/// Downstream next-best-action feed. Called best-effort after a run.
pub trait SuggestionSink: Send + Sync {
    fn create_suggestion(&self, campaign: &Campaign) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct NoOpSuggestions;

impl SuggestionSink for NoOpSuggestions {
    fn create_suggestion(&self, _campaign: &Campaign) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_core::types::Segment;
    use uuid::Uuid;

    fn product() -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Trail Runner 2".into(),
            description: "Lightweight trail shoes.".into(),
        }
    }

    #[tokio::test]
    async fn test_template_assets_keep_tokens() {
        let assets = TemplateContentSupplier::new()
            .generate_campaign_assets(&product(), "en", None)
            .await
            .unwrap();
        assert!(assets.email_body.starts_with("Hi {{first_name}},"));
        assert!(assets.email_body.contains("{{product_name}}"));
        assert_eq!(assets.hashtags[0], "#TrailRunner2");
        assert!(assets.content().sms_text.is_none());
    }

    #[tokio::test]
    async fn test_template_variants_are_labelled_and_capped() {
        let supplier = TemplateContentSupplier::new();
        let variants = supplier
            .generate_campaign_variants(&product(), 3, "en", None)
            .await
            .unwrap();
        let labels: Vec<&str> = variants.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C"]);
        assert!(variants[0].payload().sms_text.is_some());

        let many = supplier
            .generate_campaign_variants(&product(), 10, "en", None)
            .await
            .unwrap();
        assert_eq!(many.len(), VARIANT_ANGLES.len());
    }

    #[test]
    fn test_variant_payload_drops_blank_fields() {
        let draft = VariantDraft {
            label: "A".into(),
            email_body: "Hi".into(),
            sms_text: "   ".into(),
            ..Default::default()
        };
        let payload = draft.payload();
        assert_eq!(payload.email_body.as_deref(), Some("Hi"));
        assert!(payload.sms_text.is_none());
    }

    #[test]
    fn test_audience_filters_by_owner_and_segment_tags() {
        let owner = Uuid::new_v4();
        let audience = InMemoryAudience::new(vec![
            Customer::new(owner, "Alice", "A", "alice@example.com").with_tags(&["vip"]),
            Customer::new(owner, "Bob", "B", "bob@example.com"),
            Customer::new(Uuid::new_v4(), "Eve", "E", "eve@example.com").with_tags(&["vip"]),
        ]);

        let campaign = Campaign::new(owner, "All");
        assert_eq!(audience.customers_for(&campaign).len(), 2);

        let segmented = Campaign::new(owner, "VIP").with_segment(Segment {
            id: Uuid::new_v4(),
            name: "VIP".into(),
            description: "Top spenders".into(),
            tags: vec!["vip".into()],
        });
        let names: Vec<String> = audience
            .customers_for(&segmented)
            .into_iter()
            .map(|c| c.first_name)
            .collect();
        assert_eq!(names, vec!["Alice"]);
    }
}
