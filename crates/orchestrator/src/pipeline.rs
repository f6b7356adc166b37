//! End-to-end campaign execution: content, audience, optional A/B variants,
//! message materialization, delivery and metrics.

use crate::builder::MessageBuilder;
use crate::collaborators::{AudienceResolver, ContentSupplier, NoOpSuggestions, SuggestionSink};
use crate::delivery::DeliveryLoop;
use crate::metrics::MetricsAggregator;
use crate::store::CampaignStore;
use campaign_core::types::{
    Campaign, CampaignStatus, CampaignVariant, Customer, VariantMetrics, VariantStatus,
};
use campaign_core::{AppConfig, CampaignError, CampaignResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_VARIANT_COUNT: usize = 3;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub messages_created: usize,
    pub sent: u64,
    pub failed: u64,
    pub language_code: String,
}

pub struct ExecutionPipeline {
    store: Arc<dyn CampaignStore>,
    content: Arc<dyn ContentSupplier>,
    audience: Arc<dyn AudienceResolver>,
    suggestions: Arc<dyn SuggestionSink>,
    delivery: DeliveryLoop,
    builder: MessageBuilder,
    aggregator: MetricsAggregator,
    variant_count: usize,
}

impl ExecutionPipeline {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        delivery: DeliveryLoop,
        content: Arc<dyn ContentSupplier>,
        audience: Arc<dyn AudienceResolver>,
    ) -> Self {
        Self {
            builder: MessageBuilder::new(store.clone(), DEFAULT_MAX_ATTEMPTS),
            aggregator: MetricsAggregator::new(store.clone()),
            store,
            content,
            audience,
            suggestions: Arc::new(NoOpSuggestions),
            delivery,
            variant_count: DEFAULT_VARIANT_COUNT,
        }
    }

    /// Apply the delivery and experiment settings from `config`.
    pub fn configured(self, config: &AppConfig) -> Self {
        self.with_max_attempts(config.delivery.max_attempts)
            .with_variant_count(config.experiments.variant_count)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.builder = MessageBuilder::new(self.store.clone(), max_attempts);
        self
    }

    /// Number of A/B variants requested per run; zero disables variants.
    pub fn with_variant_count(mut self, count: usize) -> Self {
        self.variant_count = count;
        self
    }

    pub fn with_suggestions(mut self, suggestions: Arc<dyn SuggestionSink>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn delivery(&self) -> &DeliveryLoop {
        &self.delivery
    }

    pub async fn execute(
        &self,
        campaign_id: Uuid,
        force: bool,
        language: Option<&str>,
    ) -> CampaignResult<ExecutionSummary> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .ok_or_else(|| CampaignError::not_found("campaign", campaign_id))?;
        if !force && campaign.status == CampaignStatus::Draft {
            return Err(CampaignError::policy(
                "campaign must be scheduled or running before dispatch",
            ));
        }
        let product = campaign
            .product
            .clone()
            .ok_or_else(|| CampaignError::policy("campaign requires a linked product"))?;
        let language_code = language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&campaign.language_code)
            .to_string();
        let segment_notes = campaign.segment.as_ref().map(|s| s.description.as_str());

        let assets = self
            .content
            .generate_campaign_assets(&product, &language_code, segment_notes)
            .await
            .map_err(|e| CampaignError::ContentSupplier(e.to_string()))?;

        let campaign = self.store.update_campaign(campaign_id, &mut |c| {
            c.language_code = language_code.clone();
            let keep_or = |current: &mut String, generated: &str| {
                if !generated.trim().is_empty() {
                    *current = generated.to_string();
                }
            };
            keep_or(&mut c.title, assets.title.as_str());
            keep_or(&mut c.summary, assets.summary.as_str());
            keep_or(&mut c.subject_line, assets.subject_line.as_str());
            if !assets.hashtags.is_empty() {
                c.hashtags = assets.hashtags.clone();
            }
        })?;

        let customers = self.audience.customers_for(&campaign);
        if customers.is_empty() {
            return Err(CampaignError::policy("no customers match this campaign"));
        }

        let variants = self.generate_variants(&campaign, &language_code).await;
        let content = assets.content();
        let mut messages_created = 0;
        if variants.is_empty() {
            messages_created = self.builder.build(&campaign, &customers, &content, None)?;
        } else {
            for (bucket, variant) in variants.iter().enumerate() {
                let targeted: Vec<Customer> = customers
                    .iter()
                    .skip(bucket)
                    .step_by(variants.len())
                    .cloned()
                    .collect();
                if targeted.is_empty() {
                    continue;
                }
                messages_created +=
                    self.builder
                        .build(&campaign, &targeted, &content, Some(variant))?;
            }
        }

        let sent = self.delivery.send_pending(campaign_id, force).await?;
        self.aggregator.refresh(campaign_id)?;

        if let Err(e) = self.suggestions.create_suggestion(&campaign) {
            warn!(campaign_id = %campaign_id, error = %e, "Suggestion creation skipped");
        }

        info!(
            campaign_id = %campaign_id,
            messages_created,
            sent = sent.sent,
            failed = sent.failed,
            variants = variants.len(),
            language = %language_code,
            "Campaign executed"
        );
        Ok(ExecutionSummary {
            messages_created,
            sent: sent.sent,
            failed: sent.failed,
            language_code,
        })
    }

    /// Best effort: any supplier failure yields no variants.
    async fn generate_variants(&self, campaign: &Campaign, language_code: &str) -> Vec<CampaignVariant> {
        if self.variant_count == 0 {
            return Vec::new();
        }
        let Some(product) = campaign.product.as_ref() else {
            return Vec::new();
        };
        let profile = campaign.segment.as_ref().map(|s| s.description.as_str());
        let drafts = match self
            .content
            .generate_campaign_variants(product, self.variant_count, language_code, profile)
            .await
        {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!(campaign_id = %campaign.id, error = %e, "Variant generation skipped");
                return Vec::new();
            }
        };

        let now = Utc::now();
        drafts
            .into_iter()
            .filter(|d| !d.label.trim().is_empty())
            .map(|draft| {
                self.store.upsert_variant(CampaignVariant {
                    id: Uuid::new_v4(),
                    campaign_id: campaign.id,
                    label: draft.label.clone(),
                    payload: draft.payload(),
                    status: VariantStatus::Experimental,
                    metrics: VariantMetrics::default(),
                    is_winner: false,
                    created_at: now,
                    updated_at: now,
                })
            })
            .collect()
    }
}
