//! Materializes per-customer, per-channel messages for a campaign.

use crate::store::CampaignStore;
use campaign_core::templates::{personalize, TemplateVariables};
use campaign_core::types::{
    Campaign, CampaignLog, CampaignMessage, CampaignVariant, ContentBundle, Customer, LogAction,
    MessageContext, MessageStatus, Recipient,
};
use campaign_core::{CampaignResult, Channel};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct MessageBuilder {
    store: Arc<dyn CampaignStore>,
    max_attempts: u32,
}

impl MessageBuilder {
    pub fn new(store: Arc<dyn CampaignStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Channels `customer` is reached on for `campaign`: declared preferences
    /// first, then the remaining enabled channels, dropping anything disabled
    /// or structurally unreachable.
    pub fn resolve_channels(campaign: &Campaign, customer: &Customer) -> Vec<Channel> {
        let enabled = campaign.enabled_channels();
        let mut resolved = Vec::with_capacity(enabled.len());
        let ordered = customer
            .preferred_channels
            .iter()
            .chain(enabled.iter().filter(|c| !customer.preferred_channels.contains(*c)));
        for &channel in ordered {
            if enabled.contains(&channel)
                && customer.can_receive(channel)
                && !resolved.contains(&channel)
            {
                resolved.push(channel);
            }
        }
        resolved
    }

    /// Upsert one pending message per (customer, resolved channel) that has
    /// copy, and record a `messages_prepared` log. Returns the upsert count.
    pub fn build(
        &self,
        campaign: &Campaign,
        customers: &[Customer],
        content: &ContentBundle,
        variant: Option<&CampaignVariant>,
    ) -> CampaignResult<usize> {
        let now = Utc::now();
        let context = Self::context(campaign, content, variant);
        let mut created = 0usize;

        for customer in customers {
            let channels = Self::resolve_channels(campaign, customer);
            if channels.is_empty() {
                debug!(customer_id = %customer.id, "Customer has no reachable channel");
                continue;
            }
            let variables = TemplateVariables::for_customer(customer, campaign.product.as_ref());
            let context = MessageContext {
                subject_line: context
                    .subject_line
                    .as_deref()
                    .map(|subject| personalize(subject, &variables)),
                ..context.clone()
            };

            for &channel in &channels {
                let key = channel.template_key();
                let Some(template) = variant
                    .and_then(|v| v.payload.template(key))
                    .or_else(|| content.template(key))
                else {
                    continue;
                };

                self.store.upsert_message(CampaignMessage {
                    id: Uuid::new_v4(),
                    campaign_id: campaign.id,
                    customer_id: customer.id,
                    recipient: Recipient::from(customer),
                    channel,
                    content: personalize(template, &variables),
                    status: MessageStatus::Pending,
                    attempts: 0,
                    max_attempts: self.max_attempts,
                    last_error: None,
                    external_id: None,
                    fallback_channels: channels.iter().copied().filter(|c| *c != channel).collect(),
                    fallback_of: None,
                    variant_id: variant.map(|v| v.id),
                    variant_label: variant.map(|v| v.label.clone()),
                    context: context.clone(),
                    provider_metadata: BTreeMap::new(),
                    sent_at: None,
                    opened_at: None,
                    clicked_at: None,
                    created_at: now,
                    updated_at: now,
                });
                created += 1;
            }
        }

        let variant_label = variant.map(|v| v.label.clone());
        self.store.append_log(
            CampaignLog::new(campaign.id, None, LogAction::MessagesPrepared).with_metadata(
                serde_json::json!({
                    "created": created,
                    "timestamp": now.to_rfc3339(),
                    "variant": variant_label,
                }),
            ),
        );
        info!(
            campaign_id = %campaign.id,
            customers = customers.len(),
            created,
            variant = variant_label.as_deref().unwrap_or("-"),
            "Messages prepared"
        );
        Ok(created)
    }

    fn context(
        campaign: &Campaign,
        content: &ContentBundle,
        variant: Option<&CampaignVariant>,
    ) -> MessageContext {
        let non_blank = |s: &Option<String>| s.clone().filter(|v| !v.trim().is_empty());
        let campaign_field = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        MessageContext {
            language_code: campaign.language_code.clone(),
            subject_line: variant
                .and_then(|v| non_blank(&v.payload.subject_line))
                .or_else(|| non_blank(&content.subject_line))
                .or_else(|| campaign_field(&campaign.subject_line)),
            title: non_blank(&content.title).or_else(|| campaign_field(&campaign.title)),
            hashtags: if content.hashtags.is_empty() {
                campaign.hashtags.clone()
            } else {
                content.hashtags.clone()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::testing::{base_content, campaign_with, variant_for};

    fn builder() -> (Arc<InMemoryStore>, MessageBuilder) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), MessageBuilder::new(store, 3))
    }

    #[test]
    fn test_resolve_channels_preferences_first() {
        let campaign = campaign_with(&[Channel::Email, Channel::Whatsapp, Channel::Sms]);
        let customer = Customer::new(campaign.owner_id, "Alice", "Doe", "alice@example.com")
            .with_phone("+15550001111")
            .with_preferences(vec![Channel::Sms, Channel::Facebook, Channel::Sms]);
        assert_eq!(
            MessageBuilder::resolve_channels(&campaign, &customer),
            vec![Channel::Sms, Channel::Email, Channel::Whatsapp]
        );
    }

    #[test]
    fn test_no_phone_means_no_phone_channels() {
        let (store, builder) = builder();
        let mut content = base_content();
        content.sms_text = Some("Hi {{first_name}}".into());
        let campaign = campaign_with(&[Channel::Email, Channel::Whatsapp, Channel::Sms]);
        let customer = Customer::new(campaign.owner_id, "Alice", "Doe", "alice@example.com")
            .with_phone("   ");

        let created = builder.build(&campaign, &[customer], &content, None).unwrap();

        assert_eq!(created, 1);
        let messages = store.messages_for_campaign(campaign.id);
        assert_eq!(messages[0].channel, Channel::Email);
        assert!(messages[0].fallback_channels.is_empty());
    }

    #[test]
    fn test_build_is_idempotent() {
        let (store, builder) = builder();
        let campaign = campaign_with(&[Channel::Email, Channel::Whatsapp]);
        let customers = vec![
            Customer::new(campaign.owner_id, "Alice", "Doe", "alice@example.com")
                .with_phone("+15550001111"),
            Customer::new(campaign.owner_id, "Bob", "Roe", "bob@example.com"),
        ];

        assert_eq!(builder.build(&campaign, &customers, &base_content(), None).unwrap(), 3);
        let first: Vec<Uuid> = store.messages_for_campaign(campaign.id).iter().map(|m| m.id).collect();
        assert_eq!(builder.build(&campaign, &customers, &base_content(), None).unwrap(), 3);
        let second: Vec<Uuid> = store.messages_for_campaign(campaign.id).iter().map(|m| m.id).collect();

        assert_eq!(first, second);
        assert_eq!(store.logs_for_campaign(campaign.id).len(), 2);
    }

    #[test]
    fn test_personalization_and_fallback_lists() {
        let (store, builder) = builder();
        let campaign = campaign_with(&[Channel::Email, Channel::Whatsapp]);
        let customer = Customer::new(campaign.owner_id, "Alice", "Doe", "alice@example.com")
            .with_phone("+15550001111")
            .with_preferences(vec![Channel::Whatsapp]);

        builder.build(&campaign, &[customer], &base_content(), None).unwrap();

        let messages = store.messages_for_campaign(campaign.id);
        let whatsapp = &messages[0];
        assert_eq!(whatsapp.channel, Channel::Whatsapp);
        assert_eq!(whatsapp.content, "Hey Alice, try Trail Shoe");
        assert_eq!(whatsapp.fallback_channels, vec![Channel::Email]);
        assert_eq!(messages[1].fallback_channels, vec![Channel::Whatsapp]);
        assert_eq!(messages[1].content, "Hi Alice {{unknown}}");
        assert_eq!(messages[1].context.subject_line.as_deref(), Some("Spring sale"));
        assert_eq!(messages[1].max_attempts, 3);
    }

    #[test]
    fn test_subject_line_is_personalized_per_customer() {
        let (store, builder) = builder();
        let campaign = campaign_with(&[Channel::Email]);
        let mut content = base_content();
        content.subject_line = Some("{{first_name}}, {{product_name}} is here".into());
        let customers = vec![
            Customer::new(campaign.owner_id, "Alice", "Doe", "alice@example.com"),
            Customer::new(campaign.owner_id, "Bob", "Roe", "bob@example.com"),
        ];

        builder.build(&campaign, &customers, &content, None).unwrap();

        let subjects: Vec<Option<String>> = store
            .messages_for_campaign(campaign.id)
            .into_iter()
            .map(|m| m.context.subject_line)
            .collect();
        assert_eq!(
            subjects,
            vec![
                Some("Alice, Trail Shoe is here".to_string()),
                Some("Bob, Trail Shoe is here".to_string()),
            ]
        );
    }

    #[test]
    fn test_variant_overrides_base_copy() {
        let (store, builder) = builder();
        let campaign = campaign_with(&[Channel::Email, Channel::Whatsapp]);
        let variant = store.upsert_variant(variant_for(campaign.id, "B"));
        let customer = Customer::new(campaign.owner_id, "Alice", "Doe", "alice@example.com")
            .with_phone("+15550001111");

        builder
            .build(&campaign, &[customer], &base_content(), Some(&variant))
            .unwrap();

        let messages = store.messages_for_campaign(campaign.id);
        let email = messages.iter().find(|m| m.channel == Channel::Email).unwrap();
        let whatsapp = messages.iter().find(|m| m.channel == Channel::Whatsapp).unwrap();
        assert_eq!(email.content, "Variant B for Alice");
        assert_eq!(whatsapp.content, "Hey Alice, try Trail Shoe");
        assert_eq!(email.variant_label.as_deref(), Some("B"));
        assert_eq!(email.variant_id, Some(variant.id));

        let log = &store.logs_for_campaign(campaign.id)[0];
        assert_eq!(log.action, LogAction::MessagesPrepared);
        assert_eq!(log.metadata["created"], 2);
        assert_eq!(log.metadata["variant"], "B");
    }

    #[test]
    fn test_channel_without_copy_is_skipped() {
        let (store, builder) = builder();
        let campaign = campaign_with(&[Channel::Sms]);
        let customer = Customer::new(campaign.owner_id, "Alice", "Doe", "alice@example.com")
            .with_phone("+15550001111");

        assert_eq!(builder.build(&campaign, &[customer], &base_content(), None).unwrap(), 0);
        assert!(store.messages_for_campaign(campaign.id).is_empty());
    }
}
