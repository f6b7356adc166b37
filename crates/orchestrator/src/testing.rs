//! Fixtures shared by the unit tests.

use campaign_channels::dispatcher::Dispatcher;
use campaign_channels::email::EmailSender;
use campaign_channels::sms::SmsSender;
use campaign_channels::social::SocialSender;
use campaign_channels::whatsapp::WhatsAppSender;
use campaign_channels::{ProviderTransport, RateLimiter, ScriptedTransport};
use campaign_core::types::{
    Campaign, CampaignMessage, CampaignStatus, CampaignVariant, ContentBundle, MessageContext,
    MessageStatus, Product, Recipient, VariantMetrics, VariantStatus,
};
use campaign_core::Channel;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A scheduled campaign for a fresh owner, linked to the "Trail Shoe" product.
pub fn campaign_with(channels: &[Channel]) -> Campaign {
    let mut campaign = Campaign::new(Uuid::new_v4(), "Spring Launch").with_product(Product {
        id: Uuid::new_v4(),
        name: "Trail Shoe".into(),
        description: "Lightweight trail running shoe.".into(),
    });
    for &channel in channels {
        campaign = campaign.with_channel(channel, true);
    }
    campaign.status = CampaignStatus::Scheduled;
    campaign
}

pub fn base_content() -> ContentBundle {
    ContentBundle {
        email_body: Some("Hi {{first_name}} {{unknown}}".into()),
        whatsapp_message: Some("Hey {{first_name}}, try {{product_name}}".into()),
        sms_text: None,
        social_post: Some("{{product_name}} is out #spring".into()),
        subject_line: Some("Spring sale".into()),
        title: Some("Spring".into()),
        hashtags: vec!["#spring".into()],
        call_to_action: None,
    }
}

pub fn variant_for(campaign_id: Uuid, label: &str) -> CampaignVariant {
    let now = Utc::now();
    CampaignVariant {
        id: Uuid::new_v4(),
        campaign_id,
        label: label.to_string(),
        payload: ContentBundle {
            email_body: Some(format!("Variant {label} for {{{{first_name}}}}")),
            ..Default::default()
        },
        status: VariantStatus::Experimental,
        metrics: VariantMetrics::default(),
        is_winner: false,
        created_at: now,
        updated_at: now,
    }
}

/// A pending message with a three-attempt budget and no fallbacks.
pub fn message_for(
    campaign_id: Uuid,
    customer_id: Uuid,
    channel: Channel,
    content: &str,
) -> CampaignMessage {
    let now = Utc::now();
    CampaignMessage {
        id: Uuid::new_v4(),
        campaign_id,
        customer_id,
        recipient: Recipient {
            email: "alice@example.com".into(),
            phone_number: None,
        },
        channel,
        content: content.to_string(),
        status: MessageStatus::Pending,
        attempts: 0,
        max_attempts: 3,
        last_error: None,
        external_id: None,
        fallback_channels: Vec::new(),
        fallback_of: None,
        variant_id: None,
        variant_label: None,
        context: MessageContext::default(),
        provider_metadata: BTreeMap::new(),
        sent_at: None,
        opened_at: None,
        clicked_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Email and SMS go through the given transports, WhatsApp is unconfigured.
pub fn dispatcher_with(
    email: Arc<ScriptedTransport>,
    sms: Arc<ScriptedTransport>,
    timeout: Duration,
) -> Dispatcher {
    Dispatcher::new(
        EmailSender::new(email, RateLimiter::per_minute("email", 600), timeout),
        WhatsAppSender::new(None, RateLimiter::per_minute("whatsapp", 600), timeout),
        SmsSender::new(
            Some(sms as Arc<dyn ProviderTransport>),
            RateLimiter::per_minute("sms", 600),
            timeout,
        ),
        SocialSender::new(),
    )
}
