//! Demo workspace: in-memory store, a small audience and scheduled campaigns.

use campaign_channels::Dispatcher;
use campaign_core::event_bus::LogNotifier;
use campaign_core::types::{Campaign, CampaignStatus, Customer, Product, Segment};
use campaign_core::{AppConfig, Channel};
use campaign_orchestrator::{
    CampaignStore, DeliveryLoop, DueCampaignRunner, ExecutionPipeline, InMemoryAudience, InMemoryStore,
    TemplateContentSupplier,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct Workspace {
    pub store: Arc<InMemoryStore>,
    pub pipeline: Arc<ExecutionPipeline>,
    owner_id: Uuid,
}

impl Workspace {
    pub fn new(config: &AppConfig, live: bool) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let owner_id = Uuid::new_v4();
        let audience = Arc::new(InMemoryAudience::new(audience(owner_id)));

        let notifier = Arc::new(LogNotifier::new(
            config.notifications.admin_email.clone(),
            config.notifications.admin_phone.clone(),
        ));
        let delivery = DeliveryLoop::new(
            store.clone(),
            Arc::new(Dispatcher::from_config(config, !live)),
            notifier,
        )
        .with_parallel_channels(config.delivery.parallel_channels)
        .with_max_error_len(config.delivery.max_error_len);

        let pipeline = ExecutionPipeline::new(
            store.clone(),
            delivery,
            Arc::new(TemplateContentSupplier::new()),
            audience,
        )
        .configured(config);

        Self {
            store,
            pipeline: Arc::new(pipeline),
            owner_id,
        }
    }

    pub fn runner(&self) -> DueCampaignRunner {
        DueCampaignRunner::new(self.store.clone(), self.pipeline.clone())
    }

    /// Insert a campaign targeting the `runners` segment, due `minutes_ago`.
    pub fn add_campaign(&self, name: &str, product: &str, minutes_ago: i64) -> Campaign {
        let mut campaign = Campaign::new(self.owner_id, name)
            .with_product(Product {
                id: Uuid::new_v4(),
                name: product.to_string(),
                description: format!("{product}, built for long days on the trail."),
            })
            .with_segment(Segment {
                id: Uuid::new_v4(),
                name: "Runners".into(),
                description: String::new(),
                tags: vec!["runners".into()],
            })
            .with_channel(Channel::Email, true)
            .with_channel(Channel::Whatsapp, true)
            .with_channel(Channel::Sms, true)
            .with_channel(Channel::Twitter, true);
        campaign.status = CampaignStatus::Scheduled;
        campaign.scheduled_at = Some(Utc::now() - Duration::minutes(minutes_ago));

        self.store.insert_campaign(campaign.clone());
        campaign
    }
}

fn audience(owner_id: Uuid) -> Vec<Customer> {
    vec![
        Customer::new(owner_id, "Alice", "Moreau", "alice@example.com")
            .with_phone("+14155550101")
            .with_tags(&["runners"]),
        Customer::new(owner_id, "Bilal", "Khan", "bilal@example.com")
            .with_phone("+447700900123")
            .with_preferences(vec![Channel::Whatsapp, Channel::Email])
            .with_tags(&["runners", "vip"]),
        Customer::new(owner_id, "Chen", "Wei", "chen@example.com")
            .with_preferences(vec![Channel::Twitter])
            .with_tags(&["runners"]),
        Customer::new(owner_id, "Dana", "Silva", "dana@example.com").with_tags(&["cyclists"]),
    ]
}
