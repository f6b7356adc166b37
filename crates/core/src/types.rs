//! Campaign dispatch domain records: campaigns, variants, customers,
//! per-channel messages and the audit log.

use crate::channels::{Channel, TemplateKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ─── Campaign ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Saved customer filter defining a campaign's audience. Customers match
/// when they carry any of the tags listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Running => "running",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignMetrics {
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    /// Recorded by payment collaborators; never recomputed from messages.
    pub revenue: f64,
}

impl fmt::Display for CampaignMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} opened={} clicked={} revenue={:.2}",
            self.sent, self.opened, self.clicked, self.revenue
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub product: Option<Product>,
    pub segment: Option<Segment>,
    /// Channel enablement; iteration follows `Channel` declaration order.
    pub channels: BTreeMap<Channel, bool>,
    pub status: CampaignStatus,
    pub metrics: CampaignMetrics,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subject_line: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub language_code: String,
    pub timezone: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Label of the variant currently marked as winner, if any.
    pub winning_variant: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// A draft campaign with no channels enabled.
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            product: None,
            segment: None,
            channels: BTreeMap::new(),
            status: CampaignStatus::Draft,
            metrics: CampaignMetrics::default(),
            title: String::new(),
            subject_line: String::new(),
            summary: String::new(),
            hashtags: Vec::new(),
            language_code: "en".to_string(),
            timezone: "UTC".to_string(),
            scheduled_at: None,
            last_run_at: None,
            winning_variant: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_channel(mut self, channel: Channel, enabled: bool) -> Self {
        self.channels.insert(channel, enabled);
        self
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.product = Some(product);
        self
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segment = Some(segment);
        self
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.channels.get(&channel).copied().unwrap_or(false)
    }

    pub fn enabled_channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(channel, _)| *channel)
            .collect()
    }
}

// ─── Customer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    /// Declared channel preference, most preferred first.
    #[serde(default)]
    pub preferred_channels: Vec<Channel>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Customer {
    pub fn new(owner_id: Uuid, first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            phone_number: None,
            preferred_channels: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone_number = Some(phone.to_string());
        self
    }

    pub fn with_preferences(mut self, channels: Vec<Channel>) -> Self {
        self.preferred_channels = channels;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn has_phone(&self) -> bool {
        self.phone_number
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }

    /// Whether the customer can structurally receive on `channel`.
    pub fn can_receive(&self, channel: Channel) -> bool {
        !channel.requires_phone() || self.has_phone()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

// ─── Content ───────────────────────────────────────────────────────────────

/// Channel-keyed copy for a campaign or one of its variants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentBundle {
    pub email_body: Option<String>,
    pub whatsapp_message: Option<String>,
    pub sms_text: Option<String>,
    pub social_post: Option<String>,
    pub subject_line: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub call_to_action: Option<String>,
}

impl ContentBundle {
    /// Template text for `key`; blank entries count as absent.
    pub fn template(&self, key: TemplateKey) -> Option<&str> {
        let value = match key {
            TemplateKey::EmailBody => &self.email_body,
            TemplateKey::WhatsappMessage => &self.whatsapp_message,
            TemplateKey::SmsText => &self.sms_text,
            TemplateKey::SocialPost => &self.social_post,
        };
        value.as_deref().filter(|s| !s.trim().is_empty())
    }
}

// ─── Variant ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariantStatus {
    Experimental,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantMetrics {
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub conversions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignVariant {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub label: String,
    pub payload: ContentBundle,
    pub status: VariantStatus,
    pub metrics: VariantMetrics,
    pub is_winner: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Message ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Scheduled,
    Sending,
    Sent,
    Failed,
    Opened,
    Clicked,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Scheduled => "scheduled",
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
            MessageStatus::Opened => "opened",
            MessageStatus::Clicked => "clicked",
        }
    }

    /// Eligible for pickup by a delivery run.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, MessageStatus::Pending | MessageStatus::Scheduled)
    }

    /// Accepted by a provider (and possibly engaged with since).
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            MessageStatus::Sent | MessageStatus::Opened | MessageStatus::Clicked
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact details captured when the message was built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub phone_number: Option<String>,
}

impl From<&Customer> for Recipient {
    fn from(customer: &Customer) -> Self {
        Self {
            email: customer.email.clone(),
            phone_number: customer.phone_number.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContext {
    pub language_code: String,
    pub subject_line: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignMessage {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub customer_id: Uuid,
    pub recipient: Recipient,
    pub channel: Channel,
    pub content: String,
    pub status: MessageStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub external_id: Option<String>,
    /// Remaining channels to try, in order, once this one is exhausted.
    pub fallback_channels: Vec<Channel>,
    /// Message this one was spawned from after its retries ran out.
    pub fallback_of: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub variant_label: Option<String>,
    pub context: MessageContext,
    /// Free-form provider receipt details.
    #[serde(default)]
    pub provider_metadata: BTreeMap<String, String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignMessage {
    pub fn retries_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

// ─── Audit log ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    MessagesPrepared,
    MessageSent,
    MessageFailed,
    FallbackScheduled,
}

/// Write-once orchestration event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignLog {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub message_id: Option<Uuid>,
    pub action: LogAction,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CampaignLog {
    pub fn new(campaign_id: Uuid, message_id: Option<Uuid>, action: LogAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            message_id,
            action,
            details: String::new(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_channels_follow_declaration_order() {
        let campaign = Campaign::new(Uuid::new_v4(), "Spring")
            .with_channel(Channel::Sms, true)
            .with_channel(Channel::Email, true)
            .with_channel(Channel::Whatsapp, false);
        assert_eq!(campaign.enabled_channels(), vec![Channel::Email, Channel::Sms]);
        assert!(!campaign.is_enabled(Channel::Whatsapp));
        assert!(!campaign.is_enabled(Channel::Twitter));
    }

    #[test]
    fn test_customer_phone_eligibility() {
        let owner = Uuid::new_v4();
        let no_phone = Customer::new(owner, "Alice", "Doe", "alice@example.com");
        assert!(no_phone.can_receive(Channel::Email));
        assert!(!no_phone.can_receive(Channel::Whatsapp));
        assert!(!no_phone.can_receive(Channel::Sms));

        let blank = no_phone.clone().with_phone("  ");
        assert!(!blank.has_phone());

        let with_phone = no_phone.with_phone("+15550001111");
        assert!(with_phone.can_receive(Channel::Sms));
    }

    #[test]
    fn test_full_name_trims_missing_parts() {
        let c = Customer::new(Uuid::new_v4(), "Alice", "", "a@example.com");
        assert_eq!(c.full_name(), "Alice");
    }

    #[test]
    fn test_blank_template_is_absent() {
        let bundle = ContentBundle {
            email_body: Some("Hi".into()),
            sms_text: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(bundle.template(TemplateKey::EmailBody), Some("Hi"));
        assert_eq!(bundle.template(TemplateKey::SmsText), None);
        assert_eq!(bundle.template(TemplateKey::SocialPost), None);
    }

    #[test]
    fn test_message_status_groups() {
        assert!(MessageStatus::Scheduled.is_dispatchable());
        assert!(!MessageStatus::Sending.is_dispatchable());
        assert!(MessageStatus::Clicked.is_delivered());
        assert!(!MessageStatus::Failed.is_delivered());
    }
}
