//! Email delivery via SendGrid.

use crate::error::SendError;
use crate::rate_limit::RateLimiter;
use crate::transport::{
    deliver_with_timeout, DispatchOutcome, OutboundMessage, ProviderReceipt, ProviderTransport,
};
use async_trait::async_trait;
use campaign_core::config::SendGridSettings;
use campaign_core::Channel;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// SendGrid mail transport.
/// In production: POST to https://api.sendgrid.com/v3/mail/send
pub struct SendGridTransport {
    settings: SendGridSettings,
}

impl SendGridTransport {
    pub fn new(settings: SendGridSettings) -> Self {
        info!(
            from = %settings.from_email,
            key_configured = !settings.api_key.is_empty(),
            "SendGrid transport initialized"
        );
        Self { settings }
    }

    fn payload(&self, message: &OutboundMessage) -> serde_json::Value {
        serde_json::json!({
            "personalizations": [{
                "to": [{"email": message.recipient.email}],
                "custom_args": {
                    "message_id": message.message_id.to_string(),
                    "campaign_id": message.campaign_id.to_string()
                }
            }],
            "from": {
                "email": self.settings.from_email,
                "name": self.settings.from_name
            },
            "subject": message.subject.clone().unwrap_or_default(),
            "content": [{
                "type": "text/plain",
                "value": message.body
            }]
        })
    }
}

#[async_trait]
impl ProviderTransport for SendGridTransport {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, SendError> {
        if self.settings.api_key.is_empty() {
            return Err(SendError::NotConfigured {
                channel: Channel::Email,
            });
        }
        let payload = self.payload(message);
        debug!(
            to = %message.recipient.email,
            bytes = payload.to_string().len(),
            "Sending email via SendGrid"
        );
        metrics::counter!("sendgrid.emails_sent").increment(1);

        let mut metadata = BTreeMap::new();
        metadata.insert("provider".to_string(), "sendgrid".to_string());
        Ok(ProviderReceipt {
            external_id: Some(format!("sg-{}", uuid::Uuid::new_v4())),
            metadata,
        })
    }
}

/// Rate-limited email sender. Transport failures come back as retryable.
pub struct EmailSender {
    transport: Arc<dyn ProviderTransport>,
    limiter: RateLimiter,
    timeout: Duration,
}

impl EmailSender {
    pub fn new(transport: Arc<dyn ProviderTransport>, limiter: RateLimiter, timeout: Duration) -> Self {
        Self {
            transport,
            limiter,
            timeout,
        }
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<DispatchOutcome, SendError> {
        if message.recipient.email.trim().is_empty() {
            return Err(SendError::MissingRecipient {
                channel: Channel::Email,
                field: "email address",
            });
        }
        self.limiter.admit().await;
        let receipt = deliver_with_timeout(self.transport.as_ref(), message, self.timeout).await?;
        Ok(DispatchOutcome::sent(Channel::Email, receipt))
    }
}
