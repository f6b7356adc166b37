//! Channel dispatcher: routes a rendered message to the sender for its
//! channel and records per-channel send metrics.

use crate::email::{EmailSender, SendGridTransport};
use crate::error::SendError;
use crate::rate_limit::RateLimiter;
use crate::sms::{SmsSender, TwilioSmsTransport};
use crate::social::SocialSender;
use crate::transport::{DispatchOutcome, OutboundMessage, ProviderTransport, ScriptedTransport};
use crate::whatsapp::{WhatsAppCloudTransport, WhatsAppSender};
use campaign_core::{AppConfig, Channel};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Holds one sender per channel family. Stateless apart from the senders'
/// rate-limit windows.
pub struct Dispatcher {
    email: EmailSender,
    whatsapp: WhatsAppSender,
    sms: SmsSender,
    social: SocialSender,
}

impl Dispatcher {
    pub fn new(
        email: EmailSender,
        whatsapp: WhatsAppSender,
        sms: SmsSender,
        social: SocialSender,
    ) -> Self {
        Self {
            email,
            whatsapp,
            sms,
            social,
        }
    }

    /// Build the production senders from configuration. With `dry_run`, every
    /// channel goes through an accepting scripted transport instead.
    pub fn from_config(config: &AppConfig, dry_run: bool) -> Self {
        let timeout = Duration::from_millis(config.delivery.provider_timeout_ms);
        let limits = &config.rate_limits;

        let (email, whatsapp, sms): (
            Arc<dyn ProviderTransport>,
            Option<Arc<dyn ProviderTransport>>,
            Option<Arc<dyn ProviderTransport>>,
        ) = if dry_run {
            let scripted = || Arc::new(ScriptedTransport::accepting()) as Arc<dyn ProviderTransport>;
            (scripted(), Some(scripted()), Some(scripted()))
        } else {
            let providers = &config.providers;
            (
                Arc::new(SendGridTransport::new(providers.sendgrid.clone()))
                    as Arc<dyn ProviderTransport>,
                WhatsAppCloudTransport::from_settings(&providers.whatsapp)
                    .map(|t| Arc::new(t) as Arc<dyn ProviderTransport>),
                TwilioSmsTransport::from_settings(&providers.sms)
                    .map(|t| Arc::new(t) as Arc<dyn ProviderTransport>),
            )
        };

        info!(
            dry_run,
            whatsapp_configured = whatsapp.is_some(),
            sms_configured = sms.is_some(),
            timeout_ms = config.delivery.provider_timeout_ms,
            "Dispatcher initialized"
        );

        Self::new(
            EmailSender::new(
                email,
                RateLimiter::per_minute("email", limits.email_per_minute),
                timeout,
            ),
            WhatsAppSender::new(
                whatsapp,
                RateLimiter::per_minute("whatsapp", limits.whatsapp_per_minute),
                timeout,
            ),
            SmsSender::new(
                sms,
                RateLimiter::per_minute("sms", limits.sms_per_minute),
                timeout,
            ),
            SocialSender::new(),
        )
    }

    pub async fn dispatch(&self, message: &OutboundMessage) -> Result<DispatchOutcome, SendError> {
        let start = Instant::now();

        let result = match message.channel {
            Channel::Email => self.email.send(message).await,
            Channel::Whatsapp => self.whatsapp.send(message).await,
            Channel::Sms => self.sms.send(message).await,
            Channel::Facebook | Channel::Instagram | Channel::Twitter => {
                self.social.send(message).await
            }
        };

        let channel = message.channel.as_str();
        metrics::histogram!("dispatch.latency_ms", "channel" => channel)
            .record(start.elapsed().as_secs_f64() * 1000.0);
        match &result {
            Ok(_) => metrics::counter!("dispatch.sent", "channel" => channel).increment(1),
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    channel,
                    permanent = e.is_permanent(),
                    error = %e,
                    "Dispatch failed"
                );
                metrics::counter!("dispatch.failed", "channel" => channel).increment(1);
            }
        }
        result
    }
}
