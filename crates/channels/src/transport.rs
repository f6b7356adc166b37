//! Uniform send contract between channel senders and external providers.

use crate::error::SendError;
use async_trait::async_trait;
use campaign_core::types::{CampaignMessage, MessageStatus, Recipient};
use campaign_core::Channel;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// A rendered message handed to a channel sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub message_id: Uuid,
    pub campaign_id: Uuid,
    pub channel: Channel,
    pub recipient: Recipient,
    pub subject: Option<String>,
    pub body: String,
}

impl From<&CampaignMessage> for OutboundMessage {
    fn from(message: &CampaignMessage) -> Self {
        Self {
            message_id: message.id,
            campaign_id: message.campaign_id,
            channel: message.channel,
            recipient: message.recipient.clone(),
            subject: message
                .context
                .subject_line
                .clone()
                .or_else(|| message.context.title.clone()),
            body: message.content.clone(),
        }
    }
}

/// What a provider hands back for an accepted message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderReceipt {
    pub external_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Normalized result of a successful send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub status: MessageStatus,
    pub external_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl DispatchOutcome {
    pub fn sent(channel: Channel, receipt: ProviderReceipt) -> Self {
        let mut metadata = receipt.metadata;
        metadata.insert("channel".to_string(), channel.as_str().to_string());
        Self {
            status: MessageStatus::Sent,
            external_id: receipt.external_id,
            metadata,
        }
    }
}

/// Network-facing half of a channel sender.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, SendError>;
}

/// Run one provider call under `timeout`; expiry is a retryable failure.
pub(crate) async fn deliver_with_timeout(
    transport: &dyn ProviderTransport,
    message: &OutboundMessage,
    timeout: Duration,
) -> Result<ProviderReceipt, SendError> {
    match tokio::time::timeout(timeout, transport.deliver(message)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                provider = transport.name(),
                message_id = %message.message_id,
                timeout_ms = timeout.as_millis() as u64,
                "Provider call timed out"
            );
            Err(SendError::Timeout {
                channel: message.channel,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

// ─── Scripted transport (tests and dry runs) ───────────────────────────────

/// One scripted provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Accept,
    Reject,
    RejectPermanently,
    /// Never answers; exercises the provider timeout.
    Hang,
}

/// Transport that replays a fixed script of responses, then repeats a
/// default. Captures every delivered message.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    default: Scripted,
    calls: AtomicUsize,
    delivered: Mutex<Vec<OutboundMessage>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>, default: Scripted) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting() -> Self {
        Self::new(Vec::new(), Scripted::Accept)
    }

    pub fn rejecting() -> Self {
        Self::new(Vec::new(), Scripted::Reject)
    }

    /// Number of `deliver` calls, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages the transport accepted.
    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl ProviderTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, SendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.script.lock().pop_front().unwrap_or(self.default);
        match step {
            Scripted::Accept => {
                self.delivered.lock().push(message.clone());
                Ok(ProviderReceipt {
                    external_id: Some(format!("scripted-{call}")),
                    metadata: BTreeMap::new(),
                })
            }
            Scripted::Reject => Err(SendError::rejected(message.channel, "scripted rejection")),
            Scripted::RejectPermanently => {
                Err(SendError::permanent(message.channel, "scripted permanent rejection"))
            }
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SendError::rejected(message.channel, "scripted hang elapsed"))
            }
        }
    }
}
