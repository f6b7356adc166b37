//! Social channels (Facebook, Instagram, Twitter).
//!
//! No platform API is wired yet: posts are marked queued and reported as
//! sent so social messages move through the same state machine as the rest.

use crate::error::SendError;
use crate::transport::{DispatchOutcome, OutboundMessage, ProviderReceipt};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Default)]
pub struct SocialSender;

impl SocialSender {
    pub fn new() -> Self {
        Self
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<DispatchOutcome, SendError> {
        info!(
            channel = %message.channel,
            message_id = %message.message_id,
            "Queued social post"
        );
        metrics::counter!("social.posts_queued", "channel" => message.channel.as_str())
            .increment(1);

        let mut metadata = BTreeMap::new();
        metadata.insert("note".to_string(), "queued".to_string());
        Ok(DispatchOutcome::sent(
            message.channel,
            ProviderReceipt {
                external_id: None,
                metadata,
            },
        ))
    }
}
