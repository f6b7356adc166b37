//! Delivery loop: sends a campaign's pending messages, applies the
//! retry/fallback policy, then finalizes the campaign.
//!
//! Message state machine:
//!
//! ```text
//! pending|scheduled --claim--> sending --ok--> sent --> opened --> clicked
//!                                 |
//!                                 +--err, attempts left--> pending
//!                                 +--err, exhausted or permanent--> failed (+ fallback)
//! ```

use crate::metrics::MetricsAggregator;
use crate::store::CampaignStore;
use campaign_channels::{Dispatcher, OutboundMessage};
use campaign_core::types::{
    CampaignLog, CampaignMessage, CampaignStatus, LogAction, MessageStatus,
};
use campaign_core::{CampaignError, CampaignResult, Channel, NotificationSink};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_MAX_ERROR_LEN: usize = 500;

/// Aggregate result of one delivery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendSummary {
    pub sent: u64,
    pub failed: u64,
}

impl AddAssign for SendSummary {
    fn add_assign(&mut self, other: Self) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Cooperative stop signal for a delivery run, checked between messages.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Delivery feedback reported by a provider webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engagement {
    Opened,
    Clicked,
}

/// Puts a claimed message back to `pending` if the send future is dropped
/// before the outcome is recorded.
struct ClaimGuard<'a> {
    store: &'a dyn CampaignStore,
    message_id: Uuid,
    settled: bool,
}

impl<'a> ClaimGuard<'a> {
    fn new(store: &'a dyn CampaignStore, message_id: Uuid) -> Self {
        Self {
            store,
            message_id,
            settled: false,
        }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.store.release_claim(self.message_id) {
            warn!(message_id = %self.message_id, "Send abandoned in flight; message released");
        }
    }
}

/// Per-message send logic, shared by the sequential path and the
/// per-channel workers.
#[derive(Clone)]
struct Sender {
    store: Arc<dyn CampaignStore>,
    dispatcher: Arc<Dispatcher>,
    max_error_len: usize,
}

impl Sender {
    async fn run(&self, messages: Vec<CampaignMessage>, cancel: CancelHandle) -> SendSummary {
        let mut summary = SendSummary::default();
        for message in messages {
            if cancel.is_cancelled() {
                debug!(message_id = %message.id, "Delivery cancelled before message");
                break;
            }
            match self.send_one(message.id).await {
                Some(true) => summary.sent += 1,
                Some(false) => summary.failed += 1,
                None => {}
            }
        }
        summary
    }

    /// `Some(true)` on success, `Some(false)` on failure, `None` when the
    /// message was no longer claimable.
    async fn send_one(&self, message_id: Uuid) -> Option<bool> {
        let Some(claimed) = self.store.claim_message(message_id) else {
            debug!(message_id = %message_id, "Message already claimed or settled");
            return None;
        };
        let mut guard = ClaimGuard::new(self.store.as_ref(), claimed.id);

        let dispatched = self.dispatcher.dispatch(&OutboundMessage::from(&claimed)).await;
        guard.settle();
        match dispatched {
            Ok(outcome) => {
                let now = Utc::now();
                let receipt = outcome.metadata.clone();
                let result = self.store.update_message(claimed.id, &mut |m| {
                    m.status = outcome.status;
                    m.sent_at = Some(now);
                    if let Some(external_id) = &outcome.external_id {
                        m.external_id = Some(external_id.clone());
                    }
                    m.provider_metadata.extend(receipt.clone());
                    m.last_error = None;
                });
                if let Err(e) = result {
                    error!(message_id = %claimed.id, error = %e, "Failed to record sent message");
                }
                self.store.append_log(
                    CampaignLog::new(claimed.campaign_id, Some(claimed.id), LogAction::MessageSent)
                        .with_metadata(serde_json::to_value(&outcome.metadata).unwrap_or_default()),
                );
                Some(true)
            }
            Err(send_error) => {
                let error_text = send_error.to_string();
                let truncated: String = error_text.chars().take(self.max_error_len).collect();
                let retry = !claimed.retries_exhausted() && !send_error.is_permanent();
                let status = if retry {
                    MessageStatus::Pending
                } else {
                    MessageStatus::Failed
                };

                let updated = self.store.update_message(claimed.id, &mut |m| {
                    m.status = status;
                    m.last_error = Some(truncated.clone());
                });
                self.store.append_log(
                    CampaignLog::new(claimed.campaign_id, Some(claimed.id), LogAction::MessageFailed)
                        .with_details(error_text.clone()),
                );
                info!(
                    message_id = %claimed.id,
                    channel = %claimed.channel,
                    attempts = claimed.attempts,
                    max_attempts = claimed.max_attempts,
                    retry,
                    "Message failed"
                );

                match updated {
                    Ok(failed) if !retry => self.queue_fallback(&failed),
                    Ok(_) => {}
                    Err(e) => {
                        error!(message_id = %claimed.id, error = %e, "Failed to record failed message")
                    }
                }
                Some(false)
            }
        }
    }

    /// Spawn (get-or-create) a message on the next fallback channel.
    fn queue_fallback(&self, failed: &CampaignMessage) {
        let Some((&next, rest)) = failed.fallback_channels.split_first() else {
            return;
        };
        let now = Utc::now();
        let (fallback, created) = self.store.insert_message_if_absent(CampaignMessage {
            id: Uuid::new_v4(),
            channel: next,
            status: MessageStatus::Pending,
            attempts: 0,
            last_error: None,
            external_id: None,
            fallback_channels: rest.to_vec(),
            fallback_of: Some(failed.id),
            provider_metadata: BTreeMap::new(),
            sent_at: None,
            opened_at: None,
            clicked_at: None,
            created_at: now,
            updated_at: now,
            ..failed.clone()
        });

        self.store.append_log(
            CampaignLog::new(failed.campaign_id, Some(failed.id), LogAction::FallbackScheduled)
                .with_metadata(serde_json::json!({ "next_channel": next })),
        );
        metrics::counter!("delivery.fallbacks", "channel" => next.as_str()).increment(1);
        info!(
            message_id = %failed.id,
            fallback_id = %fallback.id,
            next_channel = %next,
            created,
            "Fallback scheduled"
        );
    }
}

pub struct DeliveryLoop {
    store: Arc<dyn CampaignStore>,
    dispatcher: Arc<Dispatcher>,
    notifier: Arc<dyn NotificationSink>,
    parallel_channels: bool,
    max_error_len: usize,
}

impl DeliveryLoop {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        dispatcher: Arc<Dispatcher>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            notifier,
            parallel_channels: false,
            max_error_len: DEFAULT_MAX_ERROR_LEN,
        }
    }

    /// Run one worker per channel instead of a single sequential pass.
    pub fn with_parallel_channels(mut self, enabled: bool) -> Self {
        self.parallel_channels = enabled;
        self
    }

    pub fn with_max_error_len(mut self, len: usize) -> Self {
        self.max_error_len = len;
        self
    }

    pub async fn send_pending(&self, campaign_id: Uuid, force: bool) -> CampaignResult<SendSummary> {
        self.send_pending_with_cancel(campaign_id, force, &CancelHandle::new())
            .await
    }

    /// Send every `pending|scheduled` message of the campaign once. Failed
    /// sends with attempts left go back to `pending` for a later run.
    pub async fn send_pending_with_cancel(
        &self,
        campaign_id: Uuid,
        force: bool,
        cancel: &CancelHandle,
    ) -> CampaignResult<SendSummary> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .ok_or_else(|| CampaignError::not_found("campaign", campaign_id))?;
        if !force && campaign.status == CampaignStatus::Draft {
            return Err(CampaignError::policy(
                "campaign must be scheduled or running before dispatch",
            ));
        }

        let pending = self.store.dispatchable_messages(campaign_id);
        if pending.is_empty() {
            debug!(campaign_id = %campaign_id, "No pending messages");
            return Ok(SendSummary::default());
        }

        self.store
            .update_campaign(campaign_id, &mut |c| c.status = CampaignStatus::Running)?;
        info!(
            campaign_id = %campaign_id,
            messages = pending.len(),
            parallel = self.parallel_channels,
            "Delivery run started"
        );

        let sender = Sender {
            store: self.store.clone(),
            dispatcher: self.dispatcher.clone(),
            max_error_len: self.max_error_len,
        };
        let summary = if self.parallel_channels {
            Self::run_per_channel(&sender, pending, cancel).await
        } else {
            sender.run(pending, cancel.clone()).await
        };

        let metrics = MetricsAggregator::new(self.store.clone()).refresh_campaign(campaign_id)?;

        if cancel.is_cancelled() {
            warn!(
                campaign_id = %campaign_id,
                sent = summary.sent,
                failed = summary.failed,
                "Delivery run cancelled; campaign left running"
            );
            return Ok(summary);
        }

        let remaining = self.store.dispatchable_messages(campaign_id).len();
        if remaining == 0 {
            let status = if summary.failed > 0 {
                CampaignStatus::Failed
            } else {
                CampaignStatus::Completed
            };
            let campaign = self
                .store
                .update_campaign(campaign_id, &mut |c| c.status = status)?;
            self.notifier.notify_campaign_status(
                &campaign,
                status,
                &format!("Metrics: {metrics}"),
            );
        }

        info!(
            campaign_id = %campaign_id,
            sent = summary.sent,
            failed = summary.failed,
            remaining,
            "Delivery run finished"
        );
        Ok(summary)
    }

    async fn run_per_channel(
        sender: &Sender,
        pending: Vec<CampaignMessage>,
        cancel: &CancelHandle,
    ) -> SendSummary {
        let mut by_channel: BTreeMap<Channel, Vec<CampaignMessage>> = BTreeMap::new();
        for message in pending {
            by_channel.entry(message.channel).or_default().push(message);
        }

        let mut workers = JoinSet::new();
        for (channel, messages) in by_channel {
            let sender = sender.clone();
            let cancel = cancel.clone();
            debug!(channel = %channel, messages = messages.len(), "Spawning channel worker");
            workers.spawn(async move { sender.run(messages, cancel).await });
        }

        let mut summary = SendSummary::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_summary) => summary += worker_summary,
                Err(e) => error!(error = %e, "Channel worker aborted"),
            }
        }
        summary
    }

    /// Record an open or click reported for a delivered message and refresh
    /// the campaign's metrics.
    pub fn record_engagement(
        &self,
        message_id: Uuid,
        engagement: Engagement,
    ) -> CampaignResult<CampaignMessage> {
        let message = self
            .store
            .get_message(message_id)
            .ok_or_else(|| CampaignError::not_found("message", message_id))?;
        if !message.status.is_delivered() {
            return Err(CampaignError::policy(format!(
                "message {message_id} is {} and cannot record engagement",
                message.status
            )));
        }

        let now = Utc::now();
        let updated = self.store.update_message(message_id, &mut |m| match engagement {
            Engagement::Opened => {
                if m.status == MessageStatus::Sent {
                    m.status = MessageStatus::Opened;
                }
                m.opened_at.get_or_insert(now);
            }
            Engagement::Clicked => {
                m.status = MessageStatus::Clicked;
                m.opened_at.get_or_insert(now);
                m.clicked_at = Some(now);
            }
        })?;

        MetricsAggregator::new(self.store.clone()).refresh(updated.campaign_id)?;
        debug!(message_id = %message_id, engagement = ?engagement, "Engagement recorded");
        Ok(updated)
    }
}
