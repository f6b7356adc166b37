//! Campaign status notifications.
//!
//! The delivery loop reports finalized campaigns through an
//! `Arc<dyn NotificationSink>`. Sinks are fire-and-forget: they must swallow
//! their own failures so a broken alert channel never fails a dispatch run.

use crate::types::{Campaign, CampaignStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub trait NotificationSink: Send + Sync {
    fn notify_campaign_status(&self, campaign: &Campaign, status: CampaignStatus, details: &str);
}

/// A rendered status notification.
#[derive(Debug, Clone)]
pub struct CampaignNotification {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl CampaignNotification {
    pub fn render(campaign: &Campaign, status: CampaignStatus, details: &str) -> Self {
        let body = format!("Campaign '{}' is now {}. {}", campaign.name, status, details)
            .trim()
            .to_string();
        Self {
            campaign_id: campaign.id,
            status,
            title: format!("Campaign {} {}", campaign.name, status),
            body,
            created_at: Utc::now(),
        }
    }
}

/// No-op sink for tests and deployments without alerting.
pub struct NoOpNotifier;

impl NotificationSink for NoOpNotifier {
    fn notify_campaign_status(&self, _campaign: &Campaign, _status: CampaignStatus, _details: &str) {}
}

/// Writes notifications to the structured log, addressed to the configured
/// admin contacts.
pub struct LogNotifier {
    admin_email: Option<String>,
    admin_phone: Option<String>,
}

impl LogNotifier {
    pub fn new(admin_email: Option<String>, admin_phone: Option<String>) -> Self {
        Self {
            admin_email,
            admin_phone,
        }
    }
}

impl NotificationSink for LogNotifier {
    fn notify_campaign_status(&self, campaign: &Campaign, status: CampaignStatus, details: &str) {
        let notification = CampaignNotification::render(campaign, status, details);
        if status == CampaignStatus::Failed {
            warn!(
                campaign_id = %notification.campaign_id,
                admin_email = ?self.admin_email,
                admin_phone = ?self.admin_phone,
                body = %notification.body,
                "{}", notification.title
            );
        } else {
            info!(
                campaign_id = %notification.campaign_id,
                admin_email = ?self.admin_email,
                admin_phone = ?self.admin_phone,
                body = %notification.body,
                "{}", notification.title
            );
        }
    }
}

/// In-memory sink that captures notifications for testing.
#[derive(Default)]
pub struct CaptureNotifier {
    notifications: Mutex<Vec<CampaignNotification>>,
}

impl CaptureNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<CampaignNotification> {
        self.notifications.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.notifications.lock().len()
    }

    pub fn count_status(&self, status: CampaignStatus) -> usize {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.status == status)
            .count()
    }
}

impl NotificationSink for CaptureNotifier {
    fn notify_campaign_status(&self, campaign: &Campaign, status: CampaignStatus, details: &str) {
        self.notifications
            .lock()
            .push(CampaignNotification::render(campaign, status, details));
    }
}

pub fn noop_notifier() -> Arc<dyn NotificationSink> {
    Arc::new(NoOpNotifier)
}
