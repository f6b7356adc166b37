//! Runs every campaign whose scheduled time has arrived.

use crate::pipeline::{ExecutionPipeline, ExecutionSummary};
use crate::store::CampaignStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of one due-campaign sweep.
#[derive(Debug, Default)]
pub struct DueRunReport {
    pub executed: Vec<(Uuid, ExecutionSummary)>,
    pub skipped: Vec<(Uuid, String)>,
}

pub struct DueCampaignRunner {
    store: Arc<dyn CampaignStore>,
    pipeline: Arc<ExecutionPipeline>,
}

impl DueCampaignRunner {
    pub fn new(store: Arc<dyn CampaignStore>, pipeline: Arc<ExecutionPipeline>) -> Self {
        Self { store, pipeline }
    }

    /// Execute scheduled or running campaigns due at `now`, oldest first and
    /// at most `limit_per_owner` per owner. A failing campaign is logged and
    /// skipped.
    pub async fn run(
        &self,
        now: DateTime<Utc>,
        limit_per_owner: usize,
        force: bool,
    ) -> DueRunReport {
        let due = self.store.due_campaigns(now, limit_per_owner);
        info!(due = due.len(), limit_per_owner, "Running due campaigns");

        let mut report = DueRunReport::default();
        for campaign in due {
            match self.pipeline.execute(campaign.id, force, None).await {
                Ok(summary) => {
                    info!(
                        campaign_id = %campaign.id,
                        name = %campaign.name,
                        sent = summary.sent,
                        failed = summary.failed,
                        "Scheduled campaign dispatched"
                    );
                    report.executed.push((campaign.id, summary));
                }
                Err(e) => {
                    warn!(campaign_id = %campaign.id, error = %e, "Scheduled campaign skipped");
                    report.skipped.push((campaign.id, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryAudience, TemplateContentSupplier};
    use crate::delivery::DeliveryLoop;
    use crate::store::InMemoryStore;
    use crate::testing::{campaign_with, dispatcher_with};
    use campaign_channels::ScriptedTransport;
    use campaign_core::event_bus::noop_notifier;
    use campaign_core::types::{CampaignStatus, Customer};
    use campaign_core::Channel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_due_campaigns_and_skips_failures() {
        let store = Arc::new(InMemoryStore::new());
        let audience = Arc::new(InMemoryAudience::default());
        let now = Utc::now();

        let mut ready = campaign_with(&[Channel::Email]);
        ready.scheduled_at = Some(now - chrono::Duration::minutes(30));
        audience.add(Customer::new(ready.owner_id, "Alice", "Doe", "alice@example.com"));

        let mut no_audience = campaign_with(&[Channel::Email]);
        no_audience.scheduled_at = Some(now - chrono::Duration::hours(1));

        let mut later = campaign_with(&[Channel::Email]);
        later.scheduled_at = Some(now + chrono::Duration::hours(1));

        for c in [&ready, &no_audience, &later] {
            store.insert_campaign(c.clone());
        }

        let delivery = DeliveryLoop::new(
            store.clone(),
            Arc::new(dispatcher_with(
                Arc::new(ScriptedTransport::accepting()),
                Arc::new(ScriptedTransport::accepting()),
                Duration::from_secs(1),
            )),
            noop_notifier(),
        );
        let pipeline = ExecutionPipeline::new(
            store.clone(),
            delivery,
            Arc::new(TemplateContentSupplier::new()),
            audience,
        )
        .with_variant_count(0);
        let runner = DueCampaignRunner::new(store.clone(), Arc::new(pipeline));

        let report = runner.run(now, 10, false).await;

        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.executed[0].0, ready.id);
        assert_eq!(report.executed[0].1.sent, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, no_audience.id);
        assert_eq!(store.get_campaign(ready.id).unwrap().status, CampaignStatus::Completed);
        assert_eq!(store.get_campaign(later.id).unwrap().status, CampaignStatus::Scheduled);
    }
}
