//! Campaign and variant metrics, recomputed from message state.

use crate::store::CampaignStore;
use campaign_core::types::{CampaignMessage, CampaignMetrics, CampaignVariant, MessageStatus, VariantMetrics};
use campaign_core::{CampaignError, CampaignResult};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct StatusCounts {
    sent: u64,
    opened: u64,
    clicked: u64,
}

impl StatusCounts {
    fn tally<'a>(messages: impl IntoIterator<Item = &'a CampaignMessage>) -> Self {
        messages
            .into_iter()
            .fold(Self::default(), |mut counts, m| {
                match m.status {
                    MessageStatus::Sent => counts.sent += 1,
                    MessageStatus::Opened => counts.opened += 1,
                    MessageStatus::Clicked => counts.clicked += 1,
                    _ => {}
                }
                counts
            })
    }
}

pub struct MetricsAggregator {
    store: Arc<dyn CampaignStore>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    /// Overwrite the campaign's sent/opened/clicked counts and stamp
    /// `last_run_at`. Other metric fields are left alone.
    pub fn refresh_campaign(&self, campaign_id: Uuid) -> CampaignResult<CampaignMetrics> {
        let counts = StatusCounts::tally(&self.store.messages_for_campaign(campaign_id));
        let campaign = self.store.update_campaign(campaign_id, &mut |c| {
            c.metrics.sent = counts.sent;
            c.metrics.opened = counts.opened;
            c.metrics.clicked = counts.clicked;
            c.last_run_at = Some(Utc::now());
        })?;
        Ok(campaign.metrics)
    }

    /// Recount per-variant metrics and mark exactly one winner. Returns the
    /// winner, or `None` when the campaign has no variants.
    pub fn refresh_variants(&self, campaign_id: Uuid) -> CampaignResult<Option<CampaignVariant>> {
        let variants = self.store.variants_for_campaign(campaign_id);
        if variants.is_empty() {
            return Ok(None);
        }
        let messages = self.store.messages_for_campaign(campaign_id);

        let mut refreshed = Vec::with_capacity(variants.len());
        for variant in &variants {
            let counts = StatusCounts::tally(
                messages.iter().filter(|m| m.variant_id == Some(variant.id)),
            );
            let metrics = VariantMetrics {
                sent: counts.sent,
                delivered: counts.sent,
                opened: counts.opened,
                clicked: counts.clicked,
                conversions: 0,
            };
            refreshed.push(self.store.update_variant(variant.id, &mut |v| {
                v.metrics = metrics;
                v.is_winner = false;
            })?);
        }

        let Some(index) = select_winner(&refreshed) else {
            return Ok(None);
        };
        let winner = self
            .store
            .update_variant(refreshed[index].id, &mut |v| v.is_winner = true)?;
        self.store.update_campaign(campaign_id, &mut |c| {
            c.winning_variant = Some(winner.label.clone());
        })?;
        info!(
            campaign_id = %campaign_id,
            winner = %winner.label,
            clicked = winner.metrics.clicked,
            opened = winner.metrics.opened,
            "Variant winner selected"
        );
        Ok(Some(winner))
    }

    pub fn refresh(&self, campaign_id: Uuid) -> CampaignResult<CampaignMetrics> {
        if self.store.get_campaign(campaign_id).is_none() {
            return Err(CampaignError::not_found("campaign", campaign_id));
        }
        let metrics = self.refresh_campaign(campaign_id)?;
        self.refresh_variants(campaign_id)?;
        Ok(metrics)
    }
}

/// Index of the variant with the highest (clicked, opened); the earliest
/// wins a tie.
pub fn select_winner(variants: &[CampaignVariant]) -> Option<usize> {
    variants
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, (u64, u64))>, (i, v)| {
            let score = (v.metrics.clicked, v.metrics.opened);
            match best {
                Some((_, top)) if top >= score => best,
                _ => Some((i, score)),
            }
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::testing::{campaign_with, message_for, variant_for};
    use campaign_core::Channel;

    fn scored(campaign_id: Uuid, label: &str, clicked: u64, opened: u64) -> CampaignVariant {
        let mut v = variant_for(campaign_id, label);
        v.metrics.clicked = clicked;
        v.metrics.opened = opened;
        v
    }

    #[test]
    fn test_select_winner_breaks_ties_on_opened() {
        let id = Uuid::new_v4();
        let variants = vec![
            scored(id, "A", 10, 20),
            scored(id, "B", 15, 5),
            scored(id, "C", 15, 30),
        ];
        assert_eq!(select_winner(&variants), Some(2));
    }

    #[test]
    fn test_select_winner_full_tie_keeps_earliest() {
        let id = Uuid::new_v4();
        let variants = vec![scored(id, "A", 3, 3), scored(id, "B", 3, 3)];
        assert_eq!(select_winner(&variants), Some(0));
        assert_eq!(select_winner(&[]), None);
    }

    #[test]
    fn test_refresh_campaign_counts_and_keeps_revenue() {
        let store = Arc::new(InMemoryStore::new());
        let mut campaign = campaign_with(&[Channel::Email]);
        campaign.metrics.revenue = 125.5;
        campaign.metrics.sent = 99;
        store.insert_campaign(campaign.clone());

        for status in [
            MessageStatus::Sent,
            MessageStatus::Sent,
            MessageStatus::Opened,
            MessageStatus::Clicked,
            MessageStatus::Failed,
            MessageStatus::Pending,
        ] {
            let mut m = message_for(campaign.id, Uuid::new_v4(), Channel::Email, "hi");
            m.status = status;
            store.upsert_message(m);
        }

        let metrics = MetricsAggregator::new(store.clone())
            .refresh_campaign(campaign.id)
            .unwrap();
        assert_eq!((metrics.sent, metrics.opened, metrics.clicked), (2, 1, 1));
        assert_eq!(metrics.revenue, 125.5);
        assert!(store.get_campaign(campaign.id).unwrap().last_run_at.is_some());
    }

    #[test]
    fn test_refresh_variants_marks_single_winner() {
        let store = Arc::new(InMemoryStore::new());
        let campaign = campaign_with(&[Channel::Email]);
        store.insert_campaign(campaign.clone());

        let a = store.upsert_variant(variant_for(campaign.id, "A"));
        let b = store.upsert_variant(variant_for(campaign.id, "B"));
        store.update_variant(a.id, &mut |v| v.is_winner = true).unwrap();

        for (variant, status) in [
            (&a, MessageStatus::Opened),
            (&b, MessageStatus::Clicked),
            (&b, MessageStatus::Sent),
        ] {
            let mut m = message_for(campaign.id, Uuid::new_v4(), Channel::Email, "hi");
            m.variant_id = Some(variant.id);
            m.status = status;
            store.upsert_message(m);
        }

        let aggregator = MetricsAggregator::new(store.clone());
        let winner = aggregator.refresh_variants(campaign.id).unwrap().unwrap();
        assert_eq!(winner.label, "B");
        assert_eq!(
            winner.metrics,
            VariantMetrics {
                sent: 1,
                delivered: 1,
                opened: 0,
                clicked: 1,
                conversions: 0
            }
        );

        let flags: Vec<bool> = store
            .variants_for_campaign(campaign.id)
            .iter()
            .map(|v| v.is_winner)
            .collect();
        assert_eq!(flags, vec![false, true]);
        assert_eq!(
            store.get_campaign(campaign.id).unwrap().winning_variant.as_deref(),
            Some("B")
        );
    }

    #[test]
    fn test_refresh_is_a_pure_recomputation() {
        let store = Arc::new(InMemoryStore::new());
        let campaign = campaign_with(&[Channel::Email]);
        store.insert_campaign(campaign.clone());
        let mut m = message_for(campaign.id, Uuid::new_v4(), Channel::Email, "hi");
        m.status = MessageStatus::Sent;
        store.upsert_message(m);

        let aggregator = MetricsAggregator::new(store.clone());
        let first = aggregator.refresh(campaign.id).unwrap();
        let second = aggregator.refresh(campaign.id).unwrap();
        assert_eq!(first, second);
        assert!(aggregator.refresh(Uuid::new_v4()).is_err());
    }
}
