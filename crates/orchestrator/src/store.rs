//! Campaign persistence seam and its in-memory implementation.
//!
//! Every operation is atomic for a single row; nothing spans rows.
//! Production: back `CampaignStore` with PostgreSQL (sqlx) or similar.

use campaign_core::types::{
    Campaign, CampaignLog, CampaignMessage, CampaignStatus, CampaignVariant, MessageStatus,
};
use campaign_core::{CampaignError, CampaignResult, Channel};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

pub trait CampaignStore: Send + Sync {
    // ─── Campaigns ─────────────────────────────────────────────────────────

    fn get_campaign(&self, id: Uuid) -> Option<Campaign>;

    fn insert_campaign(&self, campaign: Campaign);

    /// Apply `apply` to the stored campaign and return the result.
    fn update_campaign(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut Campaign),
    ) -> CampaignResult<Campaign>;

    /// Scheduled or running campaigns with `scheduled_at <= now`, oldest
    /// first, at most `limit_per_owner` for each owner.
    fn due_campaigns(&self, now: DateTime<Utc>, limit_per_owner: usize) -> Vec<Campaign>;

    // ─── Messages ──────────────────────────────────────────────────────────

    /// Insert or update by (campaign, customer, channel). An existing row keeps
    /// its id and creation order; everything else is replaced from `draft`,
    /// and its attempt budget starts over.
    fn upsert_message(&self, draft: CampaignMessage) -> CampaignMessage;

    /// Get-or-create by (campaign, customer, channel). Returns the stored row
    /// and whether it was created.
    fn insert_message_if_absent(&self, message: CampaignMessage) -> (CampaignMessage, bool);

    /// Compare-and-swap `pending|scheduled -> sending`, counting the attempt.
    /// `None` when the message is gone or another worker already claimed it.
    fn claim_message(&self, id: Uuid) -> Option<CampaignMessage>;

    /// Undo a claim whose send never settled: `sending -> pending` and the
    /// attempt is uncounted. No-op unless the message is still `sending`.
    fn release_claim(&self, id: Uuid) -> bool;

    fn update_message(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut CampaignMessage),
    ) -> CampaignResult<CampaignMessage>;

    fn get_message(&self, id: Uuid) -> Option<CampaignMessage>;

    /// All messages of a campaign in creation order.
    fn messages_for_campaign(&self, campaign_id: Uuid) -> Vec<CampaignMessage>;

    /// `pending|scheduled` messages of a campaign in creation order.
    fn dispatchable_messages(&self, campaign_id: Uuid) -> Vec<CampaignMessage> {
        self.messages_for_campaign(campaign_id)
            .into_iter()
            .filter(|m| m.status.is_dispatchable())
            .collect()
    }

    fn count_by_status(&self, campaign_id: Uuid, status: MessageStatus) -> usize {
        self.messages_for_campaign(campaign_id)
            .iter()
            .filter(|m| m.status == status)
            .count()
    }

    // ─── Variants ──────────────────────────────────────────────────────────

    /// Insert or update by (campaign, label); payload and status are replaced.
    fn upsert_variant(&self, variant: CampaignVariant) -> CampaignVariant;

    /// Variants of a campaign in creation order.
    fn variants_for_campaign(&self, campaign_id: Uuid) -> Vec<CampaignVariant>;

    fn update_variant(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut CampaignVariant),
    ) -> CampaignResult<CampaignVariant>;

    // ─── Audit log ─────────────────────────────────────────────────────────

    fn append_log(&self, log: CampaignLog);

    fn logs_for_campaign(&self, campaign_id: Uuid) -> Vec<CampaignLog>;
}

type MessageKey = (Uuid, Uuid, Channel);

/// Row plus its insertion sequence, which stands in for `created_at`
/// ordering (timestamps can tie).
#[derive(Debug, Clone)]
struct Sequenced<T> {
    seq: u64,
    row: T,
}

/// Thread-safe in-memory store for campaigns, messages, variants and logs.
pub struct InMemoryStore {
    campaigns: DashMap<Uuid, Campaign>,
    messages: DashMap<Uuid, Sequenced<CampaignMessage>>,
    message_keys: DashMap<MessageKey, Uuid>,
    variants: DashMap<Uuid, Sequenced<CampaignVariant>>,
    variant_labels: DashMap<(Uuid, String), Uuid>,
    logs: Mutex<Vec<CampaignLog>>,
    seq: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        info!("Campaign store initialized (in-memory, development mode)");
        Self {
            campaigns: DashMap::new(),
            messages: DashMap::new(),
            message_keys: DashMap::new(),
            variants: DashMap::new(),
            variant_labels: DashMap::new(),
            logs: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn message_key(message: &CampaignMessage) -> MessageKey {
        (message.campaign_id, message.customer_id, message.channel)
    }
}

impl CampaignStore for InMemoryStore {
    fn get_campaign(&self, id: Uuid) -> Option<Campaign> {
        self.campaigns.get(&id).map(|r| r.value().clone())
    }

    fn insert_campaign(&self, campaign: Campaign) {
        self.campaigns.insert(campaign.id, campaign);
    }

    fn update_campaign(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut Campaign),
    ) -> CampaignResult<Campaign> {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| CampaignError::not_found("campaign", id))?;
        let campaign = entry.value_mut();
        apply(campaign);
        campaign.updated_at = Utc::now();
        Ok(campaign.clone())
    }

    fn due_campaigns(&self, now: DateTime<Utc>, limit_per_owner: usize) -> Vec<Campaign> {
        let mut due: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|r| {
                let c = r.value();
                matches!(c.status, CampaignStatus::Scheduled | CampaignStatus::Running)
                    && c.scheduled_at.is_some_and(|at| at <= now)
            })
            .map(|r| r.value().clone())
            .collect();
        due.sort_by_key(|c| c.scheduled_at);

        let mut taken: HashMap<Uuid, usize> = HashMap::new();
        due.retain(|c| {
            let count = taken.entry(c.owner_id).or_default();
            *count += 1;
            *count <= limit_per_owner
        });
        due
    }

    fn upsert_message(&self, draft: CampaignMessage) -> CampaignMessage {
        match self.message_keys.entry(Self::message_key(&draft)) {
            Entry::Occupied(key) => {
                let id = *key.get();
                if let Some(mut entry) = self.messages.get_mut(&id) {
                    let stored = &mut entry.value_mut().row;
                    stored.recipient = draft.recipient;
                    stored.content = draft.content;
                    stored.status = draft.status;
                    stored.attempts = 0;
                    stored.max_attempts = draft.max_attempts;
                    stored.last_error = None;
                    stored.fallback_channels = draft.fallback_channels;
                    stored.variant_id = draft.variant_id;
                    stored.variant_label = draft.variant_label;
                    stored.context = draft.context;
                    stored.updated_at = Utc::now();
                    return stored.clone();
                }
                let mut draft = draft;
                draft.id = id;
                self.messages.insert(
                    id,
                    Sequenced {
                        seq: self.next_seq(),
                        row: draft.clone(),
                    },
                );
                draft
            }
            Entry::Vacant(slot) => {
                slot.insert(draft.id);
                self.messages.insert(
                    draft.id,
                    Sequenced {
                        seq: self.next_seq(),
                        row: draft.clone(),
                    },
                );
                draft
            }
        }
    }

    fn insert_message_if_absent(&self, message: CampaignMessage) -> (CampaignMessage, bool) {
        match self.message_keys.entry(Self::message_key(&message)) {
            Entry::Occupied(key) => {
                let existing = self.messages.get(key.get()).map(|r| r.row.clone());
                match existing {
                    Some(existing) => (existing, false),
                    None => (message, false),
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(message.id);
                self.messages.insert(
                    message.id,
                    Sequenced {
                        seq: self.next_seq(),
                        row: message.clone(),
                    },
                );
                (message, true)
            }
        }
    }

    fn claim_message(&self, id: Uuid) -> Option<CampaignMessage> {
        let mut entry = self.messages.get_mut(&id)?;
        let message = &mut entry.value_mut().row;
        if !message.status.is_dispatchable() {
            return None;
        }
        message.status = MessageStatus::Sending;
        message.attempts += 1;
        message.updated_at = Utc::now();
        Some(message.clone())
    }

    fn release_claim(&self, id: Uuid) -> bool {
        let Some(mut entry) = self.messages.get_mut(&id) else {
            return false;
        };
        let message = &mut entry.value_mut().row;
        if message.status != MessageStatus::Sending {
            return false;
        }
        message.status = MessageStatus::Pending;
        message.attempts = message.attempts.saturating_sub(1);
        message.updated_at = Utc::now();
        true
    }

    fn update_message(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut CampaignMessage),
    ) -> CampaignResult<CampaignMessage> {
        let mut entry = self
            .messages
            .get_mut(&id)
            .ok_or_else(|| CampaignError::not_found("message", id))?;
        let message = &mut entry.value_mut().row;
        apply(message);
        message.updated_at = Utc::now();
        Ok(message.clone())
    }

    fn get_message(&self, id: Uuid) -> Option<CampaignMessage> {
        self.messages.get(&id).map(|r| r.row.clone())
    }

    fn messages_for_campaign(&self, campaign_id: Uuid) -> Vec<CampaignMessage> {
        let mut rows: Vec<Sequenced<CampaignMessage>> = self
            .messages
            .iter()
            .filter(|r| r.row.campaign_id == campaign_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| r.seq);
        rows.into_iter().map(|r| r.row).collect()
    }

    fn upsert_variant(&self, variant: CampaignVariant) -> CampaignVariant {
        let key = (variant.campaign_id, variant.label.clone());
        match self.variant_labels.entry(key) {
            Entry::Occupied(slot) => {
                let id = *slot.get();
                match self.variants.get_mut(&id) {
                    Some(mut entry) => {
                        let stored = &mut entry.value_mut().row;
                        stored.payload = variant.payload;
                        stored.status = variant.status;
                        stored.updated_at = Utc::now();
                        stored.clone()
                    }
                    None => {
                        let mut variant = variant;
                        variant.id = id;
                        self.variants.insert(
                            id,
                            Sequenced {
                                seq: self.next_seq(),
                                row: variant.clone(),
                            },
                        );
                        variant
                    }
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(variant.id);
                self.variants.insert(
                    variant.id,
                    Sequenced {
                        seq: self.next_seq(),
                        row: variant.clone(),
                    },
                );
                variant
            }
        }
    }

    fn variants_for_campaign(&self, campaign_id: Uuid) -> Vec<CampaignVariant> {
        let mut rows: Vec<Sequenced<CampaignVariant>> = self
            .variants
            .iter()
            .filter(|r| r.row.campaign_id == campaign_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| r.seq);
        rows.into_iter().map(|r| r.row).collect()
    }

    fn update_variant(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut CampaignVariant),
    ) -> CampaignResult<CampaignVariant> {
        let mut entry = self
            .variants
            .get_mut(&id)
            .ok_or_else(|| CampaignError::not_found("variant", id))?;
        let variant = &mut entry.value_mut().row;
        apply(variant);
        variant.updated_at = Utc::now();
        Ok(variant.clone())
    }

    fn append_log(&self, log: CampaignLog) {
        self.logs.lock().push(log);
    }

    fn logs_for_campaign(&self, campaign_id: Uuid) -> Vec<CampaignLog> {
        self.logs
            .lock()
            .iter()
            .filter(|l| l.campaign_id == campaign_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{message_for, variant_for};
    use campaign_core::types::LogAction;

    #[test]
    fn test_upsert_keeps_identity_and_resets_attempts() {
        let store = InMemoryStore::new();
        let campaign_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();

        let first = store.upsert_message(message_for(campaign_id, customer_id, Channel::Email, "v1"));
        store
            .update_message(first.id, &mut |m| {
                m.attempts = 2;
                m.status = MessageStatus::Failed;
                m.last_error = Some("boom".into());
            })
            .unwrap();

        let second = store.upsert_message(message_for(campaign_id, customer_id, Channel::Email, "v2"));
        assert_eq!(second.id, first.id);
        assert_eq!(second.content, "v2");
        assert_eq!(second.status, MessageStatus::Pending);
        assert_eq!(second.attempts, 0);
        assert!(second.last_error.is_none());
        assert_eq!(store.messages_for_campaign(campaign_id).len(), 1);
    }

    #[test]
    fn test_claim_is_compare_and_swap() {
        let store = InMemoryStore::new();
        let msg = store.upsert_message(message_for(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Channel::Sms,
            "hi",
        ));

        let claimed = store.claim_message(msg.id).unwrap();
        assert_eq!(claimed.status, MessageStatus::Sending);
        assert_eq!(claimed.attempts, 1);
        assert!(store.claim_message(msg.id).is_none());
        assert_eq!(store.get_message(msg.id).unwrap().attempts, 1);
    }

    #[test]
    fn test_release_claim_only_undoes_sending() {
        let store = InMemoryStore::new();
        let msg = store.upsert_message(message_for(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Channel::Email,
            "hi",
        ));

        assert!(!store.release_claim(msg.id));
        store.claim_message(msg.id).unwrap();
        assert!(store.release_claim(msg.id));
        let released = store.get_message(msg.id).unwrap();
        assert_eq!(released.status, MessageStatus::Pending);
        assert_eq!(released.attempts, 0);

        store.claim_message(msg.id).unwrap();
        store
            .update_message(msg.id, &mut |m| m.status = MessageStatus::Sent)
            .unwrap();
        assert!(!store.release_claim(msg.id));
        assert_eq!(store.get_message(msg.id).unwrap().status, MessageStatus::Sent);
        assert!(!store.release_claim(Uuid::new_v4()));
    }

    #[test]
    fn test_insert_if_absent_is_get_or_create() {
        let store = InMemoryStore::new();
        let campaign_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();

        let (a, created) =
            store.insert_message_if_absent(message_for(campaign_id, customer_id, Channel::Sms, "a"));
        assert!(created);
        let (b, created) =
            store.insert_message_if_absent(message_for(campaign_id, customer_id, Channel::Sms, "b"));
        assert!(!created);
        assert_eq!(a.id, b.id);
        assert_eq!(b.content, "a");
    }

    #[test]
    fn test_messages_listed_in_creation_order() {
        let store = InMemoryStore::new();
        let campaign_id = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..5)
            .map(|i| {
                store
                    .upsert_message(message_for(
                        campaign_id,
                        Uuid::new_v4(),
                        Channel::Email,
                        &format!("m{i}"),
                    ))
                    .id
            })
            .collect();
        let listed: Vec<Uuid> = store
            .messages_for_campaign(campaign_id)
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(listed, ids);
        assert_eq!(store.dispatchable_messages(campaign_id).len(), 5);
        assert_eq!(store.count_by_status(campaign_id, MessageStatus::Pending), 5);
    }

    #[test]
    fn test_variant_upsert_by_label() {
        let store = InMemoryStore::new();
        let campaign_id = Uuid::new_v4();
        let a = store.upsert_variant(variant_for(campaign_id, "A"));
        store.upsert_variant(variant_for(campaign_id, "B"));
        let again = store.upsert_variant(variant_for(campaign_id, "A"));

        assert_eq!(again.id, a.id);
        let labels: Vec<String> = store
            .variants_for_campaign(campaign_id)
            .into_iter()
            .map(|v| v.label)
            .collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn test_due_campaigns() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();

        let mut older = Campaign::new(owner, "older");
        older.status = CampaignStatus::Scheduled;
        older.scheduled_at = Some(now - chrono::Duration::hours(2));
        let mut newer = Campaign::new(owner, "newer");
        newer.status = CampaignStatus::Running;
        newer.scheduled_at = Some(now - chrono::Duration::hours(1));
        let mut future = Campaign::new(owner, "future");
        future.status = CampaignStatus::Scheduled;
        future.scheduled_at = Some(now + chrono::Duration::hours(1));
        let draft = Campaign::new(owner, "draft");

        for c in [newer, future, draft, older] {
            store.insert_campaign(c);
        }

        let due: Vec<String> = store.due_campaigns(now, 10).into_iter().map(|c| c.name).collect();
        assert_eq!(due, vec!["older", "newer"]);
        assert_eq!(store.due_campaigns(now, 1).len(), 1);
    }

    #[test]
    fn test_due_limit_applies_per_owner() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        for (owner, name, hours_ago) in [
            (alice, "a1", 3),
            (alice, "a2", 2),
            (alice, "a3", 1),
            (bob, "b1", 4),
        ] {
            let mut c = Campaign::new(owner, name);
            c.status = CampaignStatus::Scheduled;
            c.scheduled_at = Some(now - chrono::Duration::hours(hours_ago));
            store.insert_campaign(c);
        }

        let due: Vec<String> = store.due_campaigns(now, 2).into_iter().map(|c| c.name).collect();
        assert_eq!(due, vec!["b1", "a1", "a2"]);
        assert!(store.due_campaigns(now, 0).is_empty());
    }

    #[test]
    fn test_logs_are_append_only_per_campaign() {
        let store = InMemoryStore::new();
        let campaign_id = Uuid::new_v4();
        store.append_log(CampaignLog::new(campaign_id, None, LogAction::MessagesPrepared));
        store.append_log(CampaignLog::new(Uuid::new_v4(), None, LogAction::MessageSent));
        let logs = store.logs_for_campaign(campaign_id);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::MessagesPrepared);
    }

    #[test]
    fn test_update_unknown_campaign_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.update_campaign(Uuid::new_v4(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, CampaignError::NotFound { entity: "campaign", .. }));
    }
}
