//! Campaign orchestration: message materialization, the delivery loop,
//! metrics aggregation and the end-to-end execution pipeline.

pub mod builder;
pub mod collaborators;
pub mod delivery;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::MessageBuilder;
pub use collaborators::{
    AudienceResolver, CampaignAssets, ContentError, ContentSupplier, InMemoryAudience,
    NoOpSuggestions, SuggestionSink, TemplateContentSupplier, VariantDraft,
};
pub use delivery::{CancelHandle, DeliveryLoop, Engagement, SendSummary};
pub use crate::metrics::MetricsAggregator;
pub use pipeline::{ExecutionPipeline, ExecutionSummary};
pub use scheduler::{DueCampaignRunner, DueRunReport};
pub use store::{CampaignStore, InMemoryStore};
