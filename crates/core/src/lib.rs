pub mod channels;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod templates;
pub mod types;

pub use channels::{Channel, ChannelKind, TemplateKey};
pub use config::AppConfig;
pub use error::{CampaignError, CampaignResult};
pub use event_bus::NotificationSink;
