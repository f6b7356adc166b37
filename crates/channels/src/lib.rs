//! Outbound channel delivery: per-channel senders behind provider
//! transports, rate limiting and the dispatcher that routes between them.

pub mod dispatcher;
pub mod email;
pub mod error;
pub mod rate_limit;
pub mod sms;
pub mod social;
pub mod transport;
pub mod whatsapp;

pub use dispatcher::Dispatcher;
pub use error::SendError;
pub use rate_limit::RateLimiter;
pub use transport::{
    DispatchOutcome, OutboundMessage, ProviderReceipt, ProviderTransport, Scripted,
    ScriptedTransport,
};
