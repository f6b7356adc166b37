use campaign_core::Channel;
use thiserror::Error;

/// Failure of a single provider send. Retryable unless the provider flagged
/// the rejection as permanent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("{channel} provider is not configured")]
    NotConfigured { channel: Channel },

    #[error("recipient has no {field} for {channel}")]
    MissingRecipient { channel: Channel, field: &'static str },

    #[error("{channel} send failed: {reason}")]
    Rejected {
        channel: Channel,
        reason: String,
        permanent: bool,
    },

    #[error("{channel} provider timed out after {timeout_ms}ms")]
    Timeout { channel: Channel, timeout_ms: u64 },
}

impl SendError {
    pub fn rejected(channel: Channel, reason: impl Into<String>) -> Self {
        SendError::Rejected {
            channel,
            reason: reason.into(),
            permanent: false,
        }
    }

    pub fn permanent(channel: Channel, reason: impl Into<String>) -> Self {
        SendError::Rejected {
            channel,
            reason: reason.into(),
            permanent: true,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, SendError::Rejected { permanent: true, .. })
    }
}
