use thiserror::Error;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    /// Dispatch refused by campaign policy (draft without override, no
    /// product linked, empty audience). Surfaced to the caller, never retried.
    #[error("Policy violation: {0}")]
    Policy(String),

    #[error("Content supplier error: {0}")]
    ContentSupplier(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CampaignError {
    pub fn policy(msg: impl Into<String>) -> Self {
        CampaignError::Policy(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CampaignError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_policy(&self) -> bool {
        matches!(self, CampaignError::Policy(_))
    }
}

impl From<config::ConfigError> for CampaignError {
    fn from(err: config::ConfigError) -> Self {
        CampaignError::Config(err.to_string())
    }
}
