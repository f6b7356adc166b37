use crate::error::CampaignResult;
use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CAMPAIGN_DISPATCH__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub experiments: ExperimentConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Per-channel send budgets, in messages per rolling minute.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_email_per_minute")]
    pub email_per_minute: u32,
    #[serde(default = "default_whatsapp_per_minute")]
    pub whatsapp_per_minute: u32,
    #[serde(default = "default_sms_per_minute")]
    pub sms_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    /// Run one worker per channel instead of a single sequential pass.
    #[serde(default)]
    pub parallel_channels: bool,
    #[serde(default = "default_max_error_len")]
    pub max_error_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_variant_count")]
    pub variant_count: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub sendgrid: SendGridSettings,
    #[serde(default)]
    pub whatsapp: WhatsAppSettings,
    #[serde(default)]
    pub sms: SmsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendGridSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppSettings {
    #[serde(default = "default_whatsapp_api_base")]
    pub api_base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsSettings {
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_sms_sender_id")]
    pub sender_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationConfig {
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_phone: Option<String>,
}

// Default functions
fn default_node_id() -> String {
    "dispatch-01".to_string()
}
fn default_email_per_minute() -> u32 {
    60
}
fn default_whatsapp_per_minute() -> u32 {
    30
}
fn default_sms_per_minute() -> u32 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_provider_timeout_ms() -> u64 {
    10_000
}
fn default_max_error_len() -> usize {
    500
}
fn default_variant_count() -> usize {
    3
}
fn default_from_email() -> String {
    "noreply@example.com".to_string()
}
fn default_from_name() -> String {
    "Campaign Dispatch".to_string()
}
fn default_whatsapp_api_base() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}
fn default_sms_sender_id() -> String {
    "AI-MKT".to_string()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            email_per_minute: default_email_per_minute(),
            whatsapp_per_minute: default_whatsapp_per_minute(),
            sms_per_minute: default_sms_per_minute(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            provider_timeout_ms: default_provider_timeout_ms(),
            parallel_channels: false,
            max_error_len: default_max_error_len(),
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            variant_count: default_variant_count(),
        }
    }
}

impl Default for SendGridSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

impl Default for WhatsAppSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_whatsapp_api_base(),
            access_token: None,
            phone_number_id: None,
        }
    }
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            sender_id: default_sms_sender_id(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            rate_limits: RateLimitConfig::default(),
            delivery: DeliveryConfig::default(),
            experiments: ExperimentConfig::default(),
            providers: ProviderConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> CampaignResult<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, then environment
    /// variables (which take precedence).
    pub fn load_from(path: Option<&str>) -> CampaignResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::with_name(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGN_DISPATCH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
