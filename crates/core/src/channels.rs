//! Delivery channels and the content keys each one renders from.
//!
//! The channel set is closed: every sender, template lookup and eligibility
//! rule matches on it exhaustively, so adding a channel is a compile error
//! everywhere it has not been handled yet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output channels a campaign message can be delivered on.
///
/// Declaration order is the order enabled channels are iterated in when a
/// customer's preference list does not mention them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Whatsapp,
    Sms,
    Facebook,
    Instagram,
    Twitter,
}

/// Sender family a channel is routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Whatsapp,
    Sms,
    Social,
}

/// Key of the content field a channel renders from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKey {
    EmailBody,
    WhatsappMessage,
    SmsText,
    SocialPost,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Email,
        Channel::Whatsapp,
        Channel::Sms,
        Channel::Facebook,
        Channel::Instagram,
        Channel::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
            Channel::Sms => "sms",
            Channel::Facebook => "facebook",
            Channel::Instagram => "instagram",
            Channel::Twitter => "twitter",
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Email => ChannelKind::Email,
            Channel::Whatsapp => ChannelKind::Whatsapp,
            Channel::Sms => ChannelKind::Sms,
            Channel::Facebook | Channel::Instagram | Channel::Twitter => ChannelKind::Social,
        }
    }

    /// Phone-dependent channels cannot reach a customer without a number.
    pub fn requires_phone(&self) -> bool {
        matches!(self.kind(), ChannelKind::Whatsapp | ChannelKind::Sms)
    }

    pub fn template_key(&self) -> TemplateKey {
        match self.kind() {
            ChannelKind::Email => TemplateKey::EmailBody,
            ChannelKind::Whatsapp => TemplateKey::WhatsappMessage,
            ChannelKind::Sms => TemplateKey::SmsText,
            ChannelKind::Social => TemplateKey::SocialPost,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown channel: {s}"))
    }
}

impl TemplateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKey::EmailBody => "email_body",
            TemplateKey::WhatsappMessage => "whatsapp_message",
            TemplateKey::SmsText => "sms_text",
            TemplateKey::SocialPost => "social_post",
        }
    }
}
