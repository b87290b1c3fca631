//! Notification delivery channels.
//!
//! The string constants must match the values stored in the
//! `notification_outbox.channel` column.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Email delivered via SMTP.
pub const CHANNEL_EMAIL: &str = "email";

/// WhatsApp message delivered through an HTTP gateway.
pub const CHANNEL_WHATSAPP: &str = "whatsapp";

/// A delivery channel a follow can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Whatsapp,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Email, Channel::Whatsapp];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Email => CHANNEL_EMAIL,
            Channel::Whatsapp => CHANNEL_WHATSAPP,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CHANNEL_EMAIL => Ok(Channel::Email),
            CHANNEL_WHATSAPP => Ok(Channel::Whatsapp),
            other => Err(CoreError::Validation(format!("unknown channel '{other}'"))),
        }
    }
}
