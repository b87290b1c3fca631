//! Channel providers that push rendered notifications out of the system.
//!
//! A provider makes exactly one attempt per call; retries are driven by
//! the outbox state machine, not here.

use async_trait::async_trait;
use dropbinge_core::channels::Channel;

pub mod email;
pub mod gateway;

/// One message ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Email address or phone number, depending on the channel.
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub reply_to: Option<String>,
}

/// Error type for delivery failures. Captured per outbox row by the
/// dispatcher and stored as `last_error`.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient, sender or reply-to address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The message could not be rendered or assembled.
    #[error("Message build error: {0}")]
    Build(String),

    /// The HTTP request to a gateway failed (network, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status code.
    #[error("Gateway returned HTTP {0}")]
    HttpStatus(u16),

    /// The user has no address for this channel.
    #[error("No recipient address for channel {0}")]
    NoRecipient(Channel),
}

/// Sends messages over one channel.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError>;
}
