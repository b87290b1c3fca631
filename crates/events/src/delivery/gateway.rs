//! Messaging gateway delivery (WhatsApp through an HTTP relay).
//!
//! [`GatewayDelivery`] POSTs a JSON message to the configured gateway URL.
//! Only the plain-text body is sent; HTML is dropped.

use std::time::Duration;

use async_trait::async_trait;
use dropbinge_core::channels::Channel;

use super::{ChannelProvider, DeliveryError, OutgoingMessage};

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    /// Sent as a bearer token when set.
    pub token: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `WHATSAPP_GATEWAY_URL` is not set.
    ///
    /// | Variable                 | Required | Default |
    /// |--------------------------|----------|---------|
    /// | `WHATSAPP_GATEWAY_URL`   | yes      |         |
    /// | `WHATSAPP_GATEWAY_TOKEN` | no       |         |
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("WHATSAPP_GATEWAY_URL").ok().filter(|u| !u.is_empty())?;
        Some(Self {
            url,
            token: std::env::var("WHATSAPP_GATEWAY_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }
}

// ---------------------------------------------------------------------------
// GatewayDelivery
// ---------------------------------------------------------------------------

pub struct GatewayDelivery {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayDelivery {
    pub fn new(config: GatewayConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    fn request(&self, message: &OutgoingMessage) -> reqwest::RequestBuilder {
        let body = serde_json::json!({
            "to": message.to,
            "subject": message.subject,
            "text": message.text,
        });
        let builder = self.client.post(&self.config.url).json(&body);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ChannelProvider for GatewayDelivery {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        let response = self.request(message).send().await?;
        if !response.status().is_success() {
            return Err(DeliveryError::HttpStatus(response.status().as_u16()));
        }
        tracing::info!(to = %message.to, "Gateway message sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(token: Option<&str>) -> GatewayDelivery {
        GatewayDelivery::new(GatewayConfig {
            url: "https://gateway.test/messages".into(),
            token: token.map(str::to_string),
        })
        .unwrap()
    }

    fn message() -> OutgoingMessage {
        OutgoingMessage {
            to: "+15550100".into(),
            subject: "[DropBinge] BINGE".into(),
            text: "Title: Severance".into(),
            html: Some("<p>Title: Severance</p>".into()),
            reply_to: None,
        }
    }

    #[test]
    fn request_posts_text_with_token() {
        let request = delivery(Some("secret")).request(&message()).build().unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.headers()["authorization"], "Bearer secret");

        let body: serde_json::Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["to"], "+15550100");
        assert_eq!(body["text"], "Title: Severance");
        assert!(body.get("html").is_none());
    }

    #[test]
    fn request_without_token_has_no_auth_header() {
        let request = delivery(None).request(&message()).build().unwrap();
        assert!(request.headers().get("authorization").is_none());
    }

    #[test]
    fn http_status_error_display() {
        assert_eq!(DeliveryError::HttpStatus(502).to_string(), "Gateway returned HTTP 502");
    }
}
