//! Detail endpoint client.

use dropbinge_core::media::{MediaType, TrackedKey};
use dropbinge_core::types::{ExternalId, SeasonNumber};

use crate::config::{TmdbAuth, TmdbConfig};

/// Errors from the TMDB HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum TmdbError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// TMDB returned a non-2xx status code.
    #[error("TMDB API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// A season key without a season number.
    #[error("Season key {0} has no season number")]
    MissingSeason(TrackedKey),
}

/// HTTP client for the TMDB detail endpoints.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: reqwest::Client,
    config: TmdbConfig,
}

impl TmdbClient {
    pub fn new(config: TmdbConfig) -> Result<Self, TmdbError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Reuse an existing [`reqwest::Client`] (its own timeout applies).
    pub fn with_client(client: reqwest::Client, config: TmdbConfig) -> Self {
        Self { client, config }
    }

    /// `GET /movie/{id}`
    pub async fn movie_details(&self, id: ExternalId) -> Result<serde_json::Value, TmdbError> {
        self.get_json(&format!("/movie/{id}")).await
    }

    /// `GET /tv/{id}`
    pub async fn tv_details(&self, id: ExternalId) -> Result<serde_json::Value, TmdbError> {
        self.get_json(&format!("/tv/{id}")).await
    }

    /// `GET /tv/{id}/season/{n}`
    pub async fn season_details(
        &self,
        id: ExternalId,
        season_number: SeasonNumber,
    ) -> Result<serde_json::Value, TmdbError> {
        self.get_json(&format!("/tv/{id}/season/{season_number}")).await
    }

    /// Fetch whichever resource backs a tracking key.
    pub async fn fetch(&self, key: &TrackedKey) -> Result<serde_json::Value, TmdbError> {
        match key.media_type {
            MediaType::Movie => self.movie_details(key.external_id).await,
            MediaType::Tv => self.tv_details(key.external_id).await,
            MediaType::Season => {
                let season = key.season_number.ok_or(TmdbError::MissingSeason(*key))?;
                self.season_details(key.external_id, season).await
            }
        }
    }

    // ---- private helpers ----

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .get(format!("{}{}", self.config.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.config.auth {
            TmdbAuth::Bearer(token) => builder.bearer_auth(token),
            TmdbAuth::ApiKey(key) => builder.query(&[("api_key", key)]),
        }
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, TmdbError> {
        tracing::debug!(path, "TMDB request");
        let response = self.request(path).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TmdbError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
