//! Source Provider port: where fresh snapshots come from.

use async_trait::async_trait;
use dropbinge_core::media::TrackedKey;
use dropbinge_tmdb::TmdbClient;
use serde_json::Value;

use crate::error::SourceError;

#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch the current upstream document for `key`.
    async fn fetch_detail(&self, key: &TrackedKey) -> Result<Value, SourceError>;
}

#[async_trait]
impl SourceProvider for TmdbClient {
    async fn fetch_detail(&self, key: &TrackedKey) -> Result<Value, SourceError> {
        Ok(self.fetch(key).await?)
    }
}
