use dropbinge_core::error::CoreError;
use dropbinge_core::media::TrackedKey;
use dropbinge_db::StoreError;
use dropbinge_tmdb::TmdbError;

/// Failure to obtain a usable snapshot from the upstream content API.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Upstream request failed: {0}")]
    Request(String),

    #[error("Upstream API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    #[error("No source provider configured")]
    NotConfigured,
}

impl From<TmdbError> for SourceError {
    fn from(err: TmdbError) -> Self {
        match err {
            TmdbError::Request(e) => SourceError::Request(e.to_string()),
            TmdbError::Api { status, body } => SourceError::Api { status, body },
            TmdbError::MissingSeason(key) => {
                SourceError::Malformed(format!("{key} has no season number"))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// Nothing was written; the stored entry is left as it was.
    #[error("Upstream fetch failed for {key}: {source}")]
    UpstreamFetch { key: TrackedKey, source: SourceError },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Unsupported(#[from] CoreError),
}
