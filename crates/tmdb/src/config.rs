//! TMDB client configuration.

use std::time::Duration;

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How requests authenticate. A bearer token wins when both are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TmdbAuth {
    /// `Authorization: Bearer <token>` header.
    Bearer(String),
    /// `api_key` query parameter.
    ApiKey(String),
}

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub base_url: String,
    pub auth: TmdbAuth,
    pub timeout: Duration,
}

impl TmdbConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if neither credential is set.
    ///
    /// | Variable            | Required | Default                         |
    /// |---------------------|----------|---------------------------------|
    /// | `TMDB_BEARER_TOKEN` | one of   |                                 |
    /// | `TMDB_API_KEY`      | one of   |                                 |
    /// | `TMDB_BASE_URL`     | no       | `https://api.themoviedb.org/3`  |
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let auth = match (non_empty("TMDB_BEARER_TOKEN"), non_empty("TMDB_API_KEY")) {
            (Some(token), _) => TmdbAuth::Bearer(token),
            (None, Some(key)) => TmdbAuth::ApiKey(key),
            (None, None) => return None,
        };

        Some(Self {
            base_url: non_empty("TMDB_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            auth,
            timeout: DEFAULT_TIMEOUT,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_credentials_disable_client() {
        assert!(TmdbConfig::from_lookup(lookup(&[])).is_none());
        assert!(TmdbConfig::from_lookup(lookup(&[("TMDB_API_KEY", " ")])).is_none());
    }

    #[test]
    fn bearer_token_takes_precedence() {
        let config = TmdbConfig::from_lookup(lookup(&[
            ("TMDB_BEARER_TOKEN", "tok"),
            ("TMDB_API_KEY", "key"),
        ]))
        .unwrap();
        assert_eq!(config.auth, TmdbAuth::Bearer("tok".into()));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn base_url_override_drops_trailing_slash() {
        let config = TmdbConfig::from_lookup(lookup(&[
            ("TMDB_API_KEY", "key"),
            ("TMDB_BASE_URL", "http://localhost:9000/3/"),
        ]))
        .unwrap();
        assert_eq!(config.auth, TmdbAuth::ApiKey("key".into()));
        assert_eq!(config.base_url, "http://localhost:9000/3");
    }
}
