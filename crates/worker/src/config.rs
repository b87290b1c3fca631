//! Worker configuration loaded from environment variables.

use std::time::Duration;

use dropbinge_core::outbox::RetryPolicy;
use dropbinge_events::DispatchOptions;
use dropbinge_tracking::RefreshLimits;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Settings for the dispatch and refresh loops.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Sleep between dispatch cycles.
    pub poll_interval: Duration,
    pub dispatch: DispatchOptions,
    /// Sleep between bulk refresh passes.
    pub refresh_interval: Duration,
    pub refresh_limits: RefreshLimits,
    /// Base for deep links in rendered notifications.
    pub app_base_url: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default  |
    /// |----------------------------------|----------|
    /// | `DATABASE_URL`                   | required |
    /// | `DISPATCH_POLL_INTERVAL_SECS`    | `30`     |
    /// | `DISPATCH_BATCH_SIZE`            | `25`     |
    /// | `DISPATCH_MAX_ATTEMPTS`          | `5`      |
    /// | `DISPATCH_STALE_SENDING_MINUTES` | `15`     |
    /// | `DISPATCH_BACKOFF_BASE_SECS`     | `60`     |
    /// | `DISPATCH_BACKOFF_MAX_SECS`      | `3600`   |
    /// | `DISPATCH_DRY_RUN`               | `false`  |
    /// | `REFRESH_INTERVAL_SECS`          | `3600`   |
    /// | `REFRESH_LIMIT_USERS`            | unset    |
    /// | `REFRESH_LIMIT_FOLLOWS`          | unset    |
    /// | `APP_BASE_URL`                   | unset    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let number = |var: &'static str, default: i64| -> Result<i64, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(ConfigError::Invalid { var, value: raw }),
            }
        };

        let poll_secs = number("DISPATCH_POLL_INTERVAL_SECS", 30)?;
        let max_attempts = number("DISPATCH_MAX_ATTEMPTS", 5)?;
        let dispatch = DispatchOptions {
            batch_size: number("DISPATCH_BATCH_SIZE", 25)?,
            stale_minutes: number("DISPATCH_STALE_SENDING_MINUTES", 15)?,
            retry: RetryPolicy {
                max_attempts: i32::try_from(max_attempts).map_err(|_| ConfigError::Invalid {
                    var: "DISPATCH_MAX_ATTEMPTS",
                    value: max_attempts.to_string(),
                })?,
                backoff_base_secs: number("DISPATCH_BACKOFF_BASE_SECS", 60)?,
                backoff_max_secs: number("DISPATCH_BACKOFF_MAX_SECS", 3600)?,
            },
            dry_run: lookup("DISPATCH_DRY_RUN").is_some_and(|v| parse_flag(&v)),
        };
        let refresh_secs = number("REFRESH_INTERVAL_SECS", 3600)?;

        Ok(Self {
            database_url,
            poll_interval: Duration::from_secs(poll_secs.unsigned_abs()),
            dispatch,
            refresh_interval: Duration::from_secs(refresh_secs.unsigned_abs()),
            refresh_limits: RefreshLimits {
                limit_users: optional_limit(lookup("REFRESH_LIMIT_USERS")),
                limit_follows: optional_limit(lookup("REFRESH_LIMIT_FOLLOWS")),
            },
            app_base_url: lookup("APP_BASE_URL").filter(|v| !v.trim().is_empty()),
        })
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Positive integer or unset; anything else reads as unset.
fn optional_limit(raw: Option<String>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
}
