//! Notification outbox state machine and retry policy.
//!
//! ```text
//! pending --claim--> sending --ok--> sent                       (terminal)
//! sending --error, attempts < max--> pending (next_attempt_at = now + backoff)
//! sending --error, attempts >= max--> failed                    (terminal)
//! sending --lock older than stale threshold--> pending          (requeue)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Stored error text is cut to this many characters.
pub const MAX_ERROR_LEN: usize = 2000;

// ---------------------------------------------------------------------------
// OutboxStatus
// ---------------------------------------------------------------------------

/// Value of `notification_outbox.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sending => "sending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OutboxStatus::Sent | OutboxStatus::Failed)
    }

    /// States reachable from `self`.
    pub fn valid_transitions(self) -> &'static [OutboxStatus] {
        match self {
            OutboxStatus::Pending => &[OutboxStatus::Sending],
            OutboxStatus::Sending => &[
                OutboxStatus::Sent,
                OutboxStatus::Pending,
                OutboxStatus::Failed,
            ],
            OutboxStatus::Sent | OutboxStatus::Failed => &[],
        }
    }

    pub fn can_transition(self, to: OutboxStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "sending" => Ok(OutboxStatus::Sending),
            "sent" => Ok(OutboxStatus::Sent),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(CoreError::Validation(format!("unknown outbox status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Backoff knobs for failed deliveries, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub backoff_base_secs: i64,
    pub backoff_max_secs: i64,
}

/// What to do with a row whose delivery just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to `pending`, due again after `delay_secs`.
    Retry { delay_secs: i64 },
    /// Terminal `failed`.
    GiveUp,
}

impl RetryPolicy {
    /// `attempt_count` is the value after the claim incremented it.
    pub fn decide(&self, attempt_count: i32) -> RetryDecision {
        if attempt_count >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry {
                delay_secs: backoff_seconds(
                    attempt_count,
                    self.backoff_base_secs,
                    self.backoff_max_secs,
                ),
            }
        }
    }
}

/// `min(base * 2^(attempt_count - 1), max)`, saturating on overflow.
pub fn backoff_seconds(attempt_count: i32, base_secs: i64, max_secs: i64) -> i64 {
    let exponent = u32::try_from(attempt_count.max(1) - 1).unwrap_or(0);
    2i64.checked_pow(exponent)
        .and_then(|factor| base_secs.checked_mul(factor))
        .map_or(max_secs, |delay| delay.min(max_secs))
}

/// Cut an error message to [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(error: &str) -> String {
    match error.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => error[..idx].to_string(),
        None => error.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_seconds(1, 60, 3600), 60);
        assert_eq!(backoff_seconds(2, 60, 3600), 120);
        assert_eq!(backoff_seconds(3, 60, 3600), 240);
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_seconds(7, 60, 3600), 3600);
        assert_eq!(backoff_seconds(200, 60, 3600), 3600);
    }

    #[test]
    fn backoff_treats_zero_attempts_as_first() {
        assert_eq!(backoff_seconds(0, 30, 3600), 30);
    }

    #[test]
    fn retry_until_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base_secs: 60,
            backoff_max_secs: 3600,
        };
        assert_eq!(policy.decide(1), RetryDecision::Retry { delay_secs: 60 });
        assert_matches!(policy.decide(2), RetryDecision::Retry { delay_secs: 120 });
        assert_eq!(policy.decide(3), RetryDecision::GiveUp);
        assert_eq!(policy.decide(4), RetryDecision::GiveUp);
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(OutboxStatus::Sent.is_terminal());
        assert!(OutboxStatus::Failed.valid_transitions().is_empty());
        assert!(OutboxStatus::Pending.can_transition(OutboxStatus::Sending));
        assert!(!OutboxStatus::Pending.can_transition(OutboxStatus::Sent));
        assert!(OutboxStatus::Sending.can_transition(OutboxStatus::Pending));
    }

    #[test]
    fn truncate_error_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_LEN + 10);
        let cut = truncate_error(&long);
        assert_eq!(cut.chars().count(), MAX_ERROR_LEN);
        assert_eq!(truncate_error("short"), "short");
    }
}
