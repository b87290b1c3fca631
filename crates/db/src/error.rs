//! Storage error shared by every store adapter (Postgres and in-memory).

use dropbinge_core::media::TrackedKey;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A unique constraint rejected a write. Always a logic bug upstream.
    #[error("Unique constraint violated: {0}")]
    ConstraintViolation(String),

    /// The tracking cache entry changed since the caller read its baseline.
    #[error("Tracking cache entry {0} changed since it was read")]
    StaleBaseline(TrackedKey),
}

impl From<sqlx::Error> for StoreError {
    /// PostgreSQL unique violations (SQLSTATE 23505) become
    /// [`StoreError::ConstraintViolation`] named after the constraint.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::ConstraintViolation(constraint);
            }
        }
        StoreError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use dropbinge_core::media::MediaType;

    use super::*;

    #[test]
    fn non_database_errors_stay_database_errors() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn stale_baseline_names_the_key() {
        let key = TrackedKey {
            media_type: MediaType::Movie,
            external_id: 555,
            season_number: None,
        };
        assert_eq!(
            StoreError::StaleBaseline(key).to_string(),
            "Tracking cache entry movie:555 changed since it was read"
        );
    }
}
