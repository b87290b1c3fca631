/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a movie or series in the upstream content API.
pub type ExternalId = i64;

/// Season ordinal within a series. Upstream uses season 0 for specials.
pub type SeasonNumber = i32;
