//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the input DTOs its repository accepts.

pub mod change_event;
pub mod follow;
pub mod outbox;
pub mod tracking_cache;
pub mod user;
