//! Domain logic for title tracking and change detection.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! repository layer, the refresh engine, the outbox dispatcher and any CLI
//! tooling. Everything here is pure: no I/O, no database, no network.

pub mod changes;
pub mod channels;
pub mod clock;
pub mod error;
pub mod media;
pub mod outbox;
pub mod preferences;
pub mod snapshot;
pub mod ttl;
pub mod types;
