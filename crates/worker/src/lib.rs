//! Background worker: outbox dispatch and scheduled refresh loops.

pub mod background;
pub mod config;
