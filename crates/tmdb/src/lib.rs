//! HTTP client for the TMDB v3 API.
//!
//! Only the three detail endpoints used for tracking are wrapped. Responses
//! are returned as raw JSON; field extraction happens in `dropbinge-core`.

pub mod client;
pub mod config;

pub use client::{TmdbClient, TmdbError};
pub use config::{TmdbAuth, TmdbConfig};
