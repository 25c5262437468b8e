#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! IP geolocation: upstream client, shared TTL cache, and the resolver that
//! combines them.
//!
//! One [`cache::GeoCache`] is shared by every query engine in the process so
//! a public IP seen by several queries costs one upstream lookup. Successful
//! lookups and failures are both cached, with separate lifetimes, so a dead
//! IP does not hammer the upstream on every event.

pub mod cache;
pub mod client;
pub mod resolver;

use std::time::Duration;

use thiserror::Error;

/// Errors from geolocation lookups and cache persistence.
#[derive(Debug, Error)]
pub enum GeoError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned a non-200 status.
    #[error("geolocation lookup returned {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Snapshot serialisation failed.
    #[error("cache snapshot encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Snapshot file I/O failed.
    #[error("cache snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Behavioural knobs for the resolver, shaped by the config layer.
#[derive(Debug, Clone)]
pub struct GeoOptions {
    /// Comma-separated upstream field allow-list. Validation guarantees the
    /// `query` field is always present.
    pub fields: String,
    /// Response language code.
    pub lang: String,
    /// Cache lifetime for successful lookups.
    pub success_age: Duration,
    /// Cache lifetime for failed lookups.
    pub failed_age: Duration,
    /// Log every cache hit/insert.
    pub debugging: bool,
}
