#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-query ingestion engine.
//!
//! One [`engine::QueryEngine`] runs per configured query, each owning its
//! durable window state and cooperating tasks: a periodic auth refresh, a
//! window tick that admits new fetches, and the in-flight window tasks
//! themselves. The [`scheduler`] decides window bounds; the engine enforces
//! the persistence ordering that makes delivery at-least-once across
//! crashes.

pub mod engine;
pub mod scheduler;

pub use engine::{QueryEngine, QuerySpec};

use ffs_puller_client::ClientError;
use ffs_puller_output::OutputError;
use ffs_puller_state::StateError;
use thiserror::Error;

/// Fatal engine failures. Any of these stops the query for good.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Could not obtain or refresh the auth token.
    #[error("error getting auth data for ffs query {name}: {source}")]
    Auth {
        /// Query name.
        name: String,
        #[source]
        source: ClientError,
    },

    /// Event fetch failed with a non-recoverable error.
    #[error("error getting file events for ffs query {name}: {source}")]
    Fetch {
        /// Query name.
        name: String,
        #[source]
        source: ClientError,
    },

    /// The bounded retry budget ran out.
    #[error("failed on retry of query 10 times, stopping ffs query: {name}")]
    RetriesExhausted {
        /// Query name.
        name: String,
    },

    /// Durable state could not be read or written.
    #[error(transparent)]
    State(#[from] StateError),

    /// Sink delivery failed.
    #[error("error delivering events for ffs query {name}: {source}")]
    Output {
        /// Query name.
        name: String,
        #[source]
        source: OutputError,
    },

    /// The query template's window filters did not parse.
    #[error("error parsing query window bounds for ffs query {name}: {source}")]
    Template {
        /// Query name.
        name: String,
        #[source]
        source: chrono::ParseError,
    },
}
