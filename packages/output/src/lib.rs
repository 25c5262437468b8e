#![recursion_limit = "256"]
#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Event delivery sinks.
//!
//! One completed window produces one delivery: a JSON-lines file named after
//! the window bounds, a set of Elasticsearch bulk requests, or a batch of
//! newline-delimited documents over a Logstash TCP connection. Any sink
//! failure fails the whole window; the durable state machine keeps the
//! window in progress so it is replayed after a restart (sinks must tolerate
//! re-delivery).

pub mod elastic;
pub mod file;
pub mod logstash;
pub mod mapping;

use ffs_puller_enrich::OutputEvent;
use ffs_puller_state::Window;
use thiserror::Error;

/// Errors from event delivery.
#[derive(Debug, Error)]
pub enum OutputError {
    /// File or socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document serialisation failed.
    #[error("event encode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Elasticsearch HTTP request failed.
    #[error("elasticsearch request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Elasticsearch returned an unexpected status.
    #[error("elasticsearch returned {status} for {operation}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// The operation that failed (ping, exists, create, bulk).
        operation: &'static str,
    },

    /// Index creation was not acknowledged by the cluster.
    #[error("elasticsearch index creation failed for: {index}")]
    CreateNotAcknowledged {
        /// The index being created.
        index: String,
    },

    /// The bulk response reported per-document failures.
    #[error("elasticsearch bulk indexing rejected documents: {reason}")]
    BulkRejected {
        /// First rejection reason reported.
        reason: String,
    },

    /// Logstash connection could not be established in time.
    #[error("timed out connecting to logstash at {url}")]
    ConnectTimeout {
        /// The endpoint dialled.
        url: String,
    },
}

/// A configured sink, chosen per query at startup.
pub enum Dispatcher {
    File(file::FileSink),
    Elastic(elastic::ElasticSink),
    Logstash(logstash::LogstashSink),
}

impl Dispatcher {
    /// Delivers one completed window's events.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] on any delivery failure; the window is then
    /// treated as failed and stays in progress.
    pub async fn write_batch(
        &self,
        query_name: &str,
        window: &Window,
        events: &[OutputEvent],
    ) -> Result<(), OutputError> {
        match self {
            Self::File(sink) => {
                sink.write(query_name, window, events).await?;
                Ok(())
            }
            Self::Elastic(sink) => sink.write_batch(query_name, window, events).await,
            Self::Logstash(sink) => sink.write_batch(events).await,
        }
    }
}
