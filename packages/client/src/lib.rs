#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Forensic File Search API client.
//!
//! Two operations: fetch an auth token (basic-auth GET) and fetch the file
//! events for a query window (authenticated POST, CSV response). The module
//! also classifies failures into *recoverable* (worth a bounded retry by the
//! engine) and *fatal*, by matching the rendered error against a pattern
//! list. The default list reproduces the upstream failure modes observed in
//! production; deployments can override it from the config file as the
//! upstream evolves.

pub mod decode;

use ffs_puller_event_models::{AuthData, FileEvent, SearchQuery};
use thiserror::Error;

/// Substring patterns identifying errors that are safe to retry.
pub const DEFAULT_RECOVERABLE_PATTERNS: &[&str] = &[
    "500 Internal Server Error",
    "INTERNAL_ERROR",
    "PROTOCOL_ERROR",
    "connection reset by peer",
    "POST: 400 Bad Request",
    "unexpected EOF",
    "POST: 504 Gateway Timeout",
    "wrong number of fields",
    "extraneous or missing \" in quoted-field",
];

/// Errors from the FFS API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Auth endpoint returned a non-200 status.
    #[error("Error with Authentication Token GET: {status}")]
    AuthStatus {
        /// Status line as returned by the server.
        status: String,
    },

    /// Auth endpoint is down for maintenance.
    #[error("auth api service is under maintenance")]
    AuthMaintenance,

    /// Auth response did not contain a token.
    #[error("auth response missing v3_user_token")]
    MissingToken,

    /// Auth response body was not valid JSON.
    #[error("auth response parse error: {0}")]
    AuthParse(#[from] serde_json::Error),

    /// Event-search endpoint returned a non-200 status.
    #[error("Error with gathering file events POST: {status}")]
    EventsStatus {
        /// Status line as returned by the server.
        status: String,
    },

    /// CSV body could not be read.
    #[error("event response decode error: {0}")]
    Csv(#[from] csv::Error),

    /// The response header row no longer matches the known column set.
    #[error(
        "number of columns in CSV response does not match expected set, API changed. \
         New CSV columns: {columns}"
    )]
    SchemaDrift {
        /// The header row actually received, comma-joined.
        columns: String,
    },

    /// A cell failed to parse into its typed field.
    #[error("record on line {line}: {message}")]
    Field {
        /// 1-based CSV line number.
        line: u64,
        /// Description of the cell that failed.
        message: String,
    },
}

/// Returns whether `err` matches any of the recoverable patterns.
///
/// Matching is plain substring containment on the rendered error chain, the
/// same contract the patterns were observed under.
#[must_use]
pub fn is_recoverable(err: &ClientError, patterns: &[String]) -> bool {
    let rendered = error_chain(err);
    patterns.iter().any(|p| rendered.contains(p.as_str()))
}

fn error_chain(err: &ClientError) -> String {
    use std::error::Error as _;

    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        source = inner.source();
    }
    rendered
}

/// Fetches an auth token from the auth endpoint.
///
/// The token is valid for up to an hour; callers refresh on a 55 minute
/// cadence.
///
/// # Errors
///
/// Returns [`ClientError`] on transport failure, a non-200 status, a
/// maintenance page, or a token-less response body.
pub async fn get_auth_token(
    client: &reqwest::Client,
    uri: &str,
    username: &str,
    password: &str,
) -> Result<String, ClientError> {
    let response = client
        .get(uri)
        .basic_auth(username, Some(password))
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(ClientError::AuthStatus {
            status: format_status(status),
        });
    }

    let body = response.text().await?;
    if body.contains("Service Under Maintenance") {
        return Err(ClientError::AuthMaintenance);
    }

    let auth: AuthData = serde_json::from_str(&body)?;
    if auth.data.v3_user_token.is_empty() {
        return Err(ClientError::MissingToken);
    }
    Ok(auth.data.v3_user_token)
}

/// Fetches all file events matching `query`.
///
/// POSTs the query body with the `v3_user_token` authorization scheme and
/// decodes the CSV response into canonical [`FileEvent`] records. The header
/// row is validated against the known column set first: schema drift is fatal
/// by design, to keep decoded data trustworthy.
///
/// # Errors
///
/// Returns [`ClientError`] on transport failure, a non-200 status, header
/// drift, or an undecodable row.
pub async fn get_events(
    client: &reqwest::Client,
    token: &str,
    ffs_uri: &str,
    query: &SearchQuery,
) -> Result<Vec<FileEvent>, ClientError> {
    if token.is_empty() {
        return Err(ClientError::MissingToken);
    }

    let response = client
        .post(ffs_uri)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(reqwest::header::AUTHORIZATION, format!("v3_user_token {token}"))
        .json(query)
        .send()
        .await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(ClientError::EventsStatus {
            status: format_status(status),
        });
    }

    let body = response.text().await?;
    decode::decode_events(body.as_bytes())
}

fn format_status(status: reqwest::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_patterns() -> Vec<String> {
        DEFAULT_RECOVERABLE_PATTERNS
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn classifies_recoverable_statuses() {
        let patterns = default_patterns();
        for status in ["500 Internal Server Error", "400 Bad Request", "504 Gateway Timeout"] {
            let err = ClientError::EventsStatus {
                status: status.to_string(),
            };
            assert!(is_recoverable(&err, &patterns), "{status} should retry");
        }
    }

    #[test]
    fn classifies_csv_shape_errors_as_recoverable() {
        let patterns = default_patterns();
        let err = ClientError::Field {
            line: 17,
            message: "wrong number of fields".to_string(),
        };
        assert!(is_recoverable(&err, &patterns));

        let err = ClientError::Field {
            line: 3,
            message: "extraneous or missing \" in quoted-field".to_string(),
        };
        assert!(is_recoverable(&err, &patterns));
    }

    #[test]
    fn auth_failures_are_fatal() {
        let patterns = default_patterns();
        let err = ClientError::AuthStatus {
            status: "401 Unauthorized".to_string(),
        };
        assert!(!is_recoverable(&err, &patterns));
        assert!(!is_recoverable(&ClientError::AuthMaintenance, &patterns));
    }

    #[test]
    fn schema_drift_is_fatal() {
        let patterns = default_patterns();
        let err = ClientError::SchemaDrift {
            columns: "Event ID,Event type,Surprise".to_string(),
        };
        assert!(!is_recoverable(&err, &patterns));
    }

    #[test]
    fn not_found_is_fatal() {
        let patterns = default_patterns();
        let err = ClientError::EventsStatus {
            status: "404 Not Found".to_string(),
        };
        assert!(!is_recoverable(&err, &patterns));
    }

    #[test]
    fn custom_patterns_extend_the_catalogue() {
        let patterns = vec!["teapot".to_string()];
        let err = ClientError::EventsStatus {
            status: "418 teapot".to_string(),
        };
        assert!(is_recoverable(&err, &patterns));
    }
}
