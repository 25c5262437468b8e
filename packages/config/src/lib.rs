#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration file reading and startup validation.
//!
//! The daemon takes a single JSON configuration file (`.yaml`/`.yml` is
//! reserved but not implemented). [`read_config`] parses it,
//! [`validation::validate`] checks and normalises it; both run before any
//! engine starts, so a bad config fails the process with a diagnostic
//! instead of a half-running fleet.

pub mod validation;

use std::path::Path;
use std::time::Duration;

use ffs_puller_enrich::ReshapeMode;
use ffs_puller_event_models::SearchQuery;
use serde::Deserialize;
use thiserror::Error;

/// Errors from reading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be opened or read.
    #[error("error reading configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for the expected shape.
    #[error("error parsing JSON configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    /// The path has no extension to dispatch on.
    #[error("no file extension found on configuration file, unable to properly parse")]
    NoExtension,

    /// YAML support is reserved but not built.
    #[error("yaml configuration files are not yet implemented")]
    YamlUnimplemented,

    /// Unrecognized config format.
    #[error("unknown file extension: {extension}, supported file extensions: json")]
    UnknownExtension {
        /// The extension found.
        extension: String,
    },

    /// A validation rule failed.
    #[error("{0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(rename = "authURI")]
    pub auth_uri: String,
    #[serde(rename = "ffsURI")]
    pub ffs_uri: String,
    #[serde(default)]
    pub debugging: bool,
    #[serde(default)]
    pub prometheus: Option<PrometheusConfig>,
    #[serde(rename = "ipAPI", default)]
    pub ip_api: Option<IpApiConfig>,
    /// Overrides the built-in recoverable-error pattern catalogue.
    #[serde(default)]
    pub recoverable_error_patterns: Option<Vec<String>>,
    pub ffs_queries: Vec<FfsQueryConfig>,
}

/// Prometheus metrics endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub port: u16,
}

/// IP geolocation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpApiConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Endpoint base URL; the free public endpoint when absent.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
    /// Comma-separated response field allow-list. Validation guarantees the
    /// `query` field is present.
    #[serde(default)]
    pub fields: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub local_cache: Option<LocalCacheConfig>,
}

/// Geolocation cache lifetimes and snapshot settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCacheConfig {
    /// Lifetime of successful lookups, e.g. `"24h"`.
    pub success_age: String,
    /// Lifetime of failed lookups, e.g. `"30m"`.
    pub failed_age: String,
    /// Directory the cache snapshot is written into; no snapshot if absent.
    #[serde(default)]
    pub write_location: Option<String>,
    /// Snapshot cadence, e.g. `"5m"`.
    #[serde(default)]
    pub write_interval: Option<String>,
}

/// The delivery target for a query's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    File,
    Elastic,
    Logstash,
}

/// One configured query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FfsQueryConfig {
    pub name: String,
    pub username: String,
    pub password: String,
    /// Window tick cadence, e.g. `"30s"`.
    pub interval: String,
    /// Window width, e.g. `"5m"`.
    pub time_gap: String,
    /// Upstream query template; must carry the `ON_OR_AFTER` and
    /// `ON_OR_BEFORE` filters the scheduler rewrites.
    pub query: SearchQuery,
    pub output_type: OutputType,
    /// Directory for state files and (for the file sink) event files.
    /// Defaults to the working directory.
    #[serde(default)]
    pub output_location: Option<String>,
    #[serde(rename = "esStandardized", default)]
    pub es_standardized: ReshapeMode,
    #[serde(default)]
    pub valid_ip_addresses_only: bool,
    /// Maximum windows in flight; `-1` means unbounded.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_queries: i64,
    #[serde(default)]
    pub elasticsearch: Option<ElasticsearchConfig>,
    #[serde(default)]
    pub logstash: Option<LogstashConfig>,
}

/// Elasticsearch sink settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchConfig {
    #[serde(rename = "elasticURL")]
    pub elastic_url: Vec<String>,
    #[serde(default)]
    pub basic_auth: Option<BasicAuthConfig>,
    pub index_name: String,
    /// `chrono` strftime pattern appended to the index name after a `-`.
    #[serde(default)]
    pub index_time_append: Option<String>,
    #[serde(default)]
    pub index_time_gen: Option<String>,
    #[serde(default = "default_shards")]
    pub number_of_shards: u32,
    #[serde(default)]
    pub number_of_replicas: u32,
    #[serde(default)]
    pub best_compression: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// When set, indices are created empty and a cluster-side template owns
    /// the mapping.
    #[serde(default)]
    pub use_custom_index_pattern: bool,
}

/// Basic-auth credentials for Elasticsearch.
#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuthConfig {
    pub user: String,
    pub password: String,
}

/// Logstash sink settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogstashConfig {
    #[serde(rename = "logstashURL")]
    pub logstash_url: Vec<String>,
}

const fn default_true() -> bool {
    true
}

const fn default_max_concurrent() -> i64 {
    5
}

const fn default_shards() -> u32 {
    1
}

impl FfsQueryConfig {
    /// The parsed tick interval.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configured string is not a duration;
    /// validation rejects such configs up front.
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_duration("interval", &self.interval)
    }

    /// The parsed window width.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configured string is not a duration.
    pub fn time_gap(&self) -> Result<Duration, ConfigError> {
        parse_duration("timeGap", &self.time_gap)
    }
}

impl LocalCacheConfig {
    /// The parsed successful-lookup lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configured string is not a duration.
    pub fn success_age(&self) -> Result<Duration, ConfigError> {
        parse_duration("successAge", &self.success_age)
    }

    /// The parsed failed-lookup lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configured string is not a duration.
    pub fn failed_age(&self) -> Result<Duration, ConfigError> {
        parse_duration("failedAge", &self.failed_age)
    }

    /// The parsed snapshot cadence, if snapshotting is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configured string is not a duration.
    pub fn write_interval(&self) -> Result<Option<Duration>, ConfigError> {
        self.write_interval
            .as_deref()
            .map(|raw| parse_duration("writeInterval", raw))
            .transpose()
    }
}

pub(crate) fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let duration = humantime::parse_duration(raw)
        .map_err(|e| ConfigError::Invalid(format!("error: invalid {field} duration {raw:?}: {e}")))?;
    if duration.is_zero() {
        return Err(ConfigError::Invalid(format!(
            "error: {field} duration must be greater than zero"
        )));
    }
    Ok(duration)
}

/// Reads and parses (but does not validate) the configuration file.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, an unsupported extension, or a
/// JSON parse failure.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or(ConfigError::NoExtension)?;

    match extension.to_ascii_lowercase().as_str() {
        "json" => {
            let bytes = std::fs::read(path)?;
            Ok(serde_json::from_slice(&bytes)?)
        }
        "yaml" | "yml" => Err(ConfigError::YamlUnimplemented),
        other => Err(ConfigError::UnknownExtension {
            extension: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> serde_json::Value {
        serde_json::json!({
            "authURI": "https://auth.example.com/api/v1/token",
            "ffsURI": "https://ffs.example.com/api/v1/fileevent/export",
            "ffsQueries": [{
                "name": "exfil",
                "username": "alice@example.com",
                "password": "hunter2",
                "interval": "30s",
                "timeGap": "5m",
                "outputType": "file",
                "query": {
                    "groups": [{
                        "filters": [
                            {"operator": "ON_OR_AFTER", "term": "eventTimestamp", "value": ""},
                            {"operator": "ON_OR_BEFORE", "term": "eventTimestamp", "value": ""}
                        ]
                    }]
                }
            }]
        })
    }

    fn write_config(dir: &Path, name: &str, value: &serde_json::Value) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn reads_a_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.json", &minimal_config());

        let config = read_config(&path).unwrap();
        assert_eq!(config.ffs_queries.len(), 1);
        assert_eq!(config.ffs_queries[0].name, "exfil");
        assert_eq!(config.ffs_queries[0].max_concurrent_queries, 5);
        assert_eq!(config.ffs_queries[0].output_type, OutputType::File);
    }

    #[test]
    fn yaml_is_reserved_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "authURI: x").unwrap();

        assert!(matches!(
            read_config(&path),
            Err(ConfigError::YamlUnimplemented)
        ));
    }

    #[test]
    fn extension_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "{}").unwrap();

        assert!(matches!(read_config(&path), Err(ConfigError::NoExtension)));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        assert!(matches!(
            read_config(&path),
            Err(ConfigError::UnknownExtension { .. })
        ));
    }

    #[test]
    fn durations_parse_through_accessors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.json", &minimal_config());
        let config = read_config(&path).unwrap();

        let query = &config.ffs_queries[0];
        assert_eq!(query.interval().unwrap(), Duration::from_secs(30));
        assert_eq!(query.time_gap().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn zero_durations_are_rejected() {
        assert!(parse_duration("interval", "0s").is_err());
        assert!(parse_duration("interval", "shortly").is_err());
    }
}
