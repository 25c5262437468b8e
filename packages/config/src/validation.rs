//! Startup validation.
//!
//! Checks everything the engines will rely on later so failures surface as
//! one diagnostic at startup instead of a panic mid-ingestion. Validation
//! also normalises the config in place: output locations default to the
//! working directory and the geolocation field list is forced to include
//! `query` (the cache key depends on it).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ffs_puller_event_models::{ON_OR_AFTER, ON_OR_BEFORE};
use ffs_puller_output::elastic::IndexTimeGen;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Config, ConfigError, ElasticsearchConfig, FfsQueryConfig, OutputType};

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("valid username regex")
});

/// Characters an Elasticsearch index name may not contain.
const INDEX_FORBIDDEN: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' '];

/// Validates and normalises the whole configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] describing the first rule violated.
pub fn validate(config: &mut Config) -> Result<(), ConfigError> {
    validate_uri("authURI", &config.auth_uri)?;
    validate_uri("FFSURI", &config.ffs_uri)?;

    if let Some(prometheus) = &config.prometheus {
        if prometheus.enabled && prometheus.port < 1024 {
            return Err(invalid(format!(
                "error: prometheus port {} is reserved, use a port in [1024, 65535]",
                prometheus.port
            )));
        }
    }

    if let Some(ip_api) = config.ip_api.as_mut() {
        if ip_api.enabled {
            if let Some(url) = ip_api.url.as_deref() {
                validate_uri("ipAPI url", url)?;
            }
            // The cache key and the write-through re-read both rely on the
            // upstream echoing the queried IP back.
            if !ip_api.fields.is_empty() && !ip_api.fields.split(',').any(|f| f.trim() == "query")
            {
                ip_api.fields.push_str(",query");
            }
            if let Some(cache) = &ip_api.local_cache {
                cache.success_age()?;
                cache.failed_age()?;
                cache.write_interval()?;
                if let Some(location) = cache.write_location.as_deref() {
                    ensure_writable(Path::new(location))?;
                }
            }
        }
    }

    if config.ffs_queries.is_empty() {
        return Err(invalid("error: no ffs queries provided"));
    }

    let mut names: HashSet<String> = HashSet::new();
    for query in &mut config.ffs_queries {
        validate_query(query)?;
        if !names.insert(query.name.clone()) {
            return Err(invalid(
                "error: duplicate query names provided, query names must be unique",
            ));
        }
    }

    Ok(())
}

fn validate_query(query: &mut FfsQueryConfig) -> Result<(), ConfigError> {
    if query.name.is_empty() {
        return Err(invalid("error: query name is empty"));
    }
    if query.name.len() > 100 {
        return Err(invalid(format!(
            "error: query name: {}, is greater than 100 characters",
            query.name
        )));
    }

    validate_username(&query.name, &query.username)?;
    if query.password.is_empty() {
        return Err(invalid(format!(
            "error: password in ffs query: {}, is blank",
            query.name
        )));
    }

    query.interval()?;
    query.time_gap()?;

    validate_template(query)?;

    if query.max_concurrent_queries < -1 || query.max_concurrent_queries == 0 {
        return Err(invalid(format!(
            "error: maxConcurrentQueries in ffs query: {}, must be positive or -1",
            query.name
        )));
    }

    // State files land in the output directory for every sink type.
    let location = match query.output_location.as_deref() {
        Some(location) if !location.is_empty() => PathBuf::from(location),
        _ => std::env::current_dir().map_err(|e| {
            invalid(format!(
                "error: unable to get working directory for ffs query: {}: {e}",
                query.name
            ))
        })?,
    };
    ensure_writable(&location)?;
    query.output_location = Some(location.to_string_lossy().into_owned());

    match query.output_type {
        OutputType::File => {}
        OutputType::Elastic => {
            let Some(elasticsearch) = &query.elasticsearch else {
                return Err(invalid(format!(
                    "error: elasticsearch output selected for ffs query: {}, but no \
                     elasticsearch config provided",
                    query.name
                )));
            };
            validate_elasticsearch(&query.name, elasticsearch)?;
        }
        OutputType::Logstash => {
            let Some(logstash) = &query.logstash else {
                return Err(invalid(format!(
                    "error: logstash output selected for ffs query: {}, but no logstash \
                     config provided",
                    query.name
                )));
            };
            if logstash.logstash_url.is_empty() {
                return Err(invalid(format!(
                    "error: no logstash URLs provided for ffs query: {}",
                    query.name
                )));
            }
            for url in &logstash.logstash_url {
                if !url.contains(':') {
                    return Err(invalid(format!(
                        "error: logstash URL {url:?} in ffs query: {}, must be host:port",
                        query.name
                    )));
                }
            }
        }
    }

    Ok(())
}

fn validate_username(query_name: &str, username: &str) -> Result<(), ConfigError> {
    if username.is_empty() {
        return Err(invalid(format!(
            "error: username in ffs query: {query_name}, is blank"
        )));
    }
    if username.len() > 254 {
        return Err(invalid(format!(
            "error: in ffs query: {query_name}, username is greater than 254 characters"
        )));
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(invalid(format!(
            "error: in ffs query: {query_name}, username is invalid, username must be a \
             valid email address"
        )));
    }
    Ok(())
}

fn validate_template(query: &FfsQueryConfig) -> Result<(), ConfigError> {
    let has = |operator: &str| {
        query
            .query
            .groups
            .iter()
            .flat_map(|group| &group.filters)
            .any(|filter| filter.operator == operator)
    };
    if query.query.groups.is_empty() || !has(ON_OR_AFTER) || !has(ON_OR_BEFORE) {
        return Err(invalid(format!(
            "error: query template in ffs query: {}, must contain ON_OR_AFTER and \
             ON_OR_BEFORE filters",
            query.name
        )));
    }

    let bound_err = |which: &str, e: chrono::ParseError| {
        invalid(format!(
            "error parsing {which} time for ffs query: {} {e}",
            query.name
        ))
    };
    query
        .query
        .on_or_after()
        .map_err(|e| bound_err("onOrAfter", e))?;
    query
        .query
        .on_or_before()
        .map_err(|e| bound_err("onOrBefore", e))?;
    Ok(())
}

fn validate_elasticsearch(
    query_name: &str,
    config: &ElasticsearchConfig,
) -> Result<(), ConfigError> {
    if config.elastic_url.is_empty() {
        return Err(invalid(format!(
            "error: no elasticsearch URLs provided for ffs query: {query_name}"
        )));
    }
    for url in &config.elastic_url {
        validate_uri("elasticURL", url)?;
    }

    if let Some(r#gen) = config.index_time_gen.as_deref() {
        r#gen.parse::<IndexTimeGen>().map_err(|_| {
            invalid(format!(
                "error: unknown indexTimeGen {gen:?} in ffs query: {query_name}, expected \
                 one of: timeNow, onOrBefore, eventTimestamp, insertionTimestamp",
                gen = r#gen
            ))
        })?;
    }

    validate_index_name(&config.index_name)?;

    // The length limit applies to the rendered name, suffix included.
    if let Some(pattern) = config.index_time_append.as_deref() {
        if !pattern.is_empty() {
            let sample = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH
                .format(pattern)
                .to_string();
            if config.index_name.len() + 1 + sample.len() > 255 {
                return Err(invalid(format!(
                    "error: index name plus time suffix cannot be longer than 255 \
                     characters for ffs query: {query_name}"
                )));
            }
        }
    }

    Ok(())
}

/// Enforces the Elasticsearch index naming rules.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the violated rule.
pub fn validate_index_name(index_name: &str) -> Result<(), ConfigError> {
    if index_name.is_empty() {
        return Err(invalid("error: index name cannot be empty"));
    }
    if index_name.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid(
            "error: index name cannot contain any capitalized letters",
        ));
    }
    if let Some(forbidden) = index_name.chars().find(|c| INDEX_FORBIDDEN.contains(c)) {
        return Err(invalid(format!(
            "error: index name cannot contain {forbidden:?}"
        )));
    }
    if index_name.starts_with(['_', '-', '+']) {
        return Err(invalid(
            "error: index name cannot start with \"_\", \"-\", or \"+\"",
        ));
    }
    if index_name == "." || index_name == ".." {
        return Err(invalid("error: index name cannot be \".\" or \"..\""));
    }
    if index_name.len() > 255 {
        return Err(invalid(
            "error: index name cannot be longer than 255 characters",
        ));
    }
    Ok(())
}

fn validate_uri(field: &str, uri: &str) -> Result<(), ConfigError> {
    if uri.is_empty() {
        return Err(invalid(format!("error: {field} cannot be blank")));
    }
    reqwest::Url::parse(uri)
        .map_err(|e| invalid(format!("error: bad {field} provided: {e}")))?;
    Ok(())
}

/// Verifies the directory exists and is writable by creating and removing a
/// probe file.
fn ensure_writable(dir: &Path) -> Result<(), ConfigError> {
    if !dir.is_dir() {
        return Err(invalid(format!(
            "path: {} doesn't exist or isn't a directory",
            dir.display()
        )));
    }
    let probe = dir.join(".ffs_puller_write_probe");
    std::fs::write(&probe, b"probe")
        .and_then(|()| std::fs::remove_file(&probe))
        .map_err(|e| {
            invalid(format!(
                "path: {} is not writable: {e}",
                dir.display()
            ))
        })
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
