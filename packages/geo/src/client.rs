//! HTTP client for the IP geolocation API.
//!
//! Single-query lookups against an ip-api-compatible endpoint:
//! `GET {base}/json/{ip}?fields=...&lang=...`, with an optional `key`
//! parameter for the paid tier.

use async_trait::async_trait;
use ffs_puller_geo_models::Location;

use crate::GeoError;

/// Default public endpoint (free tier, HTTP only).
pub const DEFAULT_BASE_URL: &str = "http://ip-api.com";

/// A single-IP geolocation lookup.
///
/// The resolver talks to this trait so tests can substitute a scripted
/// implementation.
#[async_trait]
pub trait IpLookup: Send + Sync {
    /// Looks up one IP, requesting the given field set and language.
    async fn lookup(&self, ip: &str, fields: &str, lang: &str) -> Result<Location, GeoError>;
}

/// Reqwest-backed [`IpLookup`] implementation.
#[derive(Debug, Clone)]
pub struct IpApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl IpApiClient {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
        }
    }
}

#[async_trait]
impl IpLookup for IpApiClient {
    async fn lookup(&self, ip: &str, fields: &str, lang: &str) -> Result<Location, GeoError> {
        let url = format!("{}/json/{ip}", self.base_url.trim_end_matches('/'));

        let mut query: Vec<(&str, &str)> = Vec::with_capacity(3);
        if !fields.is_empty() {
            query.push(("fields", fields));
        }
        if !lang.is_empty() {
            query.push(("lang", lang));
        }
        if let Some(key) = self.api_key.as_deref() {
            query.push(("key", key));
        }

        let response = self.http.get(&url).query(&query).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(GeoError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response.json::<Location>().await?)
    }
}
