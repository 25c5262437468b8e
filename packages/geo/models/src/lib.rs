#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! IP geolocation response types.
//!
//! [`Location`] mirrors the upstream geolocation API response. Callers never
//! receive a stored record wholesale: [`Location::project`] copies only a
//! requested subset of fields, mirroring the upstream `fields` query
//! parameter, so a cache hit and a fresh lookup carry the same shape.

use serde::{Deserialize, Serialize};

/// The field set used when a query does not request specific fields.
pub const DEFAULT_FIELDS: &str =
    "query,status,country,countryCode,region,regionName,city,zip,lat,lon,timezone,isp,org,as";

/// A geolocation lookup result.
///
/// `status` is `"success"` or `"fail"`; on failure `message` carries the
/// reason and the remaining fields are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continent: Option<String>,
    #[serde(rename = "continentCode", skip_serializing_if = "Option::is_none")]
    pub continent_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "countryCode", skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(rename = "regionName", skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
    pub as_number: Option<String>,
    #[serde(rename = "asname", skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosting: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// A `geo_point`-compatible coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    /// Returns a copy containing only the requested fields.
    ///
    /// `fields` is the upstream comma-separated allow-list; an empty string
    /// selects [`DEFAULT_FIELDS`]. Unknown field names are ignored.
    #[must_use]
    pub fn project(&self, fields: &str) -> Self {
        let fields = if fields.is_empty() {
            DEFAULT_FIELDS
        } else {
            fields
        };

        let mut projected = Self::default();
        for field in fields.split(',') {
            match field.trim() {
                "status" => projected.status.clone_from(&self.status),
                "message" => projected.message.clone_from(&self.message),
                "continent" => projected.continent.clone_from(&self.continent),
                "continentCode" => projected.continent_code.clone_from(&self.continent_code),
                "country" => projected.country.clone_from(&self.country),
                "countryCode" => projected.country_code.clone_from(&self.country_code),
                "region" => projected.region.clone_from(&self.region),
                "regionName" => projected.region_name.clone_from(&self.region_name),
                "city" => projected.city.clone_from(&self.city),
                "district" => projected.district.clone_from(&self.district),
                "zip" => projected.zip.clone_from(&self.zip),
                "lat" => projected.lat = self.lat,
                "lon" => projected.lon = self.lon,
                "timezone" => projected.timezone.clone_from(&self.timezone),
                "currency" => projected.currency.clone_from(&self.currency),
                "isp" => projected.isp.clone_from(&self.isp),
                "org" => projected.org.clone_from(&self.org),
                "as" => projected.as_number.clone_from(&self.as_number),
                "asname" => projected.as_name.clone_from(&self.as_name),
                "reverse" => projected.reverse.clone_from(&self.reverse),
                "mobile" => projected.mobile = self.mobile,
                "proxy" => projected.proxy = self.proxy,
                "hosting" => projected.hosting = self.hosting,
                "query" => projected.query.clone_from(&self.query),
                _ => {}
            }
        }
        projected
    }

    /// Coordinate pair for `geo_point` indexing, when both coordinates are
    /// present and non-zero.
    #[must_use]
    pub fn geo_point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => Some(GeoPoint { lat, lon }),
            _ => None,
        }
    }

    /// Whether the lookup succeeded upstream.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}
