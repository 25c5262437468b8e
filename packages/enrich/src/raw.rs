//! Passthrough output shape.
//!
//! The upstream record as-is, with the location fields flattened alongside
//! and a `geoPoint` pair for geo-aware sinks.

use ffs_puller_event_models::FileEvent;
use ffs_puller_geo_models::{GeoPoint, Location};
use serde::Serialize;

/// The upstream event plus optional geolocation siblings.
#[derive(Debug, Clone, Serialize)]
pub struct RawEvent {
    #[serde(flatten)]
    pub event: FileEvent,
    #[serde(flatten)]
    pub location: Option<Location>,
    #[serde(rename = "geoPoint", skip_serializing_if = "Option::is_none")]
    pub geo_point: Option<GeoPoint>,
}

/// Builds the passthrough shape.
#[must_use]
pub fn reshape(event: FileEvent, location: Option<Location>) -> RawEvent {
    let geo_point = location.as_ref().and_then(Location::geo_point);
    RawEvent {
        event,
        location,
        geo_point,
    }
}
