#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Event enrichment and reshaping.
//!
//! Each fetched event is optionally geolocated (through the shared resolver)
//! and reshaped into one of three output schemas:
//!
//! - **raw** — the upstream record with the location fields and a
//!   `geoPoint` alongside;
//! - **half** — the legacy flat snake_cased document with a `geo` sibling;
//! - **full** — the ECS-nested document with a `code_42` block holding every
//!   upstream field that has no ECS home.
//!
//! Enrichment is best effort: a failed geolocation degrades the record, it
//! never fails the window.

pub mod ecs;
pub mod flat;
pub mod raw;

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ffs_puller_event_models::FileEvent;
use ffs_puller_geo::resolver::GeoResolver;
use ffs_puller_geo_models::Location;
use serde::{Deserialize, Serialize};

/// Which output schema a query produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReshapeMode {
    /// Pass the upstream record through with geo siblings.
    #[default]
    None,
    /// Legacy flat snake_cased document.
    Half,
    /// ECS-nested document.
    Full,
}

impl FromStr for ReshapeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "half" => Ok(Self::Half),
            "full" | "ecs" => Ok(Self::Full),
            other => Err(format!(
                "unknown reshape mode {other:?}, expected one of: none, half, full, ecs"
            )),
        }
    }
}

impl std::fmt::Display for ReshapeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Half => "half",
            Self::Full => "full",
        })
    }
}

impl<'de> Deserialize<'de> for ReshapeMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An event in its final output shape, ready for any sink.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutputEvent {
    Raw(raw::RawEvent),
    Flat(flat::FlatEvent),
    Ecs(ecs::EcsEvent),
}

impl OutputEvent {
    /// The upstream event-observation timestamp, if present.
    #[must_use]
    pub fn event_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Raw(e) => e.event.event_timestamp,
            Self::Flat(e) => e.file_event.event_timestamp,
            Self::Ecs(e) => e.timestamp,
        }
    }

    /// The upstream insertion timestamp, if present.
    #[must_use]
    pub fn insertion_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Raw(e) => e.event.insertion_timestamp,
            Self::Flat(e) => e.file_event.insertion_timestamp,
            Self::Ecs(e) => e.event.as_ref().and_then(|b| b.ingested),
        }
    }
}

/// Per-query enrichment pipeline.
pub struct Enricher {
    geo: Option<Arc<GeoResolver>>,
    mode: ReshapeMode,
    valid_ips_only: bool,
}

impl Enricher {
    #[must_use]
    pub fn new(geo: Option<Arc<GeoResolver>>, mode: ReshapeMode, valid_ips_only: bool) -> Self {
        Self {
            geo,
            mode,
            valid_ips_only,
        }
    }

    /// Enriches and reshapes a fetched batch.
    pub async fn enrich(&self, events: Vec<FileEvent>) -> Vec<OutputEvent> {
        let mut output = Vec::with_capacity(events.len());
        for mut event in events {
            let location = self.locate(&event).await;

            if self.valid_ips_only {
                strip_zone_suffixes(&mut event);
            }

            output.push(match self.mode {
                ReshapeMode::None => OutputEvent::Raw(raw::reshape(event, location)),
                ReshapeMode::Half => OutputEvent::Flat(flat::reshape(event, location)),
                ReshapeMode::Full => OutputEvent::Ecs(ecs::reshape(event, location)),
            });
        }
        output
    }

    async fn locate(&self, event: &FileEvent) -> Option<Location> {
        let resolver = self.geo.as_ref()?;
        let ip = event.public_ip_address.as_deref()?;
        if ip.is_empty() {
            return None;
        }
        resolver.resolve(ip).await
    }
}

/// Drops `%zone` suffixes from scoped addresses (`fe80::1%eth0`), which some
/// sinks reject as invalid IPs.
fn strip_zone_suffixes(event: &mut FileEvent) {
    if let Some(addresses) = event.private_ip_addresses.as_mut() {
        for address in addresses {
            if let Some(bare) = address.split('%').next() {
                if bare.len() != address.len() {
                    *address = bare.to_string();
                }
            }
        }
    }
}
