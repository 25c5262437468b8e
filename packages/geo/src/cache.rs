//! Shared TTL cache for geolocation results.
//!
//! Keys are opaque strings (`publicIp + lang`). Expired entries are never
//! returned and are removed when a lookup observes them; expiry is re-checked
//! under the write lock because a concurrent `put` may have refreshed the
//! entry between the read and the upgrade.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ffs_puller_geo_models::Location;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::GeoError;

/// A cached lookup with its expiry instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRecord {
    #[serde(rename = "expirationTime")]
    pub expires_at: DateTime<Utc>,
    pub location: Location,
}

/// Concurrent TTL map from lookup key to location.
#[derive(Debug, Default)]
pub struct GeoCache {
    records: RwLock<HashMap<String, CachedRecord>>,
}

impl GeoCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a key, projecting the stored location onto `fields`.
    ///
    /// Returns `None` for an absent or expired entry; an expired entry is
    /// removed as a side effect.
    #[must_use]
    pub fn get(&self, key: &str, fields: &str) -> Option<Location> {
        self.get_at(key, fields, Utc::now())
    }

    fn get_at(&self, key: &str, fields: &str, now: DateTime<Utc>) -> Option<Location> {
        {
            let records = self.records.read();
            let record = records.get(key)?;
            if now < record.expires_at {
                return Some(record.location.project(fields));
            }
        }

        // Observed as expired: evict, unless a concurrent put refreshed it.
        let mut records = self.records.write();
        if let Some(record) = records.get(key) {
            if now < record.expires_at {
                return Some(record.location.project(fields));
            }
            records.remove(key);
            ffs_puller_metrics::decrease_queries_cached_current();
        }
        None
    }

    /// Inserts or overwrites a record with the given lifetime.
    pub fn put(&self, key: &str, location: Location, ttl: Duration) {
        self.put_at(key, location, ttl, Utc::now());
    }

    fn put_at(&self, key: &str, location: Location, ttl: Duration, now: DateTime<Utc>) {
        let expires_at = now
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));
        let record = CachedRecord {
            expires_at,
            location,
        };

        let mut records = self.records.write();
        if records.insert(key.to_string(), record).is_none() {
            ffs_puller_metrics::increment_queries_cached_current();
        }
        ffs_puller_metrics::increment_queries_cached_total();
    }

    /// Number of live records (expired-but-unobserved entries included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Writes the cache to disk as JSON. Returns the number of records
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if encoding or the file write fails. Callers log
    /// and carry on; a lost snapshot only costs re-lookups after a restart.
    pub fn snapshot(&self, path: &Path) -> Result<usize, GeoError> {
        let records = self.records.read().clone();
        let json = serde_json::to_vec(&records)?;
        std::fs::write(path, json)?;
        Ok(records.len())
    }

    /// Replaces the cache contents from a snapshot file, dropping records
    /// that expired while the process was down. Returns the number of records
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the file cannot be read or parsed.
    pub fn load(&self, path: &Path) -> Result<usize, GeoError> {
        let bytes = std::fs::read(path)?;
        let mut loaded: HashMap<String, CachedRecord> = serde_json::from_slice(&bytes)?;

        let now = Utc::now();
        loaded.retain(|_, record| now < record.expires_at);

        let mut records = self.records.write();
        for _ in records.len()..loaded.len() {
            ffs_puller_metrics::increment_queries_cached_current();
        }
        for _ in loaded.len()..records.len() {
            ffs_puller_metrics::decrease_queries_cached_current();
        }
        *records = loaded;
        Ok(records.len())
    }
}
