//! Cache-then-fetch geolocation resolution.
//!
//! The resolver is the only geolocation entry point the enrichment pipeline
//! uses. It is deliberately infallible: an upstream failure is recorded in
//! the cache with `status = "fail"` for the failed-lookup lifetime and the
//! event is enriched with whatever the cache can offer.

use std::sync::Arc;

use ffs_puller_geo_models::Location;

use crate::cache::GeoCache;
use crate::client::IpLookup;
use crate::GeoOptions;

/// Shared geolocation service: one per process, used by every query engine.
pub struct GeoResolver {
    cache: Arc<GeoCache>,
    client: Box<dyn IpLookup>,
    options: GeoOptions,
}

impl GeoResolver {
    #[must_use]
    pub fn new(cache: Arc<GeoCache>, client: Box<dyn IpLookup>, options: GeoOptions) -> Self {
        Self {
            cache,
            client,
            options,
        }
    }

    /// The cache this resolver reads through.
    #[must_use]
    pub fn cache(&self) -> &Arc<GeoCache> {
        &self.cache
    }

    /// Resolves the location for a public IP, consulting the cache first.
    ///
    /// On a miss the upstream is queried once and the result — success or
    /// failure — is cached with the appropriate lifetime, then re-read
    /// through the cache so the caller sees the configured field projection
    /// either way. Returns `None` only when the upstream response carried no
    /// usable status at all.
    pub async fn resolve(&self, public_ip: &str) -> Option<Location> {
        let key = format!("{public_ip}{}", self.options.lang);
        let fields = self.options.fields.as_str();

        if let Some(location) = self.cache.get(&key, fields) {
            ffs_puller_metrics::increment_handler_requests("200");
            ffs_puller_metrics::increment_cache_hits();
            if self.options.debugging {
                log::debug!("Found {public_ip} in cache");
            }
            return Some(location);
        }

        ffs_puller_metrics::increment_requests_forwarded();
        ffs_puller_metrics::increment_queries_forwarded();

        match self
            .client
            .lookup(public_ip, fields, &self.options.lang)
            .await
        {
            Err(e) => {
                ffs_puller_metrics::increment_handler_requests("400");
                ffs_puller_metrics::increment_failed_requests();
                log::warn!("geolocation lookup failed for {public_ip}: {e}");

                let failed = Location {
                    status: Some("fail".to_string()),
                    message: Some(e.to_string()),
                    ..Location::default()
                };
                self.cache.put(&key, failed, self.options.failed_age);
                self.cache.get(&key, fields)
            }
            Ok(location) if location.is_success() => {
                ffs_puller_metrics::increment_handler_requests("200");
                if self.options.debugging {
                    log::debug!("Added {key} to cache");
                }
                self.cache.put(&key, location, self.options.success_age);
                self.cache.get(&key, fields)
            }
            Ok(location) if location.status.as_deref() == Some("fail") => {
                ffs_puller_metrics::increment_handler_requests("400");
                if self.options.debugging {
                    log::debug!("Failed lookup for {public_ip}");
                }
                self.cache.put(&key, location, self.options.failed_age);
                self.cache.get(&key, fields)
            }
            Ok(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::GeoError;

    struct ScriptedLookup {
        calls: Arc<AtomicUsize>,
        response: Result<Location, ()>,
    }

    #[async_trait]
    impl IpLookup for ScriptedLookup {
        async fn lookup(
            &self,
            _ip: &str,
            _fields: &str,
            _lang: &str,
        ) -> Result<Location, GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .clone()
                .map_err(|()| GeoError::Status { status: 500 })
        }
    }

    fn options() -> GeoOptions {
        GeoOptions {
            fields: "query,status,country,message".to_string(),
            lang: "en".to_string(),
            success_age: Duration::from_secs(3600),
            failed_age: Duration::from_secs(60),
            debugging: false,
        }
    }

    fn success_location() -> Location {
        Location {
            status: Some("success".to_string()),
            country: Some("Netherlands".to_string()),
            city: Some("Amsterdam".to_string()),
            query: Some("203.0.113.7".to_string()),
            ..Location::default()
        }
    }

    #[tokio::test]
    async fn second_resolve_hits_the_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = GeoResolver::new(
            Arc::new(GeoCache::new()),
            Box::new(ScriptedLookup {
                calls: Arc::clone(&calls),
                response: Ok(success_location()),
            }),
            options(),
        );

        let first = resolver.resolve("203.0.113.7").await.unwrap();
        let second = resolver.resolve("203.0.113.7").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.country, second.country);
        assert_eq!(first.country.as_deref(), Some("Netherlands"));
    }

    #[tokio::test]
    async fn resolve_projects_configured_fields() {
        let resolver = GeoResolver::new(
            Arc::new(GeoCache::new()),
            Box::new(ScriptedLookup {
                calls: Arc::new(AtomicUsize::new(0)),
                response: Ok(success_location()),
            }),
            options(),
        );

        let location = resolver.resolve("203.0.113.7").await.unwrap();
        assert_eq!(location.country.as_deref(), Some("Netherlands"));
        // Not in the configured field set, even though upstream returned it.
        assert!(location.city.is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_cached_as_fail() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = GeoResolver::new(
            Arc::new(GeoCache::new()),
            Box::new(ScriptedLookup {
                calls: Arc::clone(&calls),
                response: Err(()),
            }),
            options(),
        );

        let first = resolver.resolve("203.0.113.9").await.unwrap();
        assert_eq!(first.status.as_deref(), Some("fail"));
        assert!(first.message.is_some());

        // Second resolve is served from the failure record, no new call.
        let second = resolver.resolve("203.0.113.9").await.unwrap();
        assert_eq!(second.status.as_deref(), Some("fail"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn statusless_response_resolves_to_none() {
        let resolver = GeoResolver::new(
            Arc::new(GeoCache::new()),
            Box::new(ScriptedLookup {
                calls: Arc::new(AtomicUsize::new(0)),
                response: Ok(Location::default()),
            }),
            options(),
        );

        assert!(resolver.resolve("203.0.113.10").await.is_none());
    }

    #[tokio::test]
    async fn distinct_languages_are_distinct_cache_keys() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(GeoCache::new());

        let en = GeoResolver::new(
            Arc::clone(&cache),
            Box::new(ScriptedLookup {
                calls: Arc::clone(&calls),
                response: Ok(success_location()),
            }),
            options(),
        );
        let mut de_options = options();
        de_options.lang = "de".to_string();
        let de = GeoResolver::new(
            Arc::clone(&cache),
            Box::new(ScriptedLookup {
                calls: Arc::clone(&calls),
                response: Ok(success_location()),
            }),
            de_options,
        );

        en.resolve("203.0.113.7").await.unwrap();
        de.resolve("203.0.113.7").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
