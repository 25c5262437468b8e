#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Process-wide Prometheus metrics.
//!
//! Thin adapter over the default registry. Per the engine contract every
//! function here is infallible: metrics are registered once at first touch
//! and registration failures (duplicate names) are programming errors, so
//! construction panics rather than returning a `Result` nobody can act on.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts};

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter opts");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("unique metric name");
    counter
}

fn gauge(name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).expect("valid gauge opts");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("unique metric name");
    gauge
}

static EVENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "crashplan_ffs_puller_events_total",
        "The total number of processed file events",
    )
});

static IN_PROGRESS_QUERIES: Lazy<IntGauge> = Lazy::new(|| {
    gauge(
        "crashplan_ffs_puller_in_progress_queries",
        "The current number of in progress query windows",
    )
});

static SUCCESSFUL_QUERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "ip_api_puller_successful_queries_total",
        "The total number of successful geolocation queries",
    )
});

static FAILED_QUERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "ip_api_puller_failed_queries_total",
        "The total number of failed geolocation queries",
    )
});

static CACHE_HITS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "ip_api_puller_cache_hits_total",
        "The total number of geolocation queries served from cache",
    )
});

static QUERIES_FORWARDED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "ip_api_puller_queries_forwarded_total",
        "The total number of geolocation queries forwarded upstream",
    )
});

static REQUESTS_FORWARDED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "ip_api_puller_requests_forwarded_total",
        "The total number of HTTP requests sent to the geolocation API",
    )
});

static FAILED_REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "ip_api_puller_failed_requests_total",
        "The total number of geolocation HTTP requests that failed",
    )
});

static QUERIES_CACHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "ip_api_puller_queries_cached_total",
        "The total number of geolocation results inserted into cache",
    )
});

static QUERIES_IN_CACHE: Lazy<IntGauge> = Lazy::new(|| {
    gauge(
        "ip_api_puller_queries_in_cache",
        "The current number of geolocation results held in cache",
    )
});

static HANDLER_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new(
            "ip_api_puller_handler_requests_total",
            "Geolocation lookups by status code",
        ),
        &["code"],
    )
    .expect("valid counter opts");
    prometheus::default_registry()
        .register(Box::new(vec.clone()))
        .expect("unique metric name");
    vec
});

pub fn increment_events_processed(number_of_events: usize) {
    EVENTS_TOTAL.inc_by(number_of_events as u64);
}

pub fn increase_in_progress_queries() {
    IN_PROGRESS_QUERIES.inc();
}

pub fn decrease_in_progress_queries() {
    IN_PROGRESS_QUERIES.dec();
}

pub fn increment_successful_queries() {
    SUCCESSFUL_QUERIES_TOTAL.inc();
}

pub fn increment_failed_queries() {
    FAILED_QUERIES_TOTAL.inc();
}

pub fn increment_cache_hits() {
    CACHE_HITS_TOTAL.inc();
}

pub fn increment_queries_forwarded() {
    QUERIES_FORWARDED_TOTAL.inc();
}

pub fn increment_requests_forwarded() {
    REQUESTS_FORWARDED_TOTAL.inc();
}

pub fn increment_failed_requests() {
    FAILED_REQUESTS_TOTAL.inc();
}

pub fn increment_queries_cached_total() {
    QUERIES_CACHED_TOTAL.inc();
}

pub fn increment_queries_cached_current() {
    QUERIES_IN_CACHE.inc();
}

pub fn decrease_queries_cached_current() {
    QUERIES_IN_CACHE.dec();
}

/// Records a geolocation lookup outcome by HTTP-style status code.
pub fn increment_handler_requests(code: &str) {
    HANDLER_REQUESTS_TOTAL.with_label_values(&[code]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let before = EVENTS_TOTAL.get();
        increment_events_processed(3);
        assert_eq!(EVENTS_TOTAL.get(), before + 3);
    }

    #[test]
    fn gauge_moves_both_ways() {
        let before = IN_PROGRESS_QUERIES.get();
        increase_in_progress_queries();
        increase_in_progress_queries();
        decrease_in_progress_queries();
        assert_eq!(IN_PROGRESS_QUERIES.get(), before + 1);
    }

    #[test]
    fn handler_requests_label_by_code() {
        increment_handler_requests("200");
        increment_handler_requests("400");
        assert!(HANDLER_REQUESTS_TOTAL.with_label_values(&["200"]).get() >= 1);
        assert!(HANDLER_REQUESTS_TOTAL.with_label_values(&["400"]).get() >= 1);
    }
}
