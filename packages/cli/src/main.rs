#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion daemon entry point.
//!
//! Reads and validates the configuration, builds the shared geolocation
//! service and the metrics endpoint, then runs one query engine per
//! configured query. The process exits 0 only when every engine reaches its
//! configured end time; any fatal engine error exits non-zero.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ffs_puller_config::{Config, FfsQueryConfig, IpApiConfig, OutputType};
use ffs_puller_engine::{QueryEngine, QuerySpec};
use ffs_puller_enrich::Enricher;
use ffs_puller_geo::cache::GeoCache;
use ffs_puller_geo::client::IpApiClient;
use ffs_puller_geo::resolver::GeoResolver;
use ffs_puller_geo::GeoOptions;
use ffs_puller_output::elastic::{ElasticSettings, ElasticSink, IndexTimeGen};
use ffs_puller_output::file::FileSink;
use ffs_puller_output::logstash::LogstashSink;
use ffs_puller_output::Dispatcher;
use ffs_puller_state::StateStore;
use tokio::task::JoinSet;

/// Cache snapshot file name inside the configured write location.
const CACHE_SNAPSHOT_FILE: &str = "ip_api_puller_cache.json";

/// Snapshot cadence when a write location is configured without one.
const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default lifetimes when the local cache block is omitted.
const DEFAULT_SUCCESS_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_FAILED_AGE: Duration = Duration::from_secs(30 * 60);

#[derive(Parser)]
#[command(name = "ffs-puller", version, about = "File-activity event ingestion daemon")]
struct Args {
    /// Configuration file location (.json).
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let args = Args::parse();
    let mut config = ffs_puller_config::read_config(&args.config)?;
    ffs_puller_config::validation::validate(&mut config)?;

    if let Some(prometheus) = &config.prometheus {
        if prometheus.enabled {
            let port = prometheus.port;
            // The server needs actix's runtime; run it on a blocking thread
            // so it does not nest inside the tokio runtime.
            tokio::task::spawn_blocking(move || {
                let result =
                    actix_web::rt::System::new().block_on(ffs_puller_server::serve(port));
                if let Err(e) = result {
                    log::error!("metrics server failed: {e}");
                    std::process::exit(1);
                }
            });
        }
    }

    let geo = build_geo_service(config.ip_api.as_ref(), config.debugging)?;

    let patterns: Arc<Vec<String>> = Arc::new(
        config.recoverable_error_patterns.clone().unwrap_or_else(|| {
            ffs_puller_client::DEFAULT_RECOVERABLE_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect()
        }),
    );

    let http = reqwest::Client::new();
    let mut engines = JoinSet::new();
    for query in &config.ffs_queries {
        let engine = build_engine(&config, query, geo.clone(), &patterns, &http)?;
        log::info!("starting ffs query: {}", query.name);
        engines.spawn(engine.run());
    }

    while let Some(joined) = engines.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("{e}");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }
    }

    snapshot_on_exit(config.ip_api.as_ref(), geo.as_deref());
    log::info!("all queries reached their configured end time");
    Ok(())
}

/// Builds the shared geolocation resolver, loading the snapshot and
/// starting the snapshot ticker when configured.
fn build_geo_service(
    ip_api: Option<&IpApiConfig>,
    debugging: bool,
) -> Result<Option<Arc<GeoResolver>>, Box<dyn std::error::Error>> {
    let Some(ip_api) = ip_api.filter(|c| c.enabled) else {
        return Ok(None);
    };

    let cache = Arc::new(GeoCache::new());

    let (success_age, failed_age) = match &ip_api.local_cache {
        Some(local) => (local.success_age()?, local.failed_age()?),
        None => (DEFAULT_SUCCESS_AGE, DEFAULT_FAILED_AGE),
    };

    if let Some(local) = ip_api
        .local_cache
        .as_ref()
        .filter(|local| local.write_location.is_some())
    {
        let location = local.write_location.as_deref().unwrap_or_default();
        let path = Path::new(location).join(CACHE_SNAPSHOT_FILE);
        if path.exists() {
            match cache.load(&path) {
                Ok(count) => log::info!("loaded {count} cached geolocation records"),
                Err(e) => log::warn!("could not load geolocation cache snapshot: {e}"),
            }
        }

        let write_interval = local
            .write_interval()?
            .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL);
        let snapshot_cache = Arc::clone(&cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(write_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                log::info!("Starting Cache Write");
                match snapshot_cache.snapshot(&path) {
                    Ok(count) => log::info!("Finished Cache Write ({count} records)"),
                    Err(e) => log::warn!("cache snapshot failed: {e}"),
                }
            }
        });
    }

    let client = IpApiClient::new(
        reqwest::Client::new(),
        ip_api.url.clone(),
        ip_api.api_key.clone(),
    );
    let options = GeoOptions {
        fields: ip_api.fields.clone(),
        lang: ip_api.lang.clone(),
        success_age,
        failed_age,
        debugging,
    };

    Ok(Some(Arc::new(GeoResolver::new(
        cache,
        Box::new(client),
        options,
    ))))
}

fn build_engine(
    config: &Config,
    query: &FfsQueryConfig,
    geo: Option<Arc<GeoResolver>>,
    patterns: &Arc<Vec<String>>,
    http: &reqwest::Client,
) -> Result<QueryEngine, Box<dyn std::error::Error>> {
    // Validation guarantees the location is set and writable.
    let location = query.output_location.clone().unwrap_or_default();

    let dispatcher = match query.output_type {
        OutputType::File => Dispatcher::File(FileSink::new(&location)),
        OutputType::Elastic => {
            let es = query
                .elasticsearch
                .as_ref()
                .ok_or("elasticsearch config missing after validation")?;
            let index_time_gen = match es.index_time_gen.as_deref() {
                Some(raw) => raw
                    .parse::<IndexTimeGen>()
                    .map_err(|_| format!("unknown indexTimeGen {raw:?}"))?,
                None => IndexTimeGen::default(),
            };
            Dispatcher::Elastic(ElasticSink::new(
                http.clone(),
                ElasticSettings {
                    urls: es.elastic_url.clone(),
                    username: es.basic_auth.as_ref().map(|auth| auth.user.clone()),
                    password: es.basic_auth.as_ref().map(|auth| auth.password.clone()),
                    index_name: es.index_name.clone(),
                    index_time_append: es.index_time_append.clone(),
                    index_time_gen,
                    number_of_shards: es.number_of_shards,
                    number_of_replicas: es.number_of_replicas,
                    best_compression: es.best_compression,
                    aliases: es.aliases.clone(),
                    use_custom_index_pattern: es.use_custom_index_pattern,
                },
            ))
        }
        OutputType::Logstash => {
            let logstash = query
                .logstash
                .as_ref()
                .ok_or("logstash config missing after validation")?;
            Dispatcher::Logstash(LogstashSink::new(logstash.logstash_url.clone()))
        }
    };

    let enricher = Enricher::new(geo, query.es_standardized, query.valid_ip_addresses_only);

    let spec = QuerySpec {
        name: query.name.clone(),
        username: query.username.clone(),
        password: query.password.clone(),
        interval: query.interval()?,
        time_gap: chrono::Duration::from_std(query.time_gap()?)?,
        query: query.query.clone(),
        max_concurrent: query.max_concurrent_queries,
    };

    Ok(QueryEngine::new(
        spec,
        config.auth_uri.clone(),
        config.ffs_uri.clone(),
        http.clone(),
        StateStore::new(&location, &query.name),
        Arc::new(enricher),
        Arc::new(dispatcher),
        Arc::clone(patterns),
    ))
}

/// Writes a final cache snapshot on graceful shutdown so a restart starts
/// warm.
fn snapshot_on_exit(ip_api: Option<&IpApiConfig>, geo: Option<&GeoResolver>) {
    let Some(location) = ip_api
        .filter(|c| c.enabled)
        .and_then(|c| c.local_cache.as_ref())
        .and_then(|local| local.write_location.as_deref())
    else {
        return;
    };
    let Some(geo) = geo else { return };

    let path = Path::new(location).join(CACHE_SNAPSHOT_FILE);
    match geo.cache().snapshot(&path) {
        Ok(count) => log::info!("final cache snapshot wrote {count} records"),
        Err(e) => log::warn!("final cache snapshot failed: {e}"),
    }
}
