#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Prometheus metrics endpoint.
//!
//! A minimal Actix-Web app exposing the process-global metric registry at
//! `GET /metrics` and a liveness probe at `GET /health`. Runs alongside the
//! query engines for the life of the process.

use actix_web::{web, App, HttpResponse, HttpServer};
use prometheus::Encoder as _;
use serde::Serialize;

#[derive(Serialize)]
struct Health {
    healthy: bool,
    version: String,
}

/// `GET /health`
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(Health {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /metrics`
async fn metrics() -> HttpResponse {
    let encoder = prometheus::TextEncoder::new();
    let families = prometheus::default_registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        log::error!("error encoding metrics: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

/// Serves the metrics endpoint on the given port until the process exits.
///
/// # Errors
///
/// Returns [`std::io::Error`] if the port cannot be bound.
pub async fn serve(port: u16) -> std::io::Result<()> {
    log::info!("Starting metrics server on 0.0.0.0:{port}");

    HttpServer::new(|| {
        App::new()
            .route("/metrics", web::get().to(metrics))
            .route("/health", web::get().to(health))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
