//! Server orchestration: loads config, builds the [`AppContext`], and runs
//! the REST API, the Detector polling loops, and the Scheduler worker pool
//! side by side until a shutdown signal arrives.
//!
//! Structured the way the teacher's `facilitator::run` wires up its axum
//! server (rustls install, `.env`, telemetry, router + CORS, graceful
//! shutdown via [`crate::sig_down::SigDown`]) — generalized here to also
//! spawn the two background loops this system has and the teacher's
//! pure request/response facilitator does not.

use axum::Router;
use axum::http::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use crate::app_context::AppContext;
use crate::config::Config;
use crate::sig_down::SigDown;
use crate::{detector, rest_api, worker};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .expect("failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let config = Config::load()?;
    let _telemetry = crate::telemetry::Telemetry::init(&config.application.log);

    let ctx = Arc::new(AppContext::init(config).await?);

    let sig_down = SigDown::try_new()?;
    let cancellation = sig_down.cancellation_token();

    let detector_handle = tokio::spawn(detector::run(ctx.clone(), cancellation.clone()));
    let worker_handle = tokio::spawn(worker::run(ctx.clone(), cancellation.clone()));

    let http_endpoints = Router::new()
        .merge(rest_api::routes().with_state(ctx.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(
        ctx.config.application.host.parse()?,
        ctx.config.application.port,
    );
    tracing::info!(mode = ?ctx.mode(), "starting validator node server at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("failed to bind to {addr}: {e}"))?;

    let axum_cancellation = cancellation.clone();
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(async move { axum_cancellation.cancelled().await })
        .await?;

    // The HTTP server only returns once `cancellation` has fired (or it
    // errored outright, in which case the background loops still need to
    // be told to stop before we return).
    cancellation.cancel();
    let _ = tokio::join!(detector_handle, worker_handle);

    Ok(())
}
