use std::future::ready;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body, http::Request, middleware::Next, response::IntoResponse, routing::get, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Install the global Prometheus recorder. Must run before any metric
/// handles are created; called once at startup.
pub fn setup_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// The scrape surface: `GET /metrics` rendering the recorder's registry.
/// Requests are bounded by a short timeout so a slow scraper cannot pin
/// a connection.
pub fn setup_metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(move || ready(handle.render())))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(5)))
        .layer(axum::middleware::from_fn(track_scrapes))
}

/// Serve the router until the token fires.
pub async fn serve(
    router: Router,
    address: SocketAddr,
    token: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!("metrics endpoint listening on {address}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
}

/// Accounts scrapes of the single `/metrics` route; with one route, a
/// status label is all the cardinality there is to track.
async fn track_scrapes(req: Request<Body>, next: Next) -> impl IntoResponse {
    let started = Instant::now();
    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!("metrics_scrapes_total", "status" => status.clone()).increment(1);
    metrics::histogram!("metrics_scrape_duration_seconds", "status" => status)
        .record(started.elapsed().as_secs_f64());

    response
}
