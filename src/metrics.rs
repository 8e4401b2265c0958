//! Prometheus exporter and the HTTP endpoint that serves it.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Install the global Prometheus recorder.
///
/// # Errors
///
/// Returns error if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Router serving `/metrics` and `/healthz`.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/healthz", get(|| async { StatusCode::OK }))
        .with_state(handle)
}

async fn serve_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}

/// Bind the metrics listener.
///
/// # Errors
///
/// Returns error if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Serving metrics");
    Ok(listener)
}

/// Serve the metrics router on `listener` until `token` is cancelled.
///
/// # Errors
///
/// Returns error if the server fails.
pub async fn serve(
    listener: TcpListener,
    handle: PrometheusHandle,
    token: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
}
