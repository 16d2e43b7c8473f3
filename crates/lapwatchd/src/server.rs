//! HTTP exposition endpoint for lapwatchd

use crate::metrics::MetricsRegistry;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub fn router(metrics: MetricsRegistry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics)
        .layer(TraceLayer::new_for_http())
}

async fn metrics_handler(State(metrics): State<MetricsRegistry>) -> impl IntoResponse {
    match metrics.export() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        ),
        Err(e) => {
            error!("  Metrics export failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                e.to_string(),
            )
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Bind the listen address
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))
}

/// Serve the exposition endpoint until the listener fails
pub async fn run(listener: TcpListener, metrics: MetricsRegistry) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("  Serving metrics on http://{}/metrics", addr);
    axum::serve(listener, router(metrics)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{GaugeSink, Metric};

    #[tokio::test]
    async fn test_metrics_endpoint_serves_gauges() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.set(Metric::Position, "VER", 1.0);

        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run(listener, metrics));

        let response = reqwest::get(format!("http://{}/metrics", addr)).await.unwrap();
        assert!(response.status().is_success());
        let content_type = response.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));

        let body = response.text().await.unwrap();
        assert!(body.contains("position{driver=\"VER\"} 1"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run(listener, MetricsRegistry::new().unwrap()));

        let body = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }
}
