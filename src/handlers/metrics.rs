//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every request gathers the registry, which runs one full libvirt scrape.
//! Hypervisor calls block, so gathering happens on the blocking pool.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    GatherFailed,
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        let message = match self {
            MetricsError::GatherFailed => "Failed to gather metrics",
            MetricsError::EncodingFailed => "Failed to encode metrics",
        };
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Handler for the metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, MetricsError> {
    let start = Instant::now();
    debug!("Processing metrics request");

    state.health_stats.record_http_request();
    state.health_stats.record_metrics_endpoint_call();

    let gather_state = state.clone();
    let families = tokio::task::spawn_blocking(move || gather_state.registry.gather())
        .await
        .map_err(|e| {
            error!("Metrics gathering task failed: {}", e);
            MetricsError::GatherFailed
        })?;

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    let encoder = TextEncoder::new();

    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    debug!(
        "Metrics request completed: {} families, {} bytes, {:.3}ms",
        families.len(),
        buffer.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let body = String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)?;
    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        body,
    ))
}
