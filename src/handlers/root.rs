//! Root endpoint handler for the landing page.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let metrics_path = state.config.metrics_path();

    let uptime_secs = state.start_time.elapsed().as_secs();
    let uptime_str = format!(
        "{}h {}m {}s",
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60
    );

    let health_link = if state.config.enable_health.unwrap_or(true) {
        "\n    <p><a href=\"/health\">Health</a></p>"
    } else {
        ""
    };

    Html(format!(
        r#"<html>
<head><title>Libvirt Exporter</title></head>
<body>
    <h1>Libvirt Exporter</h1>
    <p>Version {version}, up {uptime_str}</p>
    <p>Target: {target}</p>
    <p><a href="{metrics_path}">Metrics</a></p>{health_link}
</body>
</html>
"#,
        target = html_escape(&state.target),
    ))
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
