//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("libvirt-exporter.yaml"),
    };

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# libvirt Exporter Configuration
# ==============================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9177                   # HTTP port
# metrics_path: "/metrics"     # Path under which to expose metrics
#
# Metric Naming
# -------------
# namespace: "libvirt"         # Prefix of every metric name
#
# Hypervisor Connection
# ---------------------
# libvirt_uri: "qemu:///system"                   # libvirt connection URI
# libvirt_socket: "/var/run/libvirt/libvirt-sock" # Probed before each session (local URIs only)
# connect_timeout_secs: 5                         # Timeout for the whole connect step
# test_data_file: null                            # YAML/JSON fixture instead of a daemon
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_gzip: true            # Gzip responses when the client accepts it
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false            # Enable HTTPS (default: false)
# tls_cert_path: null          # Path to TLS certificate (PEM format)
# tls_key_path: null           # Path to TLS private key (PEM format)
"#;

    format!("{comments}\n{yaml}")
}
