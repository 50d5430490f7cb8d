//! Configuration management for libvirt-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9177;
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_NAMESPACE: &str = "libvirt";
pub const DEFAULT_LIBVIRT_URI: &str = "qemu:///system";
pub const DEFAULT_LIBVIRT_SOCKET: &str = "/var/run/libvirt/libvirt-sock";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Enhanced configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,
    #[serde(alias = "metrics-path", alias = "telemetry_path")]
    pub metrics_path: Option<String>,

    // Metric naming
    pub namespace: Option<String>,

    // Hypervisor connection
    #[serde(alias = "libvirt-uri")]
    pub libvirt_uri: Option<String>,
    #[serde(alias = "libvirt-socket")]
    pub libvirt_socket: Option<PathBuf>,
    #[serde(alias = "connect-timeout-secs")]
    pub connect_timeout_secs: Option<u64>,

    /// YAML/JSON fixture served instead of a libvirt daemon
    #[serde(alias = "test-data-file")]
    pub test_data_file: Option<PathBuf>,

    // Feature flags
    pub enable_health: Option<bool>,
    #[serde(alias = "enable-gzip")]
    pub enable_gzip: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            metrics_path: Some(DEFAULT_METRICS_PATH.to_string()),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            libvirt_uri: Some(DEFAULT_LIBVIRT_URI.to_string()),
            libvirt_socket: Some(PathBuf::from(DEFAULT_LIBVIRT_SOCKET)),
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            test_data_file: None,
            enable_health: Some(true),
            enable_gzip: Some(true),
            log_level: Some("info".into()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    pub fn metrics_path(&self) -> &str {
        self.metrics_path.as_deref().unwrap_or(DEFAULT_METRICS_PATH)
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn libvirt_uri(&self) -> &str {
        self.libvirt_uri.as_deref().unwrap_or(DEFAULT_LIBVIRT_URI)
    }

    /// Socket probed before every session. Remote URIs (those naming a
    /// host) skip the probe.
    pub fn libvirt_socket(&self) -> Option<PathBuf> {
        if is_remote_uri(self.libvirt_uri()) {
            return None;
        }
        Some(
            self.libvirt_socket
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBVIRT_SOCKET)),
        )
    }

    /// Effective log level; unknown names fall back to info.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(|s| LogLevel::from_str(s, true).ok())
            .unwrap_or(LogLevel::Info)
    }

    #[cfg_attr(not(feature = "libvirt"), allow(dead_code))]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }
}

/// `qemu+tcp://host/system` names a host; `qemu:///system` does not.
fn is_remote_uri(uri: &str) -> bool {
    uri.split_once("://")
        .map(|(_, rest)| !rest.starts_with('/'))
        .unwrap_or(false)
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    // Namespace must be usable as a metric name prefix
    let namespace = cfg.namespace();
    let valid_name = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$")?;
    if !namespace.is_empty() && !valid_name.is_match(namespace) {
        return Err(format!(
            "Invalid namespace '{}', expected [a-zA-Z_][a-zA-Z0-9_]*",
            namespace
        )
        .into());
    }

    let metrics_path = cfg.metrics_path();
    if !metrics_path.starts_with('/') || metrics_path == "/" {
        return Err(format!(
            "Invalid metrics_path '{}', must start with '/' and must not be '/'",
            metrics_path
        )
        .into());
    }

    if cfg.enable_health.unwrap_or(true) && metrics_path.trim_end_matches('/') == "/health" {
        return Err(format!(
            "Invalid metrics_path '{}', it collides with the /health endpoint \
             (disable health or pick another path)",
            metrics_path
        )
        .into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_str(level, true).is_err() {
            return Err(format!(
                "Invalid log_level '{}', expected off, error, warn, info, debug or trace",
                level
            )
            .into());
        }
    }

    if cfg.connect_timeout_secs == Some(0) {
        return Err("connect_timeout_secs must be greater than 0".into());
    }

    if let Some(path) = &cfg.test_data_file {
        if !path.exists() {
            return Err(format!("Test data file not found: {}", path.display()).into());
        }
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file(cert, "certificate")?;
                check_pem_file(key, "private key")?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(format!("TLS {} file is empty: {}", what, path).into()),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("TLS {} file not found: {}", what, path).into())
        }
        Err(e) => Err(format!("TLS {} file is not readable: {} ({})", what, path, e).into()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(path) = &args.metrics_path {
        config.metrics_path = Some(path.clone());
    }
    if let Some(namespace) = &args.namespace {
        config.namespace = Some(namespace.clone());
    }

    // Hypervisor connection
    if let Some(uri) = &args.libvirt_uri {
        config.libvirt_uri = Some(uri.clone());
    }
    if let Some(socket) = &args.libvirt_socket {
        config.libvirt_socket = Some(socket.clone());
    }
    if let Some(timeout) = args.connect_timeout {
        config.connect_timeout_secs = Some(timeout);
    }

    if let Some(level) = &args.log_level {
        if let Some(value) = level.to_possible_value() {
            config.log_level = Some(value.get_name().to_string());
        }
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_gzip {
        config.enable_gzip = Some(false);
    }

    // Test data file: CLI wins if provided
    if let Some(test_file) = &args.test_data_file {
        config.test_data_file = Some(test_file.clone());
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/libvirt-exporter/config.yaml",
            "/etc/libvirt-exporter/config.yml",
            "/etc/libvirt-exporter/config.json",
            "./libvirt-exporter.yaml",
            "./libvirt-exporter.yml",
            "./libvirt-exporter.json",
        ];

        match defaults.iter().find(|p| Path::new(p).exists()) {
            Some(found) => PathBuf::from(found),
            None => return Ok(Config::default()),
        }
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in requested format
pub fn render_config(
    config: &Config,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, &format)?);
    Ok(())
}
