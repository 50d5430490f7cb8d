//! CLI arguments and subcommands for libvirt-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "libvirt-exporter",
    about = "Prometheus exporter for libvirt domain metrics",
    long_about = "Prometheus exporter for libvirt domain metrics.\n\n\
                  Connects to the libvirt daemon on every scrape and exports per-domain \
                  state, memory, vCPU, CPU time, block device and network interface \
                  statistics.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Path under which to expose metrics
    #[arg(long)]
    pub metrics_path: Option<String>,

    /// libvirt connection URI
    #[arg(long)]
    pub libvirt_uri: Option<String>,

    /// libvirt daemon unix socket, probed before each session
    #[arg(long)]
    pub libvirt_socket: Option<PathBuf>,

    /// Prefix of every exported metric name
    #[arg(long)]
    pub namespace: Option<String>,

    /// Timeout in seconds for reaching the libvirt daemon
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Log level (default: config file value, then info)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable gzip compression of responses
    #[arg(long)]
    pub disable_gzip: bool,

    /// Path to a YAML/JSON fixture served instead of a libvirt daemon
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run scrapes once and print the samples
    Test {
        /// Number of test iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Print every sample, not only the summary
        #[arg(long)]
        verbose: bool,
    },

    /// Check runtime requirements and permissions
    CheckRequirements,
}
