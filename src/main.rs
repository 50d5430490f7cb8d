//! libvirt-exporter
//!
//! Prometheus exporter for libvirt domain metrics with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod backend;
mod cli;
mod commands;
mod config;
mod handlers;
mod startup_checks;
mod state;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use libvirt_exporter::{Connector, HealthStats, LibvirtExporter};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal};
use tower_http::compression::CompressionLayer;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

use backend::{select_backend, Backend};
use cli::{Args, Commands, LogLevel};
use commands::{command_config, command_test};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{health_handler, metrics_handler, root_handler};
use state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let level = config.log_level();
    let max_level = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {:?}", level);
    Ok(())
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

fn build_exporter<C: Connector>(
    connector: C,
    config: &Config,
    health_stats: &Arc<HealthStats>,
) -> Result<LibvirtExporter<C>, Box<dyn std::error::Error>> {
    Ok(LibvirtExporter::new(connector, config.namespace())?.with_health(health_stats.clone()))
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        match command {
            Commands::Config {
                output,
                format,
                commented,
            } => return command_config(output.clone(), format.clone(), *commented),

            Commands::CheckRequirements => {
                let config = resolve_config(&args)?;
                println!("🔍 Checking Runtime Requirements");
                println!("================================\n");

                match startup_checks::validate_requirements(config.libvirt_socket().as_deref()) {
                    Ok(_) => {
                        println!("\n✅ All requirements met - ready for production!");
                        std::process::exit(0);
                    }
                    Err(e) => {
                        eprintln!("\n❌ Requirements check failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }

            Commands::Test {
                iterations,
                verbose,
            } => {
                let config = load_validated_config(&args)?;
                setup_logging(&config)?;
                let health_stats = Arc::new(HealthStats::new());

                return match select_backend(&config)? {
                    Backend::Fixture(c) => command_test(
                        &build_exporter(c, &config, &health_stats)?,
                        *iterations,
                        *verbose,
                    ),
                    #[cfg(feature = "libvirt")]
                    Backend::Libvirt(c) => command_test(
                        &build_exporter(c, &config, &health_stats)?,
                        *iterations,
                        *verbose,
                    ),
                };
            }
        }
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;
    setup_logging(&config)?;

    match select_backend(&config)? {
        Backend::Fixture(c) => serve(c, config).await,
        #[cfg(feature = "libvirt")]
        Backend::Libvirt(c) => {
            // Failures are logged; the daemon may come up later
            if let Err(e) = startup_checks::validate_requirements(config.libvirt_socket().as_deref())
            {
                tracing::warn!("Startup checks failed: {} - continuing", e);
            }
            serve(c, config).await
        }
    }
}

/// Builds the HTTP routes for the configured paths and features.
fn build_router(state: SharedState) -> Router {
    let config = state.config.clone();

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route(config.metrics_path(), get(metrics_handler));

    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state);

    if config.enable_gzip.unwrap_or(true) {
        app.layer(CompressionLayer::new())
    } else {
        app
    }
}

/// Registers the exporter and serves HTTP until a shutdown signal arrives.
async fn serve<C: Connector + 'static>(
    connector: C,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let bind_ip_str = config
        .bind
        .clone()
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let health_stats = Arc::new(HealthStats::new());
    let target = connector.describe();
    let exporter = build_exporter(connector, &config, &health_stats)?;

    let registry = Registry::new();
    registry.register(Box::new(exporter))?;

    let state: SharedState = Arc::new(AppState {
        registry,
        config: Arc::new(config.clone()),
        health_stats,
        target,
        start_time: Instant::now(),
    });

    // Setup graceful shutdown signal handlers
    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    };

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let app = build_router(state);

    if config.enable_tls.unwrap_or(false) {
        let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path)
        else {
            return Err("TLS is enabled but certificate or key path is missing".into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!(
            "libvirt-exporter listening on https://{}:{}{}",
            bind_ip_str,
            port,
            config.metrics_path()
        );

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal => {
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "libvirt-exporter listening on http://{}:{}{}",
            bind_ip_str,
            port,
            config.metrics_path()
        );

        let server = axum::serve(listener, app);

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal => {
                info!("Shutdown signal received, exiting...");
            }
        }
    }

    info!("libvirt-exporter stopped gracefully");
    Ok(())
}
