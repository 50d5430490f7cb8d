//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers.

use libvirt_exporter::HealthStats;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    /// Holds the domain collector; gathering runs one scrape.
    pub registry: Registry,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    /// Human readable scrape target, shown on the landing page.
    pub target: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
