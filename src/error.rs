//! Error taxonomy for a single scrape.
//!
//! Every failure inside a collection pass is a `ScrapeError`. Errors raised
//! while processing one domain are wrapped in [`ScrapeError::Domain`] so the
//! log line names the virtual machine that broke the scrape.

use thiserror::Error;

/// Result alias used throughout the scrape pipeline.
pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The hypervisor daemon could not be reached at all.
    #[error("transport to hypervisor failed: {0}")]
    Transport(String),

    /// The daemon was reachable but the management session was refused.
    #[error("failed to connect: {0}")]
    Session(String),

    #[error("failed to load domains: {0}")]
    Enumeration(String),

    #[error("failed to read domain descriptor: {0}")]
    Descriptor(String),

    #[error("failed to get domain info: {0}")]
    Info(String),

    #[error("memory stats failed: {0}")]
    Stats(String),

    #[error("failed to check domain activity: {0}")]
    ActivityCheck(String),

    #[error("failed to get block stats for {device}: {message}")]
    BlockStats { device: String, message: String },

    #[error("failed to get interface stats for {device}: {message}")]
    InterfaceStats { device: String, message: String },

    /// Data from the hypervisor contradicts a fixed table (e.g. unknown state code).
    #[error("inconsistent data: {0}")]
    DataConsistency(String),

    #[error("failed to collect domain {domain}: {source}")]
    Domain {
        domain: String,
        #[source]
        source: Box<ScrapeError>,
    },
}

impl ScrapeError {
    /// Attaches the name of the domain being processed.
    pub fn in_domain(self, domain: &str) -> Self {
        ScrapeError::Domain {
            domain: domain.to_string(),
            source: Box::new(self),
        }
    }

    /// Short, stable label for the error class (used in logs and /health).
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Transport(_) => "transport",
            ScrapeError::Session(_) => "session",
            ScrapeError::Enumeration(_) => "enumeration",
            ScrapeError::Descriptor(_) => "descriptor",
            ScrapeError::Info(_) => "info",
            ScrapeError::Stats(_) => "stats",
            ScrapeError::ActivityCheck(_) => "activity_check",
            ScrapeError::BlockStats { .. } => "block_stats",
            ScrapeError::InterfaceStats { .. } => "interface_stats",
            ScrapeError::DataConsistency(_) => "data_consistency",
            ScrapeError::Domain { source, .. } => source.kind(),
        }
    }
}

impl From<prometheus::Error> for ScrapeError {
    fn from(e: prometheus::Error) -> Self {
        ScrapeError::DataConsistency(e.to_string())
    }
}
