//! libvirt Domain Metrics Exporter Library
//!
//! Scrapes per-domain runtime statistics from a libvirt hypervisor and
//! exposes them as Prometheus metric families. Each scrape opens a fresh
//! hypervisor session, enumerates domains, maps every domain onto samples
//! and releases the session again.
//!
//! # Usage
//!
//! ```rust
//! use libvirt_exporter::hypervisor::fixture::{Fixture, FixtureConnector, FixtureDomain};
//! use libvirt_exporter::LibvirtExporter;
//!
//! let mut fixture = Fixture::default();
//! fixture
//!     .domains
//!     .push(FixtureDomain::new("vm1", "4dea22b3-1d52-d8f3-2616-782fbd6a0c5e"));
//!
//! let connector = FixtureConnector::new(fixture).unwrap();
//! let exporter = LibvirtExporter::new(connector, "libvirt").unwrap();
//!
//! let report = exporter.scrape();
//! assert!(report.is_success());
//! ```
//!
//! # Feature Flags
//!
//! - `libvirt`: enables the libvirt daemon backend (requires libvirt headers)

pub mod domain;
pub mod error;
pub mod exporter;
pub mod health_stats;
pub mod hypervisor;
pub mod mapper;
pub mod metrics;

// Re-export main types for convenience
pub use error::{Result, ScrapeError};
pub use exporter::{LibvirtExporter, ScrapeReport};
pub use health_stats::HealthStats;
pub use hypervisor::{Connector, Session};
pub use metrics::{FamilyId, MetricFamilies, Sample, SampleSink};
