//! Hypervisor client capability consumed by the scrape pipeline.
//!
//! A [`Connector`] opens one [`Session`] per scrape. The session is owned by
//! the scrape, never shared, and released when dropped or explicitly
//! disconnected.
//!
//! Backends:
//! - [`fixture`]: in-memory hypervisor loaded from a YAML/JSON file
//! - `libvirt`: the libvirt daemon via the `virt` bindings (feature `libvirt`)

pub mod fixture;
#[cfg(feature = "libvirt")]
pub mod libvirt;

use serde::{Deserialize, Serialize};

use crate::domain::DomainUuid;
use crate::error::Result;

/// Tag of the resident set size entry in `virDomainMemoryStats`.
pub const MEMORY_STAT_RSS: u32 = 7;

/// Number of memory stat entries requested per domain.
pub const MEMORY_STATS_MAX: u32 = 8;

/// Runtime figures from `virDomainGetInfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainInfo {
    /// Raw lifecycle state code.
    pub state: u32,
    /// KiB
    pub max_memory: u64,
    /// KiB
    pub memory: u64,
    pub vcpus: u32,
    /// Nanoseconds
    pub cpu_time: u64,
}

/// One tagged entry of `virDomainMemoryStats`. Values are KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStat {
    pub tag: u32,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStats {
    pub read_requests: u64,
    pub read_bytes: u64,
    pub write_requests: u64,
    pub write_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceStats {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_drops: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_drops: u64,
}

/// Identity of an enumerated domain.
pub trait DomainHandle {
    fn name(&self) -> &str;
    fn uuid(&self) -> &DomainUuid;
}

/// An open management session. Every call may block on a round-trip to
/// the hypervisor daemon.
pub trait Session {
    type Domain: DomainHandle;

    /// Domains currently known to the hypervisor, in enumeration order.
    fn list_domains(&self) -> Result<Vec<Self::Domain>>;

    /// Raw configuration descriptor (domain XML).
    fn domain_xml(&self, domain: &Self::Domain) -> Result<String>;

    fn domain_info(&self, domain: &Self::Domain) -> Result<DomainInfo>;

    fn memory_stats(&self, domain: &Self::Domain, max_stats: u32) -> Result<Vec<MemoryStat>>;

    fn is_active(&self, domain: &Self::Domain) -> Result<bool>;

    fn block_stats(&self, domain: &Self::Domain, target: &str) -> Result<BlockStats>;

    fn interface_stats(&self, domain: &Self::Domain, target: &str) -> Result<InterfaceStats>;

    /// Releases the session. Dropping a session releases it as well; this
    /// variant reports failures.
    fn disconnect(self) -> Result<()>
    where
        Self: Sized;
}

/// Opens sessions to a hypervisor.
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Reaches the daemon and performs the session handshake.
    fn connect(&self) -> Result<Self::Session>;

    /// Human readable target, for logs.
    fn describe(&self) -> String;
}
