//! In-memory hypervisor backed by a fixture file.
//!
//! A fixture describes domains, their runtime figures, attached devices and
//! counters, and can inject a failure into any hypervisor call. It is used
//! by the test suite and by `--test-data-file` to run the exporter without a
//! libvirt daemon.
//!
//! ```yaml
//! domains:
//!   - name: vm1
//!     uuid: 4dea22b3-1d52-d8f3-2616-782fbd6a0c5e
//!     info: { state: 1, max_memory: 2097152, memory: 1048576, vcpus: 2, cpu_time: 5000000000 }
//!     memory_stats: [{ tag: 7, value: 524288 }]
//!     disks: [{ device: disk, source: /var/lib/vm1.qcow2, target: vda }]
//!     interfaces: [{ bridge: br0, target: vnet0 }]
//!     block_stats: { vda: { read_bytes: 4096 } }
//!     interface_stats: { vnet0: { rx_bytes: 1500 } }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{
    BlockStats, Connector, DomainHandle, DomainInfo, InterfaceStats, MemoryStat, Session,
};
use crate::domain::{parse_uuid, DomainUuid};
use crate::error::{Result, ScrapeError};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML fixture: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON fixture: {0}")]
    Json(#[from] serde_json::Error),
    #[error("domain {domain}: {message}")]
    InvalidDomain { domain: String, message: String },
}

/// Which half of `connect()` should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectFailure {
    Transport,
    Session,
}

/// Error messages to return from individual calls on one domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainFailures {
    pub xml: Option<String>,
    pub info: Option<String>,
    pub memory_stats: Option<String>,
    pub is_active: Option<String>,
    pub block_stats: Option<String>,
    pub interface_stats: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureDisk {
    #[serde(default = "default_disk_device")]
    pub device: String,
    #[serde(default)]
    pub source: String,
    pub target: String,
}

fn default_disk_device() -> String {
    "disk".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureInterface {
    #[serde(default)]
    pub bridge: String,
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureDomain {
    pub name: String,
    pub uuid: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub info: DomainInfo,
    #[serde(default)]
    pub memory_stats: Vec<MemoryStat>,
    /// Raw descriptor. When absent one is generated from `disks` and `interfaces`.
    #[serde(default)]
    pub xml: Option<String>,
    #[serde(default)]
    pub disks: Vec<FixtureDisk>,
    #[serde(default)]
    pub interfaces: Vec<FixtureInterface>,
    #[serde(default)]
    pub block_stats: BTreeMap<String, BlockStats>,
    #[serde(default)]
    pub interface_stats: BTreeMap<String, InterfaceStats>,
    #[serde(default)]
    pub failures: DomainFailures,
}

fn default_active() -> bool {
    true
}

impl FixtureDomain {
    /// Minimal running domain with no devices.
    pub fn new(name: &str, uuid: &str) -> Self {
        Self {
            name: name.to_string(),
            uuid: uuid.to_string(),
            active: true,
            info: DomainInfo {
                state: 1,
                ..DomainInfo::default()
            },
            memory_stats: Vec::new(),
            xml: None,
            disks: Vec::new(),
            interfaces: Vec::new(),
            block_stats: BTreeMap::new(),
            interface_stats: BTreeMap::new(),
            failures: DomainFailures::default(),
        }
    }

    fn descriptor_xml(&self) -> String {
        if let Some(xml) = &self.xml {
            return xml.clone();
        }

        let mut out = String::new();
        writeln!(out, "<domain type='kvm'>").ok();
        writeln!(out, "  <name>{}</name>", escape(&self.name)).ok();
        writeln!(out, "  <uuid>{}</uuid>", escape(&self.uuid)).ok();
        writeln!(out, "  <devices>").ok();
        for disk in &self.disks {
            writeln!(out, "    <disk type='file' device='{}'>", escape(&disk.device)).ok();
            if !disk.source.is_empty() {
                writeln!(out, "      <source file='{}'/>", escape(&disk.source)).ok();
            }
            writeln!(out, "      <target dev='{}'/>", escape(&disk.target)).ok();
            writeln!(out, "    </disk>").ok();
        }
        for iface in &self.interfaces {
            writeln!(out, "    <interface type='bridge'>").ok();
            writeln!(out, "      <source bridge='{}'/>", escape(&iface.bridge)).ok();
            if !iface.target.is_empty() {
                writeln!(out, "      <target dev='{}'/>", escape(&iface.target)).ok();
            }
            writeln!(out, "    </interface>").ok();
        }
        writeln!(out, "  </devices>").ok();
        writeln!(out, "</domain>").ok();
        out
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
        .replace('"', "&quot;")
}

/// Complete fixture: domains plus connection-level failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub connect_failure: Option<ConnectFailure>,
    pub list_domains_failure: Option<String>,
    pub domains: Vec<FixtureDomain>,
}

impl Fixture {
    /// Loads a fixture from a `.json` file, or YAML for any other extension.
    pub fn from_file(path: &Path) -> Result<Self, FixtureError> {
        let content = fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Ok(serde_yaml::from_str(&content)?),
        }
    }
}

/// Per-call counters, shared by the connector and its sessions.
#[derive(Debug, Default)]
struct CallCounters {
    connects: AtomicUsize,
    releases: AtomicUsize,
    list_domains: AtomicUsize,
    is_active: AtomicUsize,
    memory_stats: AtomicUsize,
    block_stats: AtomicUsize,
    interface_stats: AtomicUsize,
}

/// Snapshot of [`FixtureConnector`] call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub connects: usize,
    pub releases: usize,
    pub list_domains: usize,
    pub is_active: usize,
    pub memory_stats: usize,
    pub block_stats: usize,
    pub interface_stats: usize,
}

pub struct FixtureConnector {
    fixture: Arc<Fixture>,
    uuids: Arc<Vec<DomainUuid>>,
    counters: Arc<CallCounters>,
}

impl FixtureConnector {
    pub fn new(fixture: Fixture) -> Result<Self, FixtureError> {
        let uuids = fixture
            .domains
            .iter()
            .map(|d| {
                parse_uuid(&d.uuid).map_err(|e| FixtureError::InvalidDomain {
                    domain: d.name.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            fixture: Arc::new(fixture),
            uuids: Arc::new(uuids),
            counters: Arc::new(CallCounters::default()),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, FixtureError> {
        Self::new(Fixture::from_file(path)?)
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            connects: c.connects.load(Ordering::Relaxed),
            releases: c.releases.load(Ordering::Relaxed),
            list_domains: c.list_domains.load(Ordering::Relaxed),
            is_active: c.is_active.load(Ordering::Relaxed),
            memory_stats: c.memory_stats.load(Ordering::Relaxed),
            block_stats: c.block_stats.load(Ordering::Relaxed),
            interface_stats: c.interface_stats.load(Ordering::Relaxed),
        }
    }
}

impl Connector for FixtureConnector {
    type Session = FixtureSession;

    fn connect(&self) -> Result<FixtureSession> {
        match self.fixture.connect_failure {
            Some(ConnectFailure::Transport) => {
                return Err(ScrapeError::Transport("fixture: connection refused".into()))
            }
            Some(ConnectFailure::Session) => {
                return Err(ScrapeError::Session("fixture: handshake rejected".into()))
            }
            None => {}
        }

        self.counters.connects.fetch_add(1, Ordering::Relaxed);
        debug!("Fixture session opened");

        Ok(FixtureSession {
            fixture: Arc::clone(&self.fixture),
            uuids: Arc::clone(&self.uuids),
            counters: Arc::clone(&self.counters),
        })
    }

    fn describe(&self) -> String {
        format!("fixture ({} domains)", self.fixture.domains.len())
    }
}

#[derive(Debug, Clone)]
pub struct FixtureDomainRef {
    index: usize,
    name: String,
    uuid: DomainUuid,
}

impl DomainHandle for FixtureDomainRef {
    fn name(&self) -> &str {
        &self.name
    }

    fn uuid(&self) -> &DomainUuid {
        &self.uuid
    }
}

pub struct FixtureSession {
    fixture: Arc<Fixture>,
    uuids: Arc<Vec<DomainUuid>>,
    counters: Arc<CallCounters>,
}

impl FixtureSession {
    fn domain(&self, handle: &FixtureDomainRef) -> &FixtureDomain {
        &self.fixture.domains[handle.index]
    }
}

/// Turns an injected failure message into the given error.
fn injected<F>(failure: &Option<String>, make: F) -> Result<()>
where
    F: FnOnce(String) -> ScrapeError,
{
    match failure {
        Some(message) => Err(make(message.clone())),
        None => Ok(()),
    }
}

impl Session for FixtureSession {
    type Domain = FixtureDomainRef;

    fn list_domains(&self) -> Result<Vec<FixtureDomainRef>> {
        self.counters.list_domains.fetch_add(1, Ordering::Relaxed);
        injected(&self.fixture.list_domains_failure, ScrapeError::Enumeration)?;

        Ok(self
            .fixture
            .domains
            .iter()
            .zip(self.uuids.iter())
            .enumerate()
            .map(|(index, (d, uuid))| FixtureDomainRef {
                index,
                name: d.name.clone(),
                uuid: *uuid,
            })
            .collect())
    }

    fn domain_xml(&self, domain: &FixtureDomainRef) -> Result<String> {
        let d = self.domain(domain);
        injected(&d.failures.xml, ScrapeError::Descriptor)?;
        Ok(d.descriptor_xml())
    }

    fn domain_info(&self, domain: &FixtureDomainRef) -> Result<DomainInfo> {
        let d = self.domain(domain);
        injected(&d.failures.info, ScrapeError::Info)?;
        Ok(d.info)
    }

    fn memory_stats(&self, domain: &FixtureDomainRef, max_stats: u32) -> Result<Vec<MemoryStat>> {
        self.counters.memory_stats.fetch_add(1, Ordering::Relaxed);
        let d = self.domain(domain);
        injected(&d.failures.memory_stats, ScrapeError::Stats)?;

        if !d.active {
            return Err(ScrapeError::Stats(
                "Requested operation is not valid: domain is not running".into(),
            ));
        }
        Ok(d.memory_stats
            .iter()
            .take(max_stats as usize)
            .copied()
            .collect())
    }

    fn is_active(&self, domain: &FixtureDomainRef) -> Result<bool> {
        self.counters.is_active.fetch_add(1, Ordering::Relaxed);
        let d = self.domain(domain);
        injected(&d.failures.is_active, ScrapeError::ActivityCheck)?;
        Ok(d.active)
    }

    fn block_stats(&self, domain: &FixtureDomainRef, target: &str) -> Result<BlockStats> {
        self.counters.block_stats.fetch_add(1, Ordering::Relaxed);
        let d = self.domain(domain);
        let block_error = |message: String| ScrapeError::BlockStats {
            device: target.to_string(),
            message,
        };
        injected(&d.failures.block_stats, block_error)?;

        if !d.active {
            return Err(block_error("domain is not running".into()));
        }
        d.block_stats
            .get(target)
            .copied()
            .ok_or_else(|| block_error("invalid path, no such disk".into()))
    }

    fn interface_stats(&self, domain: &FixtureDomainRef, target: &str) -> Result<InterfaceStats> {
        self.counters.interface_stats.fetch_add(1, Ordering::Relaxed);
        let d = self.domain(domain);
        let iface_error = |message: String| ScrapeError::InterfaceStats {
            device: target.to_string(),
            message,
        };
        injected(&d.failures.interface_stats, iface_error)?;

        if !d.active {
            return Err(iface_error("domain is not running".into()));
        }
        d.interface_stats
            .get(target)
            .copied()
            .ok_or_else(|| iface_error("invalid path, no such interface".into()))
    }

    fn disconnect(self) -> Result<()> {
        Ok(())
    }
}

impl Drop for FixtureSession {
    fn drop(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::Relaxed);
        debug!("Fixture session released");
    }
}
