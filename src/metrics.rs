//! Prometheus metric families exported for libvirt domains.
//!
//! The family table (name, help, kind, label schema) is fixed when
//! [`MetricFamilies`] is constructed from a namespace and never changes
//! afterwards. A scrape emits [`Sample`]s into a [`SampleSink`]; the samples
//! are rendered into Prometheus families only when the exposition layer asks.

use prometheus::core::{Collector, Desc, Describer};
use prometheus::{proto, CounterVec, GaugeVec, Opts};
use std::collections::BTreeMap;

use crate::error::{Result, ScrapeError};

const NO_LABELS: &[&str] = &[];
const DOMAIN_LABELS: &[&str] = &["domain", "uuid"];
const STATE_LABELS: &[&str] = &["domain", "uuid", "state"];
const BLOCK_LABELS: &[&str] = &["domain", "uuid", "source_file", "target_device"];
const IFACE_LABELS: &[&str] = &["domain", "uuid", "source_bridge", "target_device"];

/// Value semantics of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Gauge,
    Counter,
}

/// Identity of every exported family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FamilyId {
    // exporter
    Up,
    DomainsTotal,
    ScrapeError,
    ScrapeLatency,

    // instance
    DomainState,
    MaximumMemoryBytes,
    MemoryUsageBytes,
    MemoryRssBytes,
    VirtualCpus,
    CpuTimeSecondsTotal,

    // block
    BlockReadBytes,
    BlockReadRequests,
    BlockWriteBytes,
    BlockWriteRequests,

    // interface
    InterfaceReceiveBytes,
    InterfaceReceivePackets,
    InterfaceReceiveErrors,
    InterfaceReceiveDrops,
    InterfaceTransmitBytes,
    InterfaceTransmitPackets,
    InterfaceTransmitErrors,
    InterfaceTransmitDrops,
}

struct FamilySpec {
    subsystem: &'static str,
    name: &'static str,
    help: &'static str,
    kind: ValueKind,
    labels: &'static [&'static str],
}

impl FamilyId {
    pub const ALL: [FamilyId; 22] = [
        FamilyId::Up,
        FamilyId::DomainsTotal,
        FamilyId::ScrapeError,
        FamilyId::ScrapeLatency,
        FamilyId::DomainState,
        FamilyId::MaximumMemoryBytes,
        FamilyId::MemoryUsageBytes,
        FamilyId::MemoryRssBytes,
        FamilyId::VirtualCpus,
        FamilyId::CpuTimeSecondsTotal,
        FamilyId::BlockReadBytes,
        FamilyId::BlockReadRequests,
        FamilyId::BlockWriteBytes,
        FamilyId::BlockWriteRequests,
        FamilyId::InterfaceReceiveBytes,
        FamilyId::InterfaceReceivePackets,
        FamilyId::InterfaceReceiveErrors,
        FamilyId::InterfaceReceiveDrops,
        FamilyId::InterfaceTransmitBytes,
        FamilyId::InterfaceTransmitPackets,
        FamilyId::InterfaceTransmitErrors,
        FamilyId::InterfaceTransmitDrops,
    ];

    fn spec(self) -> FamilySpec {
        use ValueKind::{Counter, Gauge};

        let (subsystem, name, help, kind, labels) = match self {
            FamilyId::Up => (
                "",
                "up",
                "Whether scraping libvirt's metrics was successful.",
                Gauge,
                NO_LABELS,
            ),
            FamilyId::DomainsTotal => ("", "domains_total", "Number of the domain", Gauge, NO_LABELS),
            FamilyId::ScrapeError => ("", "scrape_error", "Scrape status of libvirt", Gauge, NO_LABELS),
            FamilyId::ScrapeLatency => ("", "scrape_latency", "Scrape latency in second", Gauge, NO_LABELS),

            FamilyId::DomainState => ("", "domain_state", "Code of the domain state", Gauge, STATE_LABELS),
            FamilyId::MaximumMemoryBytes => (
                "domain_info",
                "maximum_memory_bytes",
                "Maximum allowed memory of the domain, in bytes.",
                Gauge,
                DOMAIN_LABELS,
            ),
            FamilyId::MemoryUsageBytes => (
                "domain_info",
                "memory_usage_bytes",
                "Memory usage of the domain, in bytes.",
                Gauge,
                DOMAIN_LABELS,
            ),
            FamilyId::MemoryRssBytes => (
                "domain_info",
                "memory_rss_bytes",
                "Resident set size of the domain, in bytes.",
                Gauge,
                DOMAIN_LABELS,
            ),
            FamilyId::VirtualCpus => (
                "domain_info",
                "virtual_cpus",
                "Number of virtual CPUs for the domain.",
                Gauge,
                DOMAIN_LABELS,
            ),
            FamilyId::CpuTimeSecondsTotal => (
                "domain_info",
                "cpu_time_seconds_total",
                "Amount of CPU time used by the domain, in seconds.",
                Counter,
                DOMAIN_LABELS,
            ),

            FamilyId::BlockReadBytes => (
                "domain_block",
                "read_bytes_total",
                "Number of bytes read from a block device, in bytes.",
                Counter,
                BLOCK_LABELS,
            ),
            FamilyId::BlockReadRequests => (
                "domain_block",
                "read_requests_total",
                "Number of read requests from a block device.",
                Counter,
                BLOCK_LABELS,
            ),
            FamilyId::BlockWriteBytes => (
                "domain_block",
                "write_bytes_total",
                "Number of bytes written to a block device, in bytes.",
                Counter,
                BLOCK_LABELS,
            ),
            FamilyId::BlockWriteRequests => (
                "domain_block",
                "write_requests_total",
                "Number of write requests to a block device.",
                Counter,
                BLOCK_LABELS,
            ),

            FamilyId::InterfaceReceiveBytes => (
                "domain_interface",
                "receive_bytes_total",
                "Number of bytes received on a network interface, in bytes.",
                Counter,
                IFACE_LABELS,
            ),
            FamilyId::InterfaceReceivePackets => (
                "domain_interface",
                "receive_packets_total",
                "Number of packets received on a network interface.",
                Counter,
                IFACE_LABELS,
            ),
            FamilyId::InterfaceReceiveErrors => (
                "domain_interface",
                "receive_errors_total",
                "Number of packet receive errors on a network interface.",
                Counter,
                IFACE_LABELS,
            ),
            FamilyId::InterfaceReceiveDrops => (
                "domain_interface",
                "receive_drops_total",
                "Number of packet receive drops on a network interface.",
                Counter,
                IFACE_LABELS,
            ),
            FamilyId::InterfaceTransmitBytes => (
                "domain_interface",
                "transmit_bytes_total",
                "Number of bytes transmitted on a network interface, in bytes.",
                Counter,
                IFACE_LABELS,
            ),
            FamilyId::InterfaceTransmitPackets => (
                "domain_interface",
                "transmit_packets_total",
                "Number of packets transmitted on a network interface.",
                Counter,
                IFACE_LABELS,
            ),
            FamilyId::InterfaceTransmitErrors => (
                "domain_interface",
                "transmit_errors_total",
                "Number of packet transmit errors on a network interface.",
                Counter,
                IFACE_LABELS,
            ),
            FamilyId::InterfaceTransmitDrops => (
                "domain_interface",
                "transmit_drops_total",
                "Number of packet transmit drops on a network interface.",
                Counter,
                IFACE_LABELS,
            ),
        };

        FamilySpec {
            subsystem,
            name,
            help,
            kind,
            labels,
        }
    }
}

/// One observation. Label values follow the family's label schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub family: FamilyId,
    pub value: f64,
    pub labels: Vec<String>,
}

impl Sample {
    pub fn new(family: FamilyId, value: f64) -> Self {
        Self {
            family,
            value,
            labels: Vec::new(),
        }
    }

    pub fn with_labels(family: FamilyId, value: f64, labels: Vec<String>) -> Self {
        Self {
            family,
            value,
            labels,
        }
    }
}

/// Ordered, append-only output channel of a scrape.
pub trait SampleSink {
    fn emit(&mut self, sample: Sample);
}

impl SampleSink for Vec<Sample> {
    fn emit(&mut self, sample: Sample) {
        self.push(sample);
    }
}

/// A family with its construction-time descriptor.
pub struct MetricFamily {
    pub id: FamilyId,
    pub fq_name: String,
    pub kind: ValueKind,
    pub labels: &'static [&'static str],
    opts: Opts,
    desc: Desc,
}

/// The complete, immutable family table for one namespace.
pub struct MetricFamilies {
    namespace: String,
    families: Vec<MetricFamily>,
}

impl MetricFamilies {
    /// Builds every family under `namespace` (e.g. `libvirt_domain_state`).
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let families = FamilyId::ALL
            .iter()
            .map(|&id| {
                let spec = id.spec();
                let opts = Opts::new(spec.name, spec.help)
                    .namespace(namespace)
                    .subsystem(spec.subsystem);
                let desc = opts
                    .clone()
                    .variable_labels(spec.labels.iter().map(|l| l.to_string()).collect())
                    .describe()?;

                Ok(MetricFamily {
                    id,
                    fq_name: opts.fq_name(),
                    kind: spec.kind,
                    labels: spec.labels,
                    opts,
                    desc,
                })
            })
            .collect::<Result<Vec<_>, prometheus::Error>>()?;

        Ok(Self {
            namespace: namespace.to_string(),
            families,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn get(&self, id: FamilyId) -> &MetricFamily {
        // ALL is declared in enum order, so the discriminant is the index
        &self.families[id as usize]
    }

    pub fn descs(&self) -> Vec<&Desc> {
        self.families.iter().map(|f| &f.desc).collect()
    }

    /// Converts one scrape's samples into Prometheus families.
    ///
    /// Vectors are built fresh for every call so nothing carries over
    /// between scrapes. Families without samples are omitted.
    pub fn render(&self, samples: &[Sample]) -> Result<Vec<proto::MetricFamily>> {
        let mut gauges: BTreeMap<FamilyId, GaugeVec> = BTreeMap::new();
        let mut counters: BTreeMap<FamilyId, CounterVec> = BTreeMap::new();

        for sample in samples {
            let family = self.get(sample.family);
            if sample.labels.len() != family.labels.len() {
                return Err(ScrapeError::DataConsistency(format!(
                    "{} expects {} labels, got {}",
                    family.fq_name,
                    family.labels.len(),
                    sample.labels.len()
                )));
            }
            let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();

            match family.kind {
                ValueKind::Gauge => {
                    if !gauges.contains_key(&sample.family) {
                        let vec = GaugeVec::new(family.opts.clone(), family.labels)?;
                        gauges.insert(sample.family, vec);
                    }
                    gauges[&sample.family]
                        .get_metric_with_label_values(&values)?
                        .set(sample.value);
                }
                ValueKind::Counter => {
                    if !counters.contains_key(&sample.family) {
                        let vec = CounterVec::new(family.opts.clone(), family.labels)?;
                        counters.insert(sample.family, vec);
                    }
                    counters[&sample.family]
                        .get_metric_with_label_values(&values)?
                        .inc_by(sample.value.max(0.0));
                }
            }
        }

        let mut out = Vec::new();
        for id in FamilyId::ALL {
            if let Some(vec) = gauges.get(&id) {
                out.extend(vec.collect());
            }
            if let Some(vec) = counters.get(&id) {
                out.extend(vec.collect());
            }
        }
        Ok(out)
    }
}
