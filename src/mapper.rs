//! Maps one domain onto its samples.
//!
//! Three sources are reconciled per domain: the configuration descriptor
//! (which devices exist), the runtime info call (state, memory, CPU) and the
//! per-device counter calls. Samples are emitted in a fixed order: state,
//! memory figures, vCPUs, CPU time, then each block device, then each
//! network interface.

use tracing::{debug, trace};

use crate::domain::{format_uuid, DomainDescriptor, DomainState};
use crate::error::Result;
use crate::hypervisor::{
    BlockStats, DomainHandle, InterfaceStats, Session, MEMORY_STATS_MAX, MEMORY_STAT_RSS,
};
use crate::metrics::{FamilyId, Sample, SampleSink};

const KIB: f64 = 1024.0;
const NANOS_PER_SEC: f64 = 1e9;

/// Activity of a domain, fetched at most once per domain.
struct Activity<'a, S: Session> {
    session: &'a S,
    domain: &'a S::Domain,
    cached: Option<bool>,
}

impl<'a, S: Session> Activity<'a, S> {
    fn new(session: &'a S, domain: &'a S::Domain) -> Self {
        Self {
            session,
            domain,
            cached: None,
        }
    }

    fn get(&mut self) -> Result<bool> {
        if let Some(active) = self.cached {
            return Ok(active);
        }
        let active = self.session.is_active(self.domain)?;
        self.cached = Some(active);
        Ok(active)
    }
}

fn labels(base: &[String], extra: &[&str]) -> Vec<String> {
    base.iter()
        .cloned()
        .chain(extra.iter().map(|s| s.to_string()))
        .collect()
}

/// Emits every sample for `domain`.
///
/// Errors are returned without domain context; the caller attaches it.
/// Samples already emitted stay in the sink when a later step fails.
pub fn collect_domain<S, K>(session: &S, domain: &S::Domain, sink: &mut K) -> Result<()>
where
    S: Session,
    K: SampleSink + ?Sized,
{
    let xml = session.domain_xml(domain)?;
    let descriptor = DomainDescriptor::parse(&xml)?;

    let name = domain.name();
    let uuid = format_uuid(domain.uuid());
    let base = [name.to_string(), uuid];

    let info = session.domain_info(domain)?;

    let mut activity = Activity::new(session, domain);

    // same as `virsh dommemstat`: actual, last_update, rss, ...
    // libvirt refuses memory stats for a domain that is not running
    let rss = if activity.get()? {
        session
            .memory_stats(domain, MEMORY_STATS_MAX)?
            .into_iter()
            .find(|s| s.tag == MEMORY_STAT_RSS)
            .map(|s| s.value)
    } else {
        None
    };

    // resolve before emitting so an unknown code leaves no partial domain
    let state = DomainState::from_code(info.state)?;

    debug!(
        "Domain {} ({}): state={} vcpus={} disks={} interfaces={}",
        name,
        base[1],
        state,
        info.vcpus,
        descriptor.disks.len(),
        descriptor.interfaces.len()
    );

    sink.emit(Sample::with_labels(
        FamilyId::DomainState,
        f64::from(state.code()),
        labels(&base, &[state.as_str()]),
    ));
    sink.emit(Sample::with_labels(
        FamilyId::MaximumMemoryBytes,
        info.max_memory as f64 * KIB,
        base.to_vec(),
    ));
    sink.emit(Sample::with_labels(
        FamilyId::MemoryUsageBytes,
        info.memory as f64 * KIB,
        base.to_vec(),
    ));
    if let Some(rss) = rss {
        sink.emit(Sample::with_labels(
            FamilyId::MemoryRssBytes,
            rss as f64 * KIB,
            base.to_vec(),
        ));
    }
    sink.emit(Sample::with_labels(
        FamilyId::VirtualCpus,
        f64::from(info.vcpus),
        base.to_vec(),
    ));
    sink.emit(Sample::with_labels(
        FamilyId::CpuTimeSecondsTotal,
        info.cpu_time as f64 / NANOS_PER_SEC,
        base.to_vec(),
    ));

    for disk in descriptor.collectible_disks() {
        let stats = if activity.get()? {
            session.block_stats(domain, &disk.target)?
        } else {
            BlockStats::default()
        };
        trace!("{} block {}: {:?}", name, disk.target, stats);

        let l = labels(&base, &[disk.source.as_str(), disk.target.as_str()]);
        sink.emit(Sample::with_labels(
            FamilyId::BlockReadBytes,
            stats.read_bytes as f64,
            l.clone(),
        ));
        sink.emit(Sample::with_labels(
            FamilyId::BlockReadRequests,
            stats.read_requests as f64,
            l.clone(),
        ));
        sink.emit(Sample::with_labels(
            FamilyId::BlockWriteBytes,
            stats.write_bytes as f64,
            l.clone(),
        ));
        sink.emit(Sample::with_labels(
            FamilyId::BlockWriteRequests,
            stats.write_requests as f64,
            l,
        ));
    }

    for iface in descriptor.collectible_interfaces() {
        let stats = if activity.get()? {
            session.interface_stats(domain, &iface.target)?
        } else {
            InterfaceStats::default()
        };
        trace!("{} interface {}: {:?}", name, iface.target, stats);

        let l = labels(&base, &[iface.source_bridge.as_str(), iface.target.as_str()]);
        let values = [
            (FamilyId::InterfaceReceiveBytes, stats.rx_bytes),
            (FamilyId::InterfaceReceivePackets, stats.rx_packets),
            (FamilyId::InterfaceReceiveErrors, stats.rx_errors),
            (FamilyId::InterfaceReceiveDrops, stats.rx_drops),
            (FamilyId::InterfaceTransmitBytes, stats.tx_bytes),
            (FamilyId::InterfaceTransmitPackets, stats.tx_packets),
            (FamilyId::InterfaceTransmitErrors, stats.tx_errors),
            (FamilyId::InterfaceTransmitDrops, stats.tx_drops),
        ];
        for (family, value) in values {
            sink.emit(Sample::with_labels(family, value as f64, l.clone()));
        }
    }

    Ok(())
}
