//! Integration tests for the scrape pipeline.
//!
//! These tests drive the mapper and the exporter through the fixture
//! hypervisor and check emitted samples, failure handling and session
//! release.

use libvirt_exporter::hypervisor::fixture::{
    ConnectFailure, Fixture, FixtureConnector, FixtureDisk, FixtureDomain, FixtureInterface,
};
use libvirt_exporter::hypervisor::{BlockStats, DomainInfo, InterfaceStats, MemoryStat};
use libvirt_exporter::mapper::collect_domain;
use libvirt_exporter::{Connector, FamilyId, LibvirtExporter, Sample, Session};
use prometheus::{Registry, TextEncoder};
use std::io::Write;

const UUID1: &str = "4dea22b3-1d52-d8f3-2616-782fbd6a0c5e";
const UUID2: &str = "0b7c2f1e-93aa-4c55-8d0e-2f6a1b9c3d47";
const IMAGE: &str = "/var/lib/libvirt/images/vm1.qcow2";

fn vm(name: &str, uuid: &str) -> FixtureDomain {
    let mut d = FixtureDomain::new(name, uuid);
    d.info = DomainInfo {
        state: 1,
        max_memory: 2_097_152,
        memory: 1_048_576,
        vcpus: 2,
        cpu_time: 5_000_000_000,
    };
    d.memory_stats = vec![
        MemoryStat {
            tag: 6,
            value: 1_048_576,
        },
        MemoryStat {
            tag: 7,
            value: 524_288,
        },
    ];
    d.disks.push(FixtureDisk {
        device: "disk".into(),
        source: IMAGE.into(),
        target: "vda".into(),
    });
    d.interfaces.push(FixtureInterface {
        bridge: "br0".into(),
        target: "vnet0".into(),
    });
    d.block_stats.insert(
        "vda".into(),
        BlockStats {
            read_requests: 10,
            read_bytes: 4096,
            write_requests: 5,
            write_bytes: 2048,
        },
    );
    d.interface_stats.insert(
        "vnet0".into(),
        InterfaceStats {
            rx_bytes: 1500,
            rx_packets: 3,
            tx_bytes: 900,
            tx_packets: 2,
            ..InterfaceStats::default()
        },
    );
    d
}

fn fixture(domains: Vec<FixtureDomain>) -> Fixture {
    Fixture {
        domains,
        ..Fixture::default()
    }
}

/// Collects one domain through a fresh session.
fn collect_one(domain: FixtureDomain) -> (Vec<Sample>, FixtureConnector) {
    let connector = FixtureConnector::new(fixture(vec![domain])).unwrap();
    let mut samples = Vec::new();
    {
        let session = connector.connect().unwrap();
        let domains = session.list_domains().unwrap();
        collect_domain(&session, &domains[0], &mut samples).unwrap();
    }
    (samples, connector)
}

fn exporter(fixture: Fixture) -> LibvirtExporter<FixtureConnector> {
    LibvirtExporter::new(FixtureConnector::new(fixture).unwrap(), "libvirt").unwrap()
}

fn find(samples: &[Sample], family: FamilyId) -> &Sample {
    samples
        .iter()
        .find(|s| s.family == family)
        .unwrap_or_else(|| panic!("no {:?} sample", family))
}

#[test]
fn test_active_domain_samples() {
    let (samples, _) = collect_one(vm("vm1", UUID1));

    let families: Vec<FamilyId> = samples.iter().map(|s| s.family).collect();
    assert_eq!(
        families,
        vec![
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
        ]
    );

    let state = find(&samples, FamilyId::DomainState);
    assert_eq!(state.value, 1.0);
    assert_eq!(state.labels, vec!["vm1", UUID1, "running"]);

    assert_eq!(
        find(&samples, FamilyId::MaximumMemoryBytes).value,
        2_147_483_648.0
    );
    assert_eq!(
        find(&samples, FamilyId::MemoryUsageBytes).value,
        1_073_741_824.0
    );
    assert_eq!(find(&samples, FamilyId::MemoryRssBytes).value, 536_870_912.0);
    assert_eq!(find(&samples, FamilyId::VirtualCpus).value, 2.0);
    assert_eq!(find(&samples, FamilyId::CpuTimeSecondsTotal).value, 5.0);

    let read = find(&samples, FamilyId::BlockReadBytes);
    assert_eq!(read.value, 4096.0);
    assert_eq!(read.labels, vec!["vm1", UUID1, IMAGE, "vda"]);
    assert_eq!(find(&samples, FamilyId::BlockWriteRequests).value, 5.0);

    let rx = find(&samples, FamilyId::InterfaceReceiveBytes);
    assert_eq!(rx.value, 1500.0);
    assert_eq!(rx.labels, vec!["vm1", UUID1, "br0", "vnet0"]);
    assert_eq!(find(&samples, FamilyId::InterfaceTransmitDrops).value, 0.0);
}

#[test]
fn test_missing_rss_stat_omits_rss_sample() {
    let mut d = vm("vm1", UUID1);
    d.memory_stats.retain(|s| s.tag != 7);
    let (samples, _) = collect_one(d);

    assert_eq!(samples.len(), 17);
    assert!(samples.iter().all(|s| s.family != FamilyId::MemoryRssBytes));
}

#[test]
fn test_cdrom_and_floppy_are_skipped() {
    let mut d = FixtureDomain::new("vm1", UUID1);
    d.disks.push(FixtureDisk {
        device: "cdrom".into(),
        source: "/isos/install.iso".into(),
        target: "hdc".into(),
    });
    d.disks.push(FixtureDisk {
        device: "floppy".into(),
        source: String::new(),
        target: "fda".into(),
    });
    let (samples, connector) = collect_one(d);

    assert!(samples
        .iter()
        .all(|s| s.family != FamilyId::BlockReadBytes && s.family != FamilyId::BlockReadRequests));
    let calls = connector.calls();
    assert_eq!(calls.block_stats, 0);
    // asked once, for the memory stats
    assert_eq!(calls.is_active, 1);
}

#[test]
fn test_interface_without_target_is_skipped() {
    let mut d = FixtureDomain::new("vm1", UUID1);
    d.interfaces.push(FixtureInterface {
        bridge: "br0".into(),
        target: String::new(),
    });
    let (samples, connector) = collect_one(d);

    assert!(samples
        .iter()
        .all(|s| s.family != FamilyId::InterfaceReceiveBytes));
    assert_eq!(connector.calls().interface_stats, 0);
}

#[test]
fn test_inactive_domain_reports_zero_counters() {
    let mut d = vm("vm1", UUID1);
    d.active = false;
    d.info.state = 5;
    let (samples, connector) = collect_one(d);

    // no rss: memory stats are not available for a stopped domain
    assert_eq!(samples.len(), 17);
    assert!(samples.iter().all(|s| s.family != FamilyId::MemoryRssBytes));
    assert_eq!(
        find(&samples, FamilyId::DomainState).labels,
        vec!["vm1", UUID1, "shutoff"]
    );
    assert_eq!(find(&samples, FamilyId::MaximumMemoryBytes).value, 2_147_483_648.0);
    assert_eq!(find(&samples, FamilyId::BlockReadBytes).value, 0.0);
    assert_eq!(find(&samples, FamilyId::InterfaceReceiveBytes).value, 0.0);

    let calls = connector.calls();
    assert_eq!(calls.is_active, 1);
    assert_eq!(calls.memory_stats, 0);
    assert_eq!(calls.block_stats, 0);
    assert_eq!(calls.interface_stats, 0);
}

#[test]
fn test_scrape_succeeds_with_stopped_domain() {
    let mut stopped = vm("vm2", UUID2);
    stopped.active = false;
    stopped.info.state = 5;

    let exporter = exporter(fixture(vec![vm("vm1", UUID1), stopped]));
    let report = exporter.scrape();

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.domains, Some(2));
    assert_eq!(report.samples.len(), 2 + 18 + 17 + 2);
    assert_eq!(report.samples.last().unwrap().value, 0.0);

    let rss: Vec<&str> = report
        .samples
        .iter()
        .filter(|s| s.family == FamilyId::MemoryRssBytes)
        .map(|s| s.labels[0].as_str())
        .collect();
    assert_eq!(rss, vec!["vm1"]);
    assert_eq!(exporter.connector().calls().memory_stats, 1);
}

#[test]
fn test_activity_checked_once_per_domain() {
    let mut d = vm("vm1", UUID1);
    d.disks.push(FixtureDisk {
        device: "disk".into(),
        source: "/var/lib/libvirt/images/data.raw".into(),
        target: "vdb".into(),
    });
    d.block_stats.insert("vdb".into(), BlockStats::default());
    d.interfaces.push(FixtureInterface {
        bridge: "br1".into(),
        target: "vnet1".into(),
    });
    d.interface_stats
        .insert("vnet1".into(), InterfaceStats::default());

    let exporter = exporter(fixture(vec![d, vm("vm2", UUID2)]));
    let report = exporter.scrape();
    assert!(report.is_success(), "{:?}", report.error);

    let calls = exporter.connector().calls();
    assert_eq!(calls.is_active, 2);
    assert_eq!(calls.block_stats, 3);
    assert_eq!(calls.interface_stats, 3);
}

#[test]
fn test_full_scrape_sample_layout() {
    let exporter = exporter(fixture(vec![vm("vm1", UUID1)]));
    let report = exporter.scrape();

    assert!(report.is_success());
    assert_eq!(report.domains, Some(1));
    assert_eq!(report.samples.len(), 2 + 18 + 2);

    assert_eq!(report.samples[0].family, FamilyId::Up);
    assert_eq!(report.samples[0].value, 1.0);
    assert_eq!(report.samples[1].family, FamilyId::DomainsTotal);
    assert_eq!(report.samples[1].value, 1.0);

    let n = report.samples.len();
    assert_eq!(report.samples[n - 2].family, FamilyId::ScrapeLatency);
    assert!(report.samples[n - 2].value >= 0.0);
    assert_eq!(report.samples[n - 1].family, FamilyId::ScrapeError);
    assert_eq!(report.samples[n - 1].value, 0.0);
}

#[test]
fn test_list_domains_failure_emits_no_domain_samples() {
    let mut f = fixture(vec![vm("vm1", UUID1)]);
    f.list_domains_failure = Some("rpc error".into());
    let exporter = exporter(f);
    let report = exporter.scrape();

    assert_eq!(report.error.as_ref().map(|e| e.kind()), Some("enumeration"));
    assert_eq!(report.domains, None);

    let families: Vec<FamilyId> = report.samples.iter().map(|s| s.family).collect();
    // the session opened, so `up` is still reported
    assert_eq!(
        families,
        vec![FamilyId::Up, FamilyId::ScrapeLatency, FamilyId::ScrapeError]
    );
    assert_eq!(report.samples[2].value, 1.0);

    let calls = exporter.connector().calls();
    assert_eq!(calls.connects, 1);
    assert_eq!(calls.releases, 1);
}

#[test]
fn test_domain_failure_aborts_scrape() {
    let mut broken = vm("vm2", UUID2);
    broken.failures.block_stats = Some("device busy".into());
    let third = vm("vm3", "9d1c6c2e-0f4b-4b8a-a8a5-5d3e6f7a8b9c");

    let exporter = exporter(fixture(vec![vm("vm1", UUID1), broken, third]));
    let report = exporter.scrape();

    let err = report.error.as_ref().unwrap();
    assert_eq!(err.kind(), "block_stats");
    let message = err.to_string();
    assert!(message.contains("vm2"), "{message}");
    assert!(message.contains("device busy"), "{message}");

    // vm1 is complete, vm3 never started
    assert!(report
        .samples
        .iter()
        .any(|s| s.family == FamilyId::InterfaceTransmitDrops && s.labels[0] == "vm1"));
    assert!(report
        .samples
        .iter()
        .all(|s| s.labels.first().map(String::as_str) != Some("vm3")));

    let last = report.samples.last().unwrap();
    assert_eq!(last.family, FamilyId::ScrapeError);
    assert_eq!(last.value, 1.0);

    let calls = exporter.connector().calls();
    assert_eq!(calls.releases, calls.connects);
}

#[test]
fn test_every_domain_call_failure_aborts_scrape() {
    type Inject = fn(&mut FixtureDomain);
    let cases: [(Inject, &str); 5] = [
        (|d| d.failures.xml = Some("no such domain".into()), "descriptor"),
        (|d| d.failures.info = Some("rpc timed out".into()), "info"),
        (|d| d.failures.memory_stats = Some("rpc timed out".into()), "stats"),
        (|d| d.failures.is_active = Some("rpc timed out".into()), "activity_check"),
        (|d| d.failures.interface_stats = Some("no such interface".into()), "interface_stats"),
    ];

    for (inject, kind) in cases {
        let mut broken = vm("vm2", UUID2);
        inject(&mut broken);
        let third = vm("vm3", "9d1c6c2e-0f4b-4b8a-a8a5-5d3e6f7a8b9c");

        let exporter = exporter(fixture(vec![vm("vm1", UUID1), broken, third]));
        let report = exporter.scrape();

        let err = report.error.as_ref().unwrap();
        assert_eq!(err.kind(), kind);
        assert!(err.to_string().contains("vm2"), "{kind}: {err}");
        assert_eq!(report.domains, None, "{kind}");

        // earlier domains stay complete, later ones never start
        let vm1 = report
            .samples
            .iter()
            .filter(|s| s.labels.first().map(String::as_str) == Some("vm1"))
            .count();
        assert_eq!(vm1, 18, "{kind}");
        assert!(
            report
                .samples
                .iter()
                .all(|s| s.labels.first().map(String::as_str) != Some("vm3")),
            "{kind}"
        );

        let last = report.samples.last().unwrap();
        assert_eq!(last.family, FamilyId::ScrapeError, "{kind}");
        assert_eq!(last.value, 1.0, "{kind}");

        let calls = exporter.connector().calls();
        assert_eq!(calls.connects, 1, "{kind}");
        assert_eq!(calls.releases, 1, "{kind}");
    }
}

#[test]
fn test_unknown_state_code_fails_scrape() {
    let mut d = vm("vm1", UUID1);
    d.info.state = 42;
    let exporter = exporter(fixture(vec![d]));
    let report = exporter.scrape();

    assert_eq!(
        report.error.as_ref().map(|e| e.kind()),
        Some("data_consistency")
    );
    assert!(report
        .samples
        .iter()
        .all(|s| s.labels.first().map(String::as_str) != Some("vm1")));
}

#[test]
fn test_connect_failures_release_nothing_twice() {
    for (failure, kind) in [
        (ConnectFailure::Transport, "transport"),
        (ConnectFailure::Session, "session"),
    ] {
        let mut f = fixture(vec![vm("vm1", UUID1)]);
        f.connect_failure = Some(failure);
        let exporter = exporter(f);
        let report = exporter.scrape();

        assert_eq!(report.error.as_ref().map(|e| e.kind()), Some(kind));
        assert_eq!(report.samples.len(), 2);
        assert!(report.samples.iter().all(|s| s.family != FamilyId::Up));

        let calls = exporter.connector().calls();
        assert_eq!(calls.releases, calls.connects);
        assert_eq!(calls.list_domains, 0);
    }
}

#[test]
fn test_scrapes_are_idempotent() {
    let exporter = exporter(fixture(vec![vm("vm1", UUID1), vm("vm2", UUID2)]));

    let without_latency = |samples: Vec<Sample>| -> Vec<Sample> {
        samples
            .into_iter()
            .filter(|s| s.family != FamilyId::ScrapeLatency)
            .collect()
    };

    let first = without_latency(exporter.scrape().samples);
    let second = without_latency(exporter.scrape().samples);
    assert_eq!(first, second);

    let calls = exporter.connector().calls();
    assert_eq!(calls.connects, 2);
    assert_eq!(calls.releases, 2);
}

#[test]
fn test_registry_exposition() {
    let registry = Registry::new();
    registry
        .register(Box::new(exporter(fixture(vec![vm("vm1", UUID1)]))))
        .unwrap();

    let text = TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap();

    assert!(text.contains("# TYPE libvirt_domain_info_cpu_time_seconds_total counter"));
    assert!(text.contains("# TYPE libvirt_domain_info_virtual_cpus gauge"));
    assert!(text.contains("libvirt_up 1"));
    assert!(text.contains("libvirt_scrape_error 0"));

    let read_line = text
        .lines()
        .find(|l| l.starts_with("libvirt_domain_block_read_bytes_total{"))
        .unwrap();
    assert!(read_line.contains("target_device=\"vda\""), "{read_line}");
    assert!(read_line.contains(&format!("source_file=\"{}\"", IMAGE)));
    assert!(read_line.ends_with(" 4096"), "{read_line}");
}

#[test]
fn test_custom_namespace() {
    let exporter =
        LibvirtExporter::new(FixtureConnector::new(Fixture::default()).unwrap(), "kvm").unwrap();
    let registry = Registry::new();
    registry.register(Box::new(exporter)).unwrap();

    let names: Vec<String> = registry
        .gather()
        .iter()
        .map(|mf| mf.get_name().to_string())
        .collect();
    assert!(names.contains(&"kvm_up".to_string()));
    assert!(names.contains(&"kvm_scrape_latency".to_string()));
}

#[test]
fn test_yaml_fixture_file_end_to_end() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    write!(
        file,
        r#"
domains:
  - name: web01
    uuid: {UUID1}
    info: {{ state: 1, max_memory: 1024, memory: 512, vcpus: 1, cpu_time: 1500000000 }}
    disks:
      - source: /var/lib/libvirt/images/web01.qcow2
        target: vda
    block_stats:
      vda: {{ read_bytes: 100 }}
"#
    )
    .unwrap();

    let connector = FixtureConnector::from_file(file.path()).unwrap();
    let exporter = LibvirtExporter::new(connector, "libvirt").unwrap();
    let report = exporter.scrape();

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.domains, Some(1));
    assert_eq!(find(&report.samples, FamilyId::CpuTimeSecondsTotal).value, 1.5);
    assert_eq!(find(&report.samples, FamilyId::BlockReadBytes).value, 100.0);
    assert_eq!(find(&report.samples, FamilyId::BlockWriteBytes).value, 0.0);
}
