//! Scrape orchestration and the Prometheus collector.
//!
//! Every scrape opens a fresh session, enumerates domains, maps each of them
//! and releases the session again. Nothing survives between scrapes. The
//! first failure aborts the scrape; `scrape_error` is then set and is the
//! authoritative signal that domain samples are incomplete.

use prometheus::core::{Collector, Desc};
use prometheus::proto;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::error::{Result, ScrapeError};
use crate::health_stats::HealthStats;
use crate::hypervisor::{Connector, DomainHandle, Session};
use crate::mapper::collect_domain;
use crate::metrics::{FamilyId, MetricFamilies, Sample, SampleSink};

/// Result of one scrape.
#[derive(Debug)]
pub struct ScrapeReport {
    /// Every emitted sample; `scrape_latency` and `scrape_error` are last.
    pub samples: Vec<Sample>,
    pub error: Option<ScrapeError>,
    pub duration: Duration,
    /// Number of enumerated domains, if enumeration succeeded.
    pub domains: Option<usize>,
}

impl ScrapeReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct LibvirtExporter<C: Connector> {
    connector: C,
    families: MetricFamilies,
    health: Arc<HealthStats>,
}

impl<C: Connector> LibvirtExporter<C> {
    pub fn new(connector: C, namespace: &str) -> std::result::Result<Self, prometheus::Error> {
        Ok(Self {
            connector,
            families: MetricFamilies::new(namespace)?,
            health: Arc::new(HealthStats::new()),
        })
    }

    /// Shares health statistics with the HTTP layer.
    pub fn with_health(mut self, health: Arc<HealthStats>) -> Self {
        self.health = health;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn families(&self) -> &MetricFamilies {
        &self.families
    }

    pub fn health(&self) -> &Arc<HealthStats> {
        &self.health
    }

    /// Runs one scrape, writing samples into `sink`.
    ///
    /// `scrape_latency` and `scrape_error` are always emitted, as the final
    /// two samples, whatever happened before.
    pub fn scrape_into<K>(&self, sink: &mut K) -> (Result<usize>, Duration)
    where
        K: SampleSink + ?Sized,
    {
        let start = Instant::now();
        let outcome = self.collect_all(sink);
        let duration = start.elapsed();

        sink.emit(Sample::new(FamilyId::ScrapeLatency, duration.as_secs_f64()));
        sink.emit(Sample::new(
            FamilyId::ScrapeError,
            if outcome.is_ok() { 0.0 } else { 1.0 },
        ));

        (outcome, duration)
    }

    /// Runs one scrape into a fresh buffer and records its outcome.
    pub fn scrape(&self) -> ScrapeReport {
        let mut samples = Vec::new();
        let (outcome, duration) = self.scrape_into(&mut samples);

        let (domains, error) = match outcome {
            Ok(count) => {
                debug!(
                    "Scrape of {} finished: {} domains, {} samples in {:.3}s",
                    self.connector.describe(),
                    count,
                    samples.len(),
                    duration.as_secs_f64()
                );
                (Some(count), None)
            }
            Err(e) => {
                error!("failed to collect metrics: {}", e);
                (None, Some(e))
            }
        };

        self.health
            .record_scrape(duration, domains, error.as_ref().map(|e| e.kind()));

        ScrapeReport {
            samples,
            error,
            duration,
            domains,
        }
    }

    fn collect_all<K>(&self, sink: &mut K) -> Result<usize>
    where
        K: SampleSink + ?Sized,
    {
        let session = self.connector.connect()?;
        sink.emit(Sample::new(FamilyId::Up, 1.0));

        let domains = session.list_domains()?;
        sink.emit(Sample::new(FamilyId::DomainsTotal, domains.len() as f64));

        for domain in &domains {
            collect_domain(&session, domain, sink).map_err(|e| e.in_domain(domain.name()))?;
        }

        let count = domains.len();
        drop(domains);
        if let Err(e) = session.disconnect() {
            warn!("{}", e);
        }

        Ok(count)
    }
}

impl<C: Connector> Collector for LibvirtExporter<C> {
    fn desc(&self) -> Vec<&Desc> {
        self.families.descs()
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let report = self.scrape();
        match self.families.render(&report.samples) {
            Ok(families) => families,
            Err(e) => {
                error!("failed to render samples: {}", e);
                Vec::new()
            }
        }
    }
}
