//! Health statistics for the exporter.
//!
//! Tracks scrape outcomes, durations and domain counts across the process
//! lifetime. Rendered as a plain-text table by the `/health` endpoint.

use chrono::{DateTime, Local};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (current, average, max, min, count)
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Outcome of the most recent scrape.
#[derive(Debug, Clone)]
pub struct LastScrape {
    pub at: DateTime<Local>,
    pub success: bool,
    /// Error kind, e.g. `transport` or `block_stats`.
    pub error_kind: Option<&'static str>,
}

/// Scrape and HTTP statistics shared between the collector and handlers.
pub struct HealthStats {
    pub scrape_duration_seconds: Stat,
    pub domains_scraped: Stat,
    pub total_scrapes: AtomicU64,
    pub failed_scrapes: AtomicU64,
    pub metrics_endpoint_calls: AtomicU64,
    pub http_requests: AtomicU64,
    pub start_time: Instant,
    pub last_scrape: StdRwLock<Option<LastScrape>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            scrape_duration_seconds: Stat::default(),
            domains_scraped: Stat::default(),
            total_scrapes: AtomicU64::new(0),
            failed_scrapes: AtomicU64::new(0),
            metrics_endpoint_calls: AtomicU64::new(0),
            http_requests: AtomicU64::new(0),
            start_time: Instant::now(),
            last_scrape: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished scrape. `domains` is `None` when enumeration
    /// never completed.
    pub fn record_scrape(
        &self,
        duration: Duration,
        domains: Option<usize>,
        error_kind: Option<&'static str>,
    ) {
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);
        if error_kind.is_some() {
            self.failed_scrapes.fetch_add(1, Ordering::Relaxed);
        }
        self.scrape_duration_seconds
            .add_sample(duration.as_secs_f64());
        if let Some(count) = domains {
            self.domains_scraped.add_sample(count as f64);
        }
        if let Ok(mut guard) = self.last_scrape.write() {
            *guard = Some(LastScrape {
                at: Local::now(),
                success: error_kind.is_none(),
                error_kind,
            });
        }
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_scrape(&self) -> Option<LastScrape> {
        self.last_scrape.read().ok().and_then(|g| g.clone())
    }

    /// True when no scrape ran yet or the last one succeeded.
    pub fn is_healthy(&self) -> bool {
        self.last_scrape().map_or(true, |s| s.success)
    }

    pub fn get_scrape_success_rate(&self) -> f64 {
        let total = self.total_scrapes.load(Ordering::Relaxed);
        let failed = self.failed_scrapes.load(Ordering::Relaxed);
        if total == 0 {
            100.0
        } else {
            ((total - failed) as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let (sd_cur, sd_avg, sd_max, sd_min, _) = self.scrape_duration_seconds.snapshot();
        let (dc_cur, dc_avg, dc_max, dc_min, _) = self.domains_scraped.snapshot();
        let total = self.total_scrapes.load(Ordering::Relaxed);
        let failed = self.failed_scrapes.load(Ordering::Relaxed);
        let metrics_calls = self.metrics_endpoint_calls.load(Ordering::Relaxed);
        let http_requests = self.http_requests.load(Ordering::Relaxed);

        let (last_at, last_result) = match self.last_scrape() {
            Some(last) => (
                last.at.format("%Y-%m-%d %H:%M:%S").to_string(),
                last.error_kind.unwrap_or("ok").to_string(),
            ),
            None => ("N/A".to_string(), "N/A".to_string()),
        };

        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "SCRAPE PERFORMANCE").ok();
        writeln!(out, "------------------").ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "scrape_duration_seconds",
            format!("{:.3}", sd_cur),
            format!("{:.3}", sd_avg),
            format!("{:.3}", sd_max),
            format!("{:.3}", sd_min),
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "domains",
            format!("{:.0}", dc_cur),
            format!("{:.1}", dc_avg),
            format!("{:.0}", dc_max),
            format!("{:.0}", dc_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "COUNTERS").ok();
        writeln!(out, "--------").ok();
        writeln!(out, "{:left$} | {}", "total_scrapes", total, left = left_col).ok();
        writeln!(out, "{:left$} | {}", "failed_scrapes", failed, left = left_col).ok();
        writeln!(
            out,
            "{:left$} | {:.1}%",
            "scrape_success_rate",
            self.get_scrape_success_rate(),
            left = left_col
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {}",
            "metrics_endpoint_calls",
            metrics_calls,
            left = left_col
        )
        .ok();
        writeln!(out, "{:left$} | {}", "http_requests", http_requests, left = left_col).ok();

        writeln!(out).ok();
        writeln!(out, "LAST SCRAPE").ok();
        writeln!(out, "-----------").ok();
        writeln!(out, "{:left$} | {}", "time", last_at, left = left_col).ok();
        writeln!(out, "{:left$} | {}", "result", last_result, left = left_col).ok();

        out
    }
}
