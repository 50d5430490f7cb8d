//! libvirt backend built on the `virt` bindings.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::runtime::{Builder, Handle};
use tracing::debug;
use virt::connect::Connect;
use virt::domain::Domain;

use super::{
    BlockStats, Connector, DomainHandle, DomainInfo, InterfaceStats, MemoryStat, Session,
};
use crate::domain::{parse_uuid, DomainUuid};
use crate::error::{Result, ScrapeError};

/// libvirt reports unsupported counters as -1.
fn counter(value: i64) -> u64 {
    value.max(0) as u64
}

pub struct LibvirtConnector {
    uri: String,
    socket: Option<PathBuf>,
    connect_timeout: Duration,
}

impl LibvirtConnector {
    /// `socket` is probed before the handshake when set; remote URIs pass `None`.
    pub fn new(uri: impl Into<String>, socket: Option<PathBuf>, connect_timeout: Duration) -> Self {
        Self {
            uri: uri.into(),
            socket,
            connect_timeout,
        }
    }
}

/// Drives `fut` to completion from synchronous code, failing with a
/// transport error once `timeout` elapses.
///
/// Scrapes run on the blocking pool (or, for the `test` command, on the
/// runtime's main thread), so the current runtime is reused when there is
/// one; otherwise a throwaway current-thread runtime is built.
fn block_on_bounded<F, T>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let bounded = async {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Transport(format!(
                "timed out after {:?} {}",
                timeout, what
            ))),
        }
    };

    match Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(bounded)),
        Err(_) => {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| ScrapeError::Transport(format!("failed to start runtime: {}", e)))?;
            let result = runtime.block_on(bounded);
            // dropping would wait for a stuck `Connect::open`
            runtime.shutdown_background();
            result
        }
    }
}

/// Dials the daemon socket so an absent daemon reads as a transport error
/// rather than a handshake failure.
async fn probe_socket(path: PathBuf) -> Result<()> {
    UnixStream::connect(&path)
        .await
        .map(|_stream| ())
        .map_err(|e| ScrapeError::Transport(format!("{}: {}", path.display(), e)))
}

/// Opens the session on the blocking pool; `virConnectOpen` has no async form.
/// When the caller gives up first, a late connection is dropped and closed.
async fn open_session(uri: String) -> Result<Connect> {
    tokio::task::spawn_blocking(move || {
        Connect::open(Some(uri.as_str()))
            .map_err(|e| ScrapeError::Session(format!("{}: {}", uri, e)))
    })
    .await
    .map_err(|e| ScrapeError::Session(format!("connect task failed: {}", e)))?
}

impl Connector for LibvirtConnector {
    type Session = LibvirtSession;

    fn connect(&self) -> Result<LibvirtSession> {
        let socket = self.socket.clone();
        let uri = self.uri.clone();
        let what = format!("connecting to {}", self.describe());

        let conn = block_on_bounded(self.connect_timeout, &what, async move {
            if let Some(socket) = socket {
                probe_socket(socket).await?;
            }
            open_session(uri).await
        })?;
        debug!("Connected to {}", self.uri);

        Ok(LibvirtSession { conn })
    }

    fn describe(&self) -> String {
        match &self.socket {
            Some(socket) => format!("{} via {}", self.uri, socket.display()),
            None => self.uri.clone(),
        }
    }
}

pub struct LibvirtDomain {
    inner: Domain,
    name: String,
    uuid: DomainUuid,
}

impl DomainHandle for LibvirtDomain {
    fn name(&self) -> &str {
        &self.name
    }

    fn uuid(&self) -> &DomainUuid {
        &self.uuid
    }
}

/// Dropping the session drops the `Connect`, which closes it.
pub struct LibvirtSession {
    conn: Connect,
}

impl Session for LibvirtSession {
    type Domain = LibvirtDomain;

    fn list_domains(&self) -> Result<Vec<LibvirtDomain>> {
        let domains = self
            .conn
            .list_all_domains(0)
            .map_err(|e| ScrapeError::Enumeration(e.to_string()))?;

        domains
            .into_iter()
            .map(|inner| {
                let name = inner
                    .get_name()
                    .map_err(|e| ScrapeError::Enumeration(e.to_string()))?;
                let uuid_str = inner
                    .get_uuid_string()
                    .map_err(|e| ScrapeError::Enumeration(e.to_string()))?;
                let uuid = parse_uuid(&uuid_str)?;
                Ok(LibvirtDomain { inner, name, uuid })
            })
            .collect()
    }

    fn domain_xml(&self, domain: &LibvirtDomain) -> Result<String> {
        domain
            .inner
            .get_xml_desc(0)
            .map_err(|e| ScrapeError::Descriptor(format!("failed to DomainGetXMLDesc: {}", e)))
    }

    fn domain_info(&self, domain: &LibvirtDomain) -> Result<DomainInfo> {
        let info = domain
            .inner
            .get_info()
            .map_err(|e| ScrapeError::Info(e.to_string()))?;

        Ok(DomainInfo {
            state: info.state as u32,
            max_memory: info.max_mem,
            memory: info.memory,
            vcpus: info.nr_virt_cpu,
            cpu_time: info.cpu_time,
        })
    }

    fn memory_stats(&self, domain: &LibvirtDomain, max_stats: u32) -> Result<Vec<MemoryStat>> {
        let stats = domain
            .inner
            .memory_stats(0)
            .map_err(|e| ScrapeError::Stats(e.to_string()))?;

        Ok(stats
            .into_iter()
            .take(max_stats as usize)
            .map(|s| MemoryStat {
                tag: s.tag as u32,
                value: s.val,
            })
            .collect())
    }

    fn is_active(&self, domain: &LibvirtDomain) -> Result<bool> {
        domain
            .inner
            .is_active()
            .map_err(|e| ScrapeError::ActivityCheck(e.to_string()))
    }

    fn block_stats(&self, domain: &LibvirtDomain, target: &str) -> Result<BlockStats> {
        let stats = domain
            .inner
            .get_block_stats(target)
            .map_err(|e| ScrapeError::BlockStats {
                device: target.to_string(),
                message: e.to_string(),
            })?;

        Ok(BlockStats {
            read_requests: counter(stats.rd_req),
            read_bytes: counter(stats.rd_bytes),
            write_requests: counter(stats.wr_req),
            write_bytes: counter(stats.wr_bytes),
        })
    }

    fn interface_stats(&self, domain: &LibvirtDomain, target: &str) -> Result<InterfaceStats> {
        let stats = domain
            .inner
            .interface_stats(target)
            .map_err(|e| ScrapeError::InterfaceStats {
                device: target.to_string(),
                message: e.to_string(),
            })?;

        Ok(InterfaceStats {
            rx_bytes: counter(stats.rx_bytes),
            rx_packets: counter(stats.rx_packets),
            rx_errors: counter(stats.rx_errs),
            rx_drops: counter(stats.rx_drop),
            tx_bytes: counter(stats.tx_bytes),
            tx_packets: counter(stats.tx_packets),
            tx_errors: counter(stats.tx_errs),
            tx_drops: counter(stats.tx_drop),
        })
    }

    fn disconnect(mut self) -> Result<()> {
        self.conn
            .close()
            .map(|_| ())
            .map_err(|e| ScrapeError::Session(format!("failed to disconnect: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_counters_read_as_zero() {
        assert_eq!(counter(-1), 0);
        assert_eq!(counter(42), 42);
    }

    #[test]
    fn test_missing_socket_is_transport_error() {
        let connector = LibvirtConnector::new(
            "qemu:///system",
            Some(PathBuf::from("/nonexistent/libvirt-sock")),
            Duration::from_secs(1),
        );
        let err = connector.connect().err().unwrap();
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("/nonexistent/libvirt-sock"), "{err}");
    }

    #[test]
    fn test_connect_step_is_bounded() {
        let start = std::time::Instant::now();
        let err = block_on_bounded(
            Duration::from_millis(50),
            "connecting to qemu:///system",
            std::future::pending::<Result<()>>(),
        )
        .unwrap_err();

        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connect_step_is_bounded_inside_runtime() {
        let err = block_on_bounded(
            Duration::from_millis(50),
            "connecting to qemu:///system",
            std::future::pending::<Result<()>>(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_pool_caller_is_bounded() {
        let result = tokio::task::spawn_blocking(|| {
            block_on_bounded(
                Duration::from_millis(50),
                "connecting to qemu:///system",
                std::future::pending::<Result<()>>(),
            )
        })
        .await
        .unwrap();
        assert_eq!(result.unwrap_err().kind(), "transport");
    }
}
