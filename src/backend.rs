//! Hypervisor backend selection.
//!
//! A test data file always wins; otherwise the libvirt daemon is used when
//! the binary was built with the `libvirt` feature.

use anyhow::Context;
use libvirt_exporter::hypervisor::fixture::FixtureConnector;
#[cfg(feature = "libvirt")]
use libvirt_exporter::hypervisor::libvirt::LibvirtConnector;
use libvirt_exporter::Connector;
use tracing::info;

use crate::config::Config;

pub enum Backend {
    Fixture(FixtureConnector),
    #[cfg(feature = "libvirt")]
    Libvirt(LibvirtConnector),
}

pub fn select_backend(config: &Config) -> anyhow::Result<Backend> {
    if let Some(path) = &config.test_data_file {
        let connector = FixtureConnector::from_file(path)
            .with_context(|| format!("failed to load test data file {}", path.display()))?;
        info!("Using test data backend: {}", connector.describe());
        return Ok(Backend::Fixture(connector));
    }

    libvirt_backend(config)
}

#[cfg(feature = "libvirt")]
fn libvirt_backend(config: &Config) -> anyhow::Result<Backend> {
    let connector = LibvirtConnector::new(
        config.libvirt_uri(),
        config.libvirt_socket(),
        config.connect_timeout(),
    );
    info!("Using libvirt backend: {}", connector.describe());
    Ok(Backend::Libvirt(connector))
}

#[cfg(not(feature = "libvirt"))]
fn libvirt_backend(_config: &Config) -> anyhow::Result<Backend> {
    anyhow::bail!(
        "built without the `libvirt` feature; rebuild with --features libvirt \
         or pass --test-data-file to serve a fixture"
    )
}
