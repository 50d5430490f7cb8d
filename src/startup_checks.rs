//! Startup requirement validation for libvirt-exporter.
//!
//! Checks that the exporter can plausibly reach the libvirt daemon before it
//! starts serving. Failures are logged; the server still starts because the
//! daemon may come up later and every scrape reconnects.

use nix::unistd::geteuid;
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use tracing::{error, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(socket: Option<&Path>) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();

    if let Some(socket) = socket {
        check_libvirt_socket(socket)?;
    }

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - the libvirt socket may refuse the connection");
        warn!("   Recommendation: run as root or as a member of the 'libvirt' group");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

/// Check that the daemon socket exists and is a unix socket
fn check_libvirt_socket(socket: &Path) -> Result<(), ValidationError> {
    match fs::metadata(socket) {
        Ok(meta) if meta.file_type().is_socket() => {
            info!("✅ libvirt socket found: {}", socket.display());
            Ok(())
        }
        Ok(_) => {
            error!("❌ {} exists but is not a unix socket", socket.display());
            Err(ValidationError::NotASocket(socket.display().to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!("❌ libvirt socket not found: {}", socket.display());
            error!("   Is libvirtd running? Try: systemctl status libvirtd");
            Err(ValidationError::SocketMissing(socket.display().to_string()))
        }
        Err(e) => {
            error!("❌ Cannot access {}: {}", socket.display(), e);
            Err(ValidationError::SocketInaccessible(e.to_string()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("libvirt socket not found: {0}")]
    SocketMissing(String),

    #[error("not a unix socket: {0}")]
    NotASocket(String),

    #[error("libvirt socket not accessible: {0}")]
    SocketInaccessible(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_missing_socket() {
        let err = check_libvirt_socket(Path::new("/nonexistent/libvirt-sock")).unwrap_err();
        assert!(matches!(err, ValidationError::SocketMissing(_)));
    }

    #[test]
    fn test_regular_file_is_not_a_socket() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = check_libvirt_socket(file.path()).unwrap_err();
        assert!(matches!(err, ValidationError::NotASocket(_)));
    }

    #[test]
    fn test_listening_socket_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libvirt-sock");
        let _listener = UnixListener::bind(&path).unwrap();
        assert!(validate_requirements(Some(&path)).is_ok());
    }
}
