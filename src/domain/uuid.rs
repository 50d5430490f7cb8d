//! Canonical textual form of domain UUIDs.

use uuid::Uuid;

use crate::error::{Result, ScrapeError};

/// Raw 128-bit domain identifier as handed out by the hypervisor.
pub type DomainUuid = [u8; 16];

/// Length of the hyphenated form, `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
pub const UUID_STRING_LEN: usize = 36;

/// Formats a 16-byte identifier as lowercase hyphenated hex.
pub fn format_uuid(bytes: &DomainUuid) -> String {
    let mut buf = Uuid::encode_buffer();
    Uuid::from_bytes(*bytes)
        .hyphenated()
        .encode_lower(&mut buf)
        .to_string()
}

/// Parses any textual UUID form accepted by the `uuid` crate.
pub fn parse_uuid(text: &str) -> Result<DomainUuid> {
    Uuid::parse_str(text)
        .map(|u| *u.as_bytes())
        .map_err(|e| ScrapeError::DataConsistency(format!("invalid uuid '{}': {}", text, e)))
}
