//! Domain lifecycle states as reported by `virDomainGetInfo`.

use std::fmt;

use crate::error::{Result, ScrapeError};

/// Lifecycle state of a domain. Discriminants are the hypervisor's codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DomainState {
    NoState = 0,
    Running = 1,
    Blocked = 2,
    Paused = 3,
    Shutdown = 4,
    Shutoff = 5,
    Crashed = 6,
    PmSuspended = 7,
    Last = 8,
}

impl DomainState {
    /// All states in code order.
    pub const ALL: [DomainState; 9] = [
        DomainState::NoState,
        DomainState::Running,
        DomainState::Blocked,
        DomainState::Paused,
        DomainState::Shutdown,
        DomainState::Shutoff,
        DomainState::Crashed,
        DomainState::PmSuspended,
        DomainState::Last,
    ];

    /// Checked lookup from a raw state code.
    ///
    /// Codes outside `0..=8` are a data consistency error, never a default.
    pub fn from_code(code: u32) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| ScrapeError::DataConsistency(format!("unknown domain state code {}", code)))
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Value of the `state` label.
    pub fn as_str(self) -> &'static str {
        match self {
            DomainState::NoState => "nostate",
            DomainState::Running => "running",
            DomainState::Blocked => "blocked",
            DomainState::Paused => "paused",
            DomainState::Shutdown => "shutdown",
            DomainState::Shutoff => "shutoff",
            DomainState::Crashed => "crashed",
            DomainState::PmSuspended => "pmsuspended",
            DomainState::Last => "last",
        }
    }
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
