//! Domain-level data shapes: identifiers, lifecycle states and the
//! configuration descriptor.

pub mod descriptor;
pub mod state;
pub mod uuid;

pub use descriptor::{BlockDevice, DeviceClass, DomainDescriptor, NetworkInterface};
pub use state::DomainState;
pub use uuid::{format_uuid, parse_uuid, DomainUuid};
