//! Bluetooth object handles
//!
//! Plain values identifying the objects the controllers operate on:
//!
//! - [`AdapterHandle`]: a local radio (`/org/bluez/hci0`).
//! - [`device::DeviceHandle`]: a remote device known to an adapter.
//! - [`transport::TransportHandle`]: an acquired media transport.

use crate::objects::last_segment;
use std::fmt;

pub mod device;
pub mod transport;

/// Identifies one adapter on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdapterHandle {
    /// Object path of the adapter.
    pub path: String,
}

impl AdapterHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Interface identifier, the last segment of the path (`hci0`).
    pub fn name(&self) -> &str {
        last_segment(&self.path)
    }
}

impl fmt::Display for AdapterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
