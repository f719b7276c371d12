//! Bluez errors

use super::proxies::ProxyError;
use std::time::Duration;

/// An error that can occur while handling bluetooth operations.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BluezError {
    /// No adapter, device or transport matched the lookup.
    #[error("{kind} {target} not found")]
    NotFound { kind: &'static str, target: String },

    /// An adapter-scoped operation was attempted before selecting an adapter.
    #[error("no bluetooth adapter selected, select an adapter first")]
    NoAdapterSelected,

    /// Transport-level failure talking to the remote stack.
    #[error("bus error: {0}")]
    BusError(#[from] ProxyError),

    /// Failure to create the system D-Bus connection.
    #[error("failed to initialize system bus: {0}")]
    InitBusError(String),

    /// Neither pairing callback fired before the deadline.
    #[error("pairing with {address} timed out after {timeout:?}")]
    PairingTimeout { address: String, timeout: Duration },

    /// The remote stack reported a pairing failure.
    #[error("pairing with {address} failed: {reason}")]
    PairingFailed { address: String, reason: String },

    /// The remote stack refused to remove a device.
    #[error("unpairing {address} failed: {source}")]
    UnpairFailed {
        address: String,
        #[source]
        source: ProxyError,
    },

    /// Reading the UUID list of an adapter or device failed.
    #[error("could not retrieve profiles of {target}: {reason}")]
    ProfileQueryFailed { target: String, reason: String },

    /// Requesting an explicit profile connection failed.
    #[error("profile connection to {address} using {uuid} failed: {source}")]
    ProfileConnectFailed {
        address: String,
        uuid: String,
        #[source]
        source: ProxyError,
    },

    /// Text that is not a 128-bit UUID was given as a profile.
    #[error("invalid profile uuid {0:?}")]
    InvalidProfileUuid(String),

    /// The remote stack refused to hand out the transport.
    #[error("failed to acquire transport {path}: {source}")]
    AcquireFailed {
        path: String,
        #[source]
        source: ProxyError,
    },

    /// A write exceeded the negotiated write MTU.
    #[error("chunk of {len} bytes exceeds write mtu of {mtu} bytes")]
    ChunkTooLarge { len: usize, mtu: u16 },

    /// The OS rejected a write on an acquired transport.
    #[error("failed to write to transport {path}: {reason}")]
    TransportWriteFailed { path: String, reason: String },
}

impl BluezError {
    /// Whether the error only says that the object lacks the property that was read.
    pub fn is_unknown_property(&self) -> bool {
        matches!(self, BluezError::BusError(ProxyError::UnknownProperty(_)))
    }

    pub(crate) fn not_found(kind: &'static str, target: impl Into<String>) -> Self {
        BluezError::NotFound {
            kind,
            target: target.into(),
        }
    }
}
