//! Bus Connection Abstraction
//!
//! This module defines the [`BusConnection`] trait, the only surface through which the
//! rest of the crate talks to the bluetooth stack. It exposes the five capabilities the
//! controllers need from the message bus:
//!
//! - enumeration of objects implementing an interface,
//! - typed property get/set,
//! - synchronous method invocation,
//! - asynchronous method invocation completed through two callbacks,
//! - introspection of the child nodes of an object.
//!
//! [`system::SystemBus`] implements it on top of the D-Bus system bus. Tests implement it
//! with mocks.

use async_trait::async_trait;
use zbus::zvariant::OwnedValue;

pub mod system;

/// Well-known bus name of the bluetooth daemon.
pub const BLUEZ_SERVICE: &str = "org.bluez";

/// Interface implemented by adapter objects (`/org/bluez/hci0`).
pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";

/// Interface implemented by device objects (`/org/bluez/hci0/dev_XX_XX_XX_XX_XX_XX`).
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";

/// Interface implemented by media transport objects (`.../dev_XX/sep1/fd0`).
pub const MEDIA_TRANSPORT_INTERFACE: &str = "org.bluez.MediaTransport1";

/// Invoked when an asynchronous call completes successfully.
pub type SuccessCallback = Box<dyn FnOnce() + Send + 'static>;

/// Invoked with the remote error message when an asynchronous call fails.
pub type FailureCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// Errors raised by the bus layer.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    /// Failure to reach the bus or to build a proxy for an object.
    #[error("failed to create proxy: {0}")]
    CreateProxyFailed(String),

    /// The remote call itself failed (disconnected bus, permission denied, unknown method).
    #[error("dbus call failed: {0}")]
    DbusCallFailed(String),

    /// A property was read but did not hold the expected type.
    #[error("property {property} is not of type {expected}")]
    PropertyTypeMismatch {
        property: String,
        expected: &'static str,
    },

    /// The object does not expose the requested property.
    #[error("no such property {0}")]
    UnknownProperty(String),

    /// A method reply did not have the expected shape.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl From<zbus::Error> for ProxyError {
    fn from(e: zbus::Error) -> Self {
        ProxyError::DbusCallFailed(e.to_string())
    }
}

impl From<zbus::fdo::Error> for ProxyError {
    fn from(e: zbus::fdo::Error) -> Self {
        ProxyError::DbusCallFailed(e.to_string())
    }
}

/// Message bus capabilities consumed by the controllers.
///
/// Object paths, interfaces and member names are passed as plain strings. Method
/// arguments and replies are sequences of owned variant values.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Paths of every object implementing `interface`, sorted by path.
    async fn objects_with_interface(&self, interface: &str) -> Result<Vec<String>, ProxyError>;

    /// Read one property. Never cached.
    ///
    /// A property the object does not expose is reported as
    /// [`ProxyError::UnknownProperty`], every other failure as is.
    async fn get_property(
        &self,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<OwnedValue, ProxyError>;

    /// Write one property on the remote object.
    async fn set_property(
        &self,
        path: &str,
        interface: &str,
        name: &str,
        value: OwnedValue,
    ) -> Result<(), ProxyError>;

    /// Call a method and wait for its reply.
    async fn call_method(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<OwnedValue>,
    ) -> Result<Vec<OwnedValue>, ProxyError>;

    /// Dispatch a method call without waiting. Exactly one of the callbacks runs once the
    /// remote side answers; if the call cannot be dispatched `on_failure` runs immediately.
    fn call_method_async(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<OwnedValue>,
        on_success: SuccessCallback,
        on_failure: FailureCallback,
    );

    /// Names (single path segments) of the direct children of `path`.
    async fn child_nodes(&self, path: &str) -> Result<Vec<String>, ProxyError>;
}
