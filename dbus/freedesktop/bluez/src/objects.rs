//! Lookup of bus objects by interface and trailing path segment.

use crate::errors::BluezError;
use crate::proxies::BusConnection;
use log::debug;
use std::sync::Arc;

/// Enumerates the objects the stack exposes for an interface and resolves a single
/// object from the last segment of its path (`hci0`, `dev_00_11_22_33_44_55`, `fd0`).
#[derive(Clone)]
pub struct ObjectCache {
    bus: Arc<dyn BusConnection>,
}

impl ObjectCache {
    pub fn new(bus: Arc<dyn BusConnection>) -> Self {
        Self { bus }
    }

    /// Every object implementing `interface`, in enumeration order.
    pub async fn find_objects(&self, interface: &str) -> Result<Vec<String>, BluezError> {
        Ok(self.bus.objects_with_interface(interface).await?)
    }

    /// The first object implementing `interface` whose last path segment equals `suffix`.
    ///
    /// Matching is exact and case-sensitive: `hci1` never matches `/org/bluez/hci10`.
    pub async fn find_by_suffix(&self, interface: &str, suffix: &str) -> Result<String, BluezError> {
        let path = self
            .find_objects(interface)
            .await?
            .into_iter()
            .find(|path| last_segment(path) == suffix)
            .ok_or_else(|| BluezError::not_found(interface_kind(interface), suffix))?;
        debug!("resolved {} to {}", suffix, path);
        Ok(path)
    }
}

/// Last `/`-separated segment of an object path.
pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Object path of the parent of `path`, `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(index) => Some(&path[..index]),
    }
}

fn interface_kind(interface: &str) -> &'static str {
    match interface {
        crate::proxies::ADAPTER_INTERFACE => "adapter",
        crate::proxies::DEVICE_INTERFACE => "device",
        crate::proxies::MEDIA_TRANSPORT_INTERFACE => "transport",
        _ => "object",
    }
}
