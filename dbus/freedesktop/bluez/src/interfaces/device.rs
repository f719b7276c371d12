//! Bluetooth Device Properties Utilities
//!
//! This module defines the [`DeviceHandle`] struct, which encapsulates the properties of
//! a remote device known to an adapter, the [`DeviceCategory`] derived from its class of
//! device, and the [`DeviceFilter`] used to select devices during enumeration.

use crate::errors::BluezError;
use crate::objects::parent_path;
use crate::properties::PropertyAccessor;
use crate::proxies::DEVICE_INTERFACE;
use log::{debug, warn};
use std::fmt;

/// Represents one remote device as read during a single enumeration pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceHandle {
    /// Object path of the device (`/org/bluez/hci0/dev_00_11_22_33_44_55`).
    pub path: String,

    /// Object path of the adapter the device belongs to.
    pub adapter: String,

    /// The unique Bluetooth MAC address of the device.
    pub address: String,

    /// The device's remote name, absent for devices that never advertised one.
    pub name: Option<String>,

    /// The user-assigned alias for the device.
    pub alias: Option<String>,

    /// Raw class of device, absent for most low energy devices.
    pub class: Option<u32>,

    /// Whether the device is paired with the system.
    pub paired: bool,

    /// Whether the device is marked as trusted.
    pub trusted: bool,

    /// Whether the device is currently connected.
    pub connected: Option<bool>,
}

impl DeviceHandle {
    /// Reads the properties of the device object at `path`.
    ///
    /// Returns `Ok(None)` when the object lacks a required property (`Address`, `Paired`,
    /// `Trusted`); the omission is logged. Any other failed read is returned as an error.
    pub async fn fetch(props: &PropertyAccessor, path: &str) -> Result<Option<Self>, BluezError> {
        let address = props.get_string(path, DEVICE_INTERFACE, "Address").await;
        let Some(address) = required(address, path, "Address")? else {
            return Ok(None);
        };
        let paired = props.get_bool(path, DEVICE_INTERFACE, "Paired").await;
        let Some(paired) = required(paired, path, "Paired")? else {
            return Ok(None);
        };
        let trusted = props.get_bool(path, DEVICE_INTERFACE, "Trusted").await;
        let Some(trusted) = required(trusted, path, "Trusted")? else {
            return Ok(None);
        };

        Ok(Some(DeviceHandle {
            path: path.to_string(),
            adapter: parent_path(path).unwrap_or_default().to_string(),
            address,
            name: optional(props.get_string(path, DEVICE_INTERFACE, "Name").await)?,
            alias: optional(props.get_string(path, DEVICE_INTERFACE, "Alias").await)?,
            class: optional(props.get_u32(path, DEVICE_INTERFACE, "Class").await)?,
            paired,
            trusted,
            connected: optional(props.get_bool(path, DEVICE_INTERFACE, "Connected").await)?,
        }))
    }

    /// Category derived from the class of device, `None` when the device reports no class.
    pub fn category(&self) -> Option<DeviceCategory> {
        self.class.map(DeviceCategory::from_class)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alias.as_deref().or(self.name.as_deref()) {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

fn required<T>(
    value: Result<T, BluezError>,
    path: &str,
    name: &str,
) -> Result<Option<T>, BluezError> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_unknown_property() => {
            warn!("skipping {}: missing {}", path, name);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn optional<T>(value: Result<T, BluezError>) -> Result<Option<T>, BluezError> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_unknown_property() => {
            debug!("{}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Object path segment bluez uses for a device address (`dev_00_11_22_33_44_55`).
pub fn device_path_segment(address: &str) -> String {
    format!("dev_{}", address.to_ascii_uppercase().replace(':', "_"))
}

/// Coarse device type decoded from the major/minor class of device bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCategory {
    Computer,
    Phone,
    Network,
    AudioVideo,
    Keyboard,
    Mouse,
    Peripheral,
    Imaging,
    Wearable,
    Toy,
    Health,
    Uncategorized,
}

impl DeviceCategory {
    /// Decodes a 24-bit class of device value.
    pub fn from_class(class: u32) -> Self {
        let major = (class >> 8) & 0x1f;
        let minor = (class >> 2) & 0x3f;
        match major {
            0x01 => DeviceCategory::Computer,
            0x02 => DeviceCategory::Phone,
            0x03 => DeviceCategory::Network,
            0x04 => DeviceCategory::AudioVideo,
            // peripheral minor bits 5..4: 01 keyboard, 10 pointing device, 11 combo
            0x05 => match minor >> 4 {
                0x01 => DeviceCategory::Keyboard,
                0x02 => DeviceCategory::Mouse,
                _ => DeviceCategory::Peripheral,
            },
            0x06 => DeviceCategory::Imaging,
            0x07 => DeviceCategory::Wearable,
            0x08 => DeviceCategory::Toy,
            0x09 => DeviceCategory::Health,
            _ => DeviceCategory::Uncategorized,
        }
    }
}

/// Equality filters applied while enumerating devices. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFilter {
    pub paired: Option<bool>,
    pub trusted: Option<bool>,
    pub connected: Option<bool>,
    pub address: Option<String>,
}

impl DeviceFilter {
    pub fn paired() -> Self {
        Self {
            paired: Some(true),
            ..Default::default()
        }
    }

    /// Whether the device satisfies every set filter.
    pub fn matches(&self, device: &DeviceHandle) -> bool {
        self.paired.is_none_or(|paired| device.paired == paired)
            && self.trusted.is_none_or(|trusted| device.trusted == trusted)
            && self
                .connected
                .is_none_or(|connected| device.connected == Some(connected))
            && self
                .address
                .as_deref()
                .is_none_or(|address| device.address.eq_ignore_ascii_case(address))
    }
}
