//! Device controller: enumeration, pairing and profile requests for remote devices.

use crate::errors::BluezError;
use crate::interfaces::device::{device_path_segment, DeviceCategory, DeviceFilter, DeviceHandle};
use crate::interfaces::AdapterHandle;
use crate::objects::{parent_path, ObjectCache};
use crate::pairing::{outcome_slot, PairingOutcome, WaitError};
use crate::profiles::{parse_uuid_list, ProfileUuid};
use crate::properties::PropertyAccessor;
use crate::proxies::{BusConnection, ADAPTER_INTERFACE, DEVICE_INTERFACE};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use zbus::zvariant::{ObjectPath, OwnedValue, Value};

/// Snapshot of the device objects under one adapter, taken when the enumeration was
/// created. Devices appearing later are not part of it.
///
/// The snapshot can be streamed any number of times; each pass re-reads the device
/// properties and applies the filters again.
pub struct DeviceEnumeration {
    props: PropertyAccessor,
    paths: Vec<String>,
    category: Option<DeviceCategory>,
    filter: DeviceFilter,
}

impl DeviceEnumeration {
    /// Lazily yields the matching devices in enumeration order.
    ///
    /// Objects lacking a required property are skipped. Any other failed read is yielded
    /// as an error in place of that device.
    pub fn stream(&self) -> impl Stream<Item = Result<DeviceHandle, BluezError>> + '_ {
        stream::iter(self.paths.iter())
            .filter_map(move |path| self.resolve(path).map(Result::transpose))
    }

    /// Drains one pass into a vector, stopping at the first failed read.
    pub async fn collect(&self) -> Result<Vec<DeviceHandle>, BluezError> {
        self.stream().try_collect().await
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    async fn resolve(&self, path: &str) -> Result<Option<DeviceHandle>, BluezError> {
        let Some(device) = DeviceHandle::fetch(&self.props, path).await? else {
            return Ok(None);
        };
        if let Some(category) = self.category {
            match device.category() {
                Some(found) if found == category => {}
                Some(_) => return Ok(None),
                None => {
                    warn!("skipping {}: missing Class", path);
                    return Ok(None);
                }
            }
        }
        Ok(self.filter.matches(&device).then_some(device))
    }
}

pub struct DeviceController {
    bus: Arc<dyn BusConnection>,
    objects: ObjectCache,
    props: PropertyAccessor,
    pairing_timeout: Duration,
}

impl DeviceController {
    pub fn new(bus: Arc<dyn BusConnection>, pairing_timeout: Duration) -> Self {
        Self {
            objects: ObjectCache::new(bus.clone()),
            props: PropertyAccessor::new(bus.clone()),
            bus,
            pairing_timeout,
        }
    }

    pub fn pairing_timeout(&self) -> Duration {
        self.pairing_timeout
    }

    /// Snapshots the devices of `adapter`, optionally restricted to one category and to
    /// the devices matching `filter`.
    pub async fn enumerate(
        &self,
        adapter: &AdapterHandle,
        category: Option<DeviceCategory>,
        filter: DeviceFilter,
    ) -> Result<DeviceEnumeration, BluezError> {
        let paths: Vec<String> = self
            .objects
            .find_objects(DEVICE_INTERFACE)
            .await?
            .into_iter()
            .filter(|path| parent_path(path) == Some(adapter.path.as_str()))
            .collect();
        debug!("{} device objects under {}", paths.len(), adapter);
        Ok(DeviceEnumeration {
            props: self.props.clone(),
            paths,
            category,
            filter,
        })
    }

    /// Looks up a device of `adapter` by its address.
    pub async fn find_device(
        &self,
        adapter: &AdapterHandle,
        address: &str,
    ) -> Result<DeviceHandle, BluezError> {
        let segment = device_path_segment(address);
        let path = self
            .objects
            .find_objects(DEVICE_INTERFACE)
            .await?
            .into_iter()
            .find(|path| {
                parent_path(path) == Some(adapter.path.as_str())
                    && crate::objects::last_segment(path) == segment
            })
            .ok_or_else(|| BluezError::not_found("device", address))?;
        DeviceHandle::fetch(&self.props, &path)
            .await?
            .ok_or_else(|| BluezError::not_found("device", address))
    }

    /// Trusts `device`, then pairs with it, waiting at most the pairing timeout.
    ///
    /// A pairing still in flight when the deadline passes is left to the remote stack.
    pub async fn pair(&self, device: &DeviceHandle) -> Result<(), BluezError> {
        self.props
            .set(&device.path, DEVICE_INTERFACE, "Trusted", true)
            .await?;
        info!("pairing with {}", device);

        let (slot, waiter) = outcome_slot();
        let failure_slot = slot.clone();
        self.bus.call_method_async(
            &device.path,
            DEVICE_INTERFACE,
            "Pair",
            Vec::new(),
            Box::new(move || {
                slot.record(PairingOutcome::Success);
            }),
            Box::new(move |reason| {
                failure_slot.record(PairingOutcome::Failed(reason));
            }),
        );

        match waiter.wait(self.pairing_timeout).await {
            Ok(PairingOutcome::Success) => {
                info!("paired with {}", device);
                Ok(())
            }
            Ok(PairingOutcome::Failed(reason)) => {
                error!("pairing with {} failed: {}", device, reason);
                Err(BluezError::PairingFailed {
                    address: device.address.clone(),
                    reason,
                })
            }
            Err(WaitError::Abandoned) => Err(BluezError::PairingFailed {
                address: device.address.clone(),
                reason: "pair request completed without a result".to_string(),
            }),
            Err(WaitError::Timeout) => {
                error!("pairing with {} timed out", device);
                Err(BluezError::PairingTimeout {
                    address: device.address.clone(),
                    timeout: self.pairing_timeout,
                })
            }
        }
    }

    /// Removes `device` from its adapter, dropping the bond.
    pub async fn unpair(&self, device: &DeviceHandle) -> Result<(), BluezError> {
        info!("unpairing {}", device);
        let device_path = object_path_arg(&device.path).map_err(|source| {
            BluezError::UnpairFailed {
                address: device.address.clone(),
                source,
            }
        })?;
        self.bus
            .call_method(&device.adapter, ADAPTER_INTERFACE, "RemoveDevice", vec![device_path])
            .await
            .map_err(|source| BluezError::UnpairFailed {
                address: device.address.clone(),
                source,
            })?;
        Ok(())
    }

    /// Profiles advertised by `device`.
    pub async fn supported_profiles(
        &self,
        device: &DeviceHandle,
    ) -> Result<BTreeSet<ProfileUuid>, BluezError> {
        let uuids = self
            .props
            .get_strings(&device.path, DEVICE_INTERFACE, "UUIDs")
            .await
            .map_err(|e| {
                error!("failed to retrieve profiles for {}: {}", device, e);
                BluezError::ProfileQueryFailed {
                    target: device.address.clone(),
                    reason: e.to_string(),
                }
            })?;
        parse_uuid_list(&device.address, uuids)
    }

    /// Asks the stack to connect `profile` on `device`. Failures are not retried.
    pub async fn connect_profile(
        &self,
        device: &DeviceHandle,
        profile: &ProfileUuid,
    ) -> Result<(), BluezError> {
        info!("connecting {} using profile {}", device, profile);
        let uuid = profile.to_string();
        let arg = OwnedValue::try_from(Value::from(uuid.as_str())).map_err(|e| {
            BluezError::BusError(crate::proxies::ProxyError::UnexpectedReply(e.to_string()))
        })?;
        self.bus
            .call_method(&device.path, DEVICE_INTERFACE, "ConnectProfile", vec![arg])
            .await
            .map_err(|source| {
                error!("failed to connect {} using profile {}: {}", device, uuid, source);
                BluezError::ProfileConnectFailed {
                    address: device.address.clone(),
                    uuid: uuid.clone(),
                    source,
                }
            })?;
        info!("connected to {} using profile {}", device, profile);
        Ok(())
    }
}

fn object_path_arg(path: &str) -> Result<OwnedValue, crate::proxies::ProxyError> {
    let path = ObjectPath::try_from(path)
        .map_err(|e| crate::proxies::ProxyError::UnexpectedReply(e.to_string()))?;
    OwnedValue::try_from(Value::from(path))
        .map_err(|e| crate::proxies::ProxyError::UnexpectedReply(e.to_string()))
}
