//! High-level Bluetooth Service Abstraction
//!
//! This module provides the [`BluetoothService`] struct, the entry point used by
//! validation scenarios. It owns the bus connection and composes the adapter controller,
//! device controller and transport helpers behind one API:
//!
//! - select an adapter and control its power state, name and profiles,
//! - enumerate, pair, unpair and query devices of the selected adapter,
//! - connect profiles and acquire the resulting media transport.
//!
//! # Example
//!
//! ```no_run
//! use bluez_validation::config::Config;
//! use bluez_validation::service::BluetoothService;
//! # async fn example() -> Result<(), bluez_validation::errors::BluezError> {
//! let mut service = BluetoothService::new(&Config::default()).await?;
//! service.select_adapter("hci0").await?;
//! if !service.power_state().await? {
//!     service.power_on().await?;
//! }
//! let report = service.unpair_all().await?;
//! println!("unpaired {} devices", report.unpaired.len());
//! # Ok(())
//! # }
//! ```
//!
//! Any [`BusConnection`] can back the service, which is how the tests drive it.

use crate::adapter::AdapterController;
use crate::config::Config;
use crate::device::{DeviceController, DeviceEnumeration};
use crate::errors::BluezError;
use crate::interfaces::device::{DeviceCategory, DeviceFilter, DeviceHandle};
use crate::interfaces::transport::TransportHandle;
use crate::interfaces::AdapterHandle;
use crate::profiles::ProfileUuid;
use crate::proxies::system::SystemBus;
use crate::proxies::BusConnection;
use crate::transport::{TransportAcquirer, TransportDiscoverer};
use futures::{FutureExt, StreamExt};
use log::{info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of [`BluetoothService::unpair_all`].
#[derive(Debug, Default)]
pub struct UnpairReport {
    /// Addresses of the devices that were removed.
    pub unpaired: Vec<String>,
    /// Devices the stack refused to remove, with the reason.
    pub failed: Vec<(String, BluezError)>,
}

impl UnpairReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BluetoothService {
    adapters: AdapterController,
    devices: DeviceController,
    discoverer: TransportDiscoverer,
    acquirer: TransportAcquirer,
}

impl BluetoothService {
    /// Creates a new `BluetoothService` connected to the system bus.
    ///
    /// # Arguments
    ///
    /// * `config` - Scenario configuration; supplies the pairing timeout.
    ///
    /// # Returns
    ///
    /// * `Ok(BluetoothService)` with no adapter selected.
    /// * `Err(BluezError::InitBusError)` if the system bus cannot be reached.
    pub async fn new(config: &Config) -> Result<Self, BluezError> {
        let bus = SystemBus::new()
            .await
            .map_err(|e| BluezError::InitBusError(e.to_string()))?;
        info!("bluez connection created");
        Ok(Self::with_bus(Arc::new(bus), config))
    }

    /// Builds the service on top of an existing bus connection.
    pub fn with_bus(bus: Arc<dyn BusConnection>, config: &Config) -> Self {
        Self {
            adapters: AdapterController::new(bus.clone()),
            devices: DeviceController::new(bus.clone(), config.pairing_timeout()),
            discoverer: TransportDiscoverer::new(bus.clone()),
            acquirer: TransportAcquirer::new(bus),
        }
    }

    pub fn adapter_controller(&self) -> &AdapterController {
        &self.adapters
    }

    pub fn device_controller(&self) -> &DeviceController {
        &self.devices
    }

    /// Selects the adapter every adapter-scoped operation acts on.
    ///
    /// # Arguments
    ///
    /// * `name` - Interface identifier, the last segment of the adapter path (`hci0`).
    ///
    /// # Returns
    ///
    /// * `Ok(AdapterHandle)` for the newly selected adapter.
    /// * `Err(BluezError::NotFound)` if no adapter has that name; the previous selection
    ///   is kept.
    pub async fn select_adapter(&mut self, name: &str) -> Result<AdapterHandle, BluezError> {
        self.adapters.select_adapter(name).await
    }

    /// The adapter chosen by the last successful [`Self::select_adapter`].
    pub fn selected_adapter(&self) -> Option<&AdapterHandle> {
        self.adapters.selected()
    }

    /// Lists every adapter on the bus.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<AdapterHandle>)` sorted by object path.
    /// * `Err` if the bus cannot be enumerated.
    pub async fn adapters(&self) -> Result<Vec<AdapterHandle>, BluezError> {
        self.adapters.adapters().await
    }

    /// Powers on the selected adapter.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the stack accepted the change.
    /// * `Err` if no adapter is selected or the write fails.
    pub async fn power_on(&self) -> Result<(), BluezError> {
        self.adapters.power(true).await
    }

    /// Powers off the selected adapter.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the stack accepted the change.
    /// * `Err` if no adapter is selected or the write fails.
    pub async fn power_off(&self) -> Result<(), BluezError> {
        self.adapters.power(false).await
    }

    /// Reads the power state of the selected adapter.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if the adapter is powered.
    /// * `Err` if no adapter is selected or the read fails.
    pub async fn power_state(&self) -> Result<bool, BluezError> {
        self.adapters.power_state().await
    }

    /// Sets the friendly name of the selected adapter.
    ///
    /// # Arguments
    ///
    /// * `name` - New name, written to the adapter's `Alias`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the stack accepted the name.
    /// * `Err` if no adapter is selected or the write fails.
    pub async fn set_name(&self, name: &str) -> Result<(), BluezError> {
        self.adapters.set_name(name).await
    }

    /// Reads the friendly name of the selected adapter.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` with the current alias.
    /// * `Err` if no adapter is selected or the read fails.
    pub async fn name(&self) -> Result<String, BluezError> {
        self.adapters.name().await
    }

    /// Profiles advertised by the selected adapter.
    ///
    /// # Returns
    ///
    /// * `Ok(BTreeSet<ProfileUuid>)` with the advertised profiles.
    /// * `Err(BluezError::ProfileQueryFailed)` if the list cannot be read or parsed.
    pub async fn adapter_profiles(&self) -> Result<BTreeSet<ProfileUuid>, BluezError> {
        self.adapters.supported_profiles().await
    }

    /// Powers every adapter off, leaving the current selection in place.
    pub async fn ensure_adapters_off(&mut self) -> Result<(), BluezError> {
        self.adapters
            .for_each_adapter(|adapter| adapter.power(false).boxed())
            .await
    }

    /// Snapshots the devices of the selected adapter.
    ///
    /// # Arguments
    ///
    /// * `category` - Keep only devices of this class-of-device category.
    /// * `filter` - Keep only devices whose properties match.
    ///
    /// # Returns
    ///
    /// * `Ok(DeviceEnumeration)` that can be streamed any number of times.
    /// * `Err` if no adapter is selected or the bus cannot be enumerated.
    pub async fn devices(
        &self,
        category: Option<DeviceCategory>,
        filter: DeviceFilter,
    ) -> Result<DeviceEnumeration, BluezError> {
        let adapter = self.adapters.require_selected()?;
        self.devices.enumerate(adapter, category, filter).await
    }

    /// Looks up a device of the selected adapter by its address.
    ///
    /// # Arguments
    ///
    /// * `address` - The MAC address of the device, in any letter case.
    ///
    /// # Returns
    ///
    /// * `Ok(DeviceHandle)` with the device's current properties.
    /// * `Err(BluezError::NotFound)` if the adapter does not know the device.
    pub async fn find_device(&self, address: &str) -> Result<DeviceHandle, BluezError> {
        let adapter = self.adapters.require_selected()?;
        self.devices.find_device(adapter, address).await
    }

    /// Trusts and pairs with a device, waiting at most the configured pairing timeout.
    ///
    /// # Returns
    ///
    /// * `Ok(())` once the stack reports the pairing succeeded.
    /// * `Err(BluezError::PairingFailed)` or `Err(BluezError::PairingTimeout)` otherwise.
    pub async fn pair(&self, device: &DeviceHandle) -> Result<(), BluezError> {
        self.devices.pair(device).await
    }

    /// Removes a device from its adapter.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the device was removed.
    /// * `Err(BluezError::UnpairFailed)` if the stack refused.
    pub async fn unpair(&self, device: &DeviceHandle) -> Result<(), BluezError> {
        self.devices.unpair(device).await
    }

    /// Unpairs every paired device of the selected adapter.
    ///
    /// A device that cannot be removed is logged and recorded in the report; the
    /// remaining devices are still attempted. Failing to read the devices aborts the run.
    ///
    /// # Returns
    ///
    /// * `Ok(UnpairReport)` listing removed and refused devices.
    /// * `Err` if no adapter is selected or the devices cannot be read.
    pub async fn unpair_all(&self) -> Result<UnpairReport, BluezError> {
        let paired = self.devices(None, DeviceFilter::paired()).await?;
        let mut report = UnpairReport::default();
        let mut stream = std::pin::pin!(paired.stream());
        while let Some(device) = stream.next().await {
            let device = device?;
            match self.devices.unpair(&device).await {
                Ok(()) => report.unpaired.push(device.address),
                Err(e) => {
                    warn!("unpairing {} failed: {}", device, e);
                    report.failed.push((device.address, e));
                }
            }
        }
        info!(
            "unpaired {} devices, {} failures",
            report.unpaired.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Profiles advertised by a device.
    ///
    /// # Returns
    ///
    /// * `Ok(BTreeSet<ProfileUuid>)` with the advertised profiles.
    /// * `Err(BluezError::ProfileQueryFailed)` if the list cannot be read or parsed.
    pub async fn device_profiles(
        &self,
        device: &DeviceHandle,
    ) -> Result<BTreeSet<ProfileUuid>, BluezError> {
        self.devices.supported_profiles(device).await
    }

    /// Asks the stack to connect one profile on a device. Failures are not retried.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to connect.
    /// * `profile` - The profile to bring up.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the stack connected the profile.
    /// * `Err(BluezError::ProfileConnectFailed)` otherwise.
    pub async fn connect_profile(
        &self,
        device: &DeviceHandle,
        profile: &ProfileUuid,
    ) -> Result<(), BluezError> {
        self.devices.connect_profile(device, profile).await
    }

    /// Finds the first media transport below a device.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` with the transport's object path.
    /// * `Err(BluezError::NotFound)` if the device has no transport.
    pub async fn find_transport(&self, device: &DeviceHandle) -> Result<String, BluezError> {
        self.discoverer.find_transport(device).await
    }

    /// Finds the first media transport below a device that carries `profile`.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` with the transport's object path.
    /// * `Err(BluezError::NotFound)` if no transport carries the profile.
    pub async fn find_transport_for_profile(
        &self,
        device: &DeviceHandle,
        profile: &ProfileUuid,
    ) -> Result<String, BluezError> {
        self.discoverer
            .find_transport_for_profile(device, profile)
            .await
    }

    /// Requests exclusive access to a transport.
    ///
    /// # Arguments
    ///
    /// * `path` - Object path of the transport, as returned by [`Self::find_transport`].
    ///
    /// # Returns
    ///
    /// * `Ok(TransportHandle)` owning the descriptor and the negotiated MTUs.
    /// * `Err(BluezError::AcquireFailed)` if the stack refused, e.g. because the
    ///   transport is already held.
    pub async fn acquire_transport(&self, path: &str) -> Result<TransportHandle, BluezError> {
        self.acquirer.acquire(path).await
    }

    /// Hands an acquired transport back to the stack.
    pub async fn release_transport(&self, handle: TransportHandle) -> Result<(), BluezError> {
        self.acquirer.release(handle).await
    }
}
