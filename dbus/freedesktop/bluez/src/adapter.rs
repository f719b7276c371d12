//! Adapter controller: selection and control of the local radio.
//!
//! Every operation except [`AdapterController::select_adapter`] and
//! [`AdapterController::adapters`] acts on the selected adapter and fails with
//! [`BluezError::NoAdapterSelected`] when there is none.

use crate::errors::BluezError;
use crate::interfaces::AdapterHandle;
use crate::objects::ObjectCache;
use crate::profiles::{parse_uuid_list, ProfileUuid};
use crate::properties::PropertyAccessor;
use crate::proxies::{BusConnection, ADAPTER_INTERFACE};
use futures::future::BoxFuture;
use log::{debug, error, info};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct AdapterController {
    objects: ObjectCache,
    props: PropertyAccessor,
    selected: Option<AdapterHandle>,
}

impl AdapterController {
    pub fn new(bus: Arc<dyn BusConnection>) -> Self {
        Self {
            objects: ObjectCache::new(bus.clone()),
            props: PropertyAccessor::new(bus),
            selected: None,
        }
    }

    /// Resolves the adapter whose path ends in `name` (`hci0`) and makes it the selection.
    ///
    /// On failure the previous selection is kept.
    pub async fn select_adapter(&mut self, name: &str) -> Result<AdapterHandle, BluezError> {
        let path = self.objects.find_by_suffix(ADAPTER_INTERFACE, name).await?;
        let adapter = AdapterHandle::new(path);
        info!("selected adapter {}", adapter.path);
        self.selected = Some(adapter.clone());
        Ok(adapter)
    }

    pub fn selected(&self) -> Option<&AdapterHandle> {
        self.selected.as_ref()
    }

    pub(crate) fn require_selected(&self) -> Result<&AdapterHandle, BluezError> {
        self.selected.as_ref().ok_or(BluezError::NoAdapterSelected)
    }

    /// Every adapter on the bus, in enumeration order.
    pub async fn adapters(&self) -> Result<Vec<AdapterHandle>, BluezError> {
        Ok(self
            .objects
            .find_objects(ADAPTER_INTERFACE)
            .await?
            .into_iter()
            .map(AdapterHandle::new)
            .collect())
    }

    /// Powers the selected adapter on or off.
    pub async fn power(&self, on: bool) -> Result<(), BluezError> {
        let adapter = self.require_selected()?;
        info!("powering {} bluetooth adapter {}", if on { "on" } else { "off" }, adapter);
        self.props
            .set(&adapter.path, ADAPTER_INTERFACE, "Powered", on)
            .await
            .inspect_err(|e| error!("failed to power {}: {}", adapter, e))
    }

    pub async fn power_state(&self) -> Result<bool, BluezError> {
        let adapter = self.require_selected()?;
        let powered = self
            .props
            .get_bool(&adapter.path, ADAPTER_INTERFACE, "Powered")
            .await?;
        debug!("adapter {} is {}", adapter, if powered { "on" } else { "off" });
        Ok(powered)
    }

    /// Sets the friendly name (alias) of the selected adapter.
    pub async fn set_name(&self, name: &str) -> Result<(), BluezError> {
        let adapter = self.require_selected()?;
        self.props
            .set(&adapter.path, ADAPTER_INTERFACE, "Alias", name)
            .await?;
        info!("bluetooth adapter {} name set to {}", adapter, name);
        Ok(())
    }

    pub async fn name(&self) -> Result<String, BluezError> {
        let adapter = self.require_selected()?;
        self.props
            .get_string(&adapter.path, ADAPTER_INTERFACE, "Alias")
            .await
    }

    /// Profiles the selected adapter advertises.
    pub async fn supported_profiles(&self) -> Result<BTreeSet<ProfileUuid>, BluezError> {
        let adapter = self.require_selected()?;
        let uuids = self
            .props
            .get_strings(&adapter.path, ADAPTER_INTERFACE, "UUIDs")
            .await
            .map_err(|e| {
                error!("failed to retrieve profiles for adapter {}: {}", adapter, e);
                BluezError::ProfileQueryFailed {
                    target: adapter.to_string(),
                    reason: e.to_string(),
                }
            })?;
        parse_uuid_list(adapter.name(), uuids)
    }

    /// Runs `f` once per adapter with that adapter selected. The previous selection is
    /// restored afterwards, also when `f` fails.
    pub async fn for_each_adapter<F>(&mut self, mut f: F) -> Result<(), BluezError>
    where
        F: for<'a> FnMut(&'a AdapterController) -> BoxFuture<'a, Result<(), BluezError>>,
    {
        let adapters = self.adapters().await?;
        let previous = self.selected.take();
        let mut result = Ok(());
        for adapter in adapters {
            self.selected = Some(adapter);
            result = f(self).await;
            if result.is_err() {
                break;
            }
        }
        self.selected = previous;
        result
    }
}
