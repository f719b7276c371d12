//! Typed access to the properties of bus objects.
//!
//! Nothing is cached: every getter goes back to the bus, so a read following a write
//! always reflects what the remote stack reports.

use crate::errors::BluezError;
use crate::proxies::{BusConnection, ProxyError};
use log::debug;
use std::sync::Arc;
use zbus::zvariant::{OwnedValue, Value};

#[derive(Clone)]
pub struct PropertyAccessor {
    bus: Arc<dyn BusConnection>,
}

impl PropertyAccessor {
    pub fn new(bus: Arc<dyn BusConnection>) -> Self {
        Self { bus }
    }

    /// Reads a property and converts it to `T`.
    ///
    /// A bus failure and a value of the wrong type both surface as [`BluezError::BusError`].
    pub async fn get<T>(&self, path: &str, interface: &str, name: &str) -> Result<T, BluezError>
    where
        T: TryFrom<OwnedValue>,
    {
        let value = self.bus.get_property(path, interface, name).await?;
        debug!("read {}.{} on {}", interface, name, path);
        T::try_from(value).map_err(|_| {
            BluezError::BusError(ProxyError::PropertyTypeMismatch {
                property: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
        })
    }

    /// Writes a property on the remote object.
    pub async fn set<'a, T>(
        &self,
        path: &str,
        interface: &str,
        name: &str,
        value: T,
    ) -> Result<(), BluezError>
    where
        T: Into<Value<'a>>,
    {
        let value = OwnedValue::try_from(value.into()).map_err(|e| {
            BluezError::BusError(ProxyError::UnexpectedReply(format!(
                "cannot encode {}: {}",
                name, e
            )))
        })?;
        self.bus.set_property(path, interface, name, value).await?;
        debug!("wrote {}.{} on {}", interface, name, path);
        Ok(())
    }

    pub async fn get_bool(&self, path: &str, interface: &str, name: &str) -> Result<bool, BluezError> {
        self.get(path, interface, name).await
    }

    pub async fn get_string(
        &self,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<String, BluezError> {
        self.get(path, interface, name).await
    }

    pub async fn get_u32(&self, path: &str, interface: &str, name: &str) -> Result<u32, BluezError> {
        self.get(path, interface, name).await
    }

    pub async fn get_strings(
        &self,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<Vec<String>, BluezError> {
        self.get(path, interface, name).await
    }
}
