//! [`BusConnection`] backed by the D-Bus system bus.

use super::{BusConnection, FailureCallback, ProxyError, SuccessCallback, BLUEZ_SERVICE};
use async_trait::async_trait;
use log::{debug, error};
use regex::Regex;
use std::sync::OnceLock;
use zbus::fdo::{IntrospectableProxy, ObjectManagerProxy};
use zbus::message::Message;
use zbus::zvariant::{OwnedValue, Structure, StructureBuilder, Value};
use zbus::Connection;

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Connection to the bluetooth daemon on the system bus.
#[derive(Clone, Debug)]
pub struct SystemBus {
    conn: Connection,
    service: String,
}

impl SystemBus {
    /// Connects to the system bus and targets the bluez service.
    pub async fn new() -> Result<Self, ProxyError> {
        let conn = Connection::system()
            .await
            .map_err(|e| ProxyError::CreateProxyFailed(e.to_string()))?;
        Ok(Self::with_connection(conn, BLUEZ_SERVICE))
    }

    /// Wraps an existing connection, addressing `service`.
    pub fn with_connection(conn: Connection, service: &str) -> Self {
        Self {
            conn,
            service: service.to_string(),
        }
    }

    async fn object_manager(&self) -> Result<ObjectManagerProxy<'static>, ProxyError> {
        ObjectManagerProxy::builder(&self.conn)
            .destination(self.service.clone())
            .map_err(|e| ProxyError::CreateProxyFailed(e.to_string()))?
            .path("/")
            .map_err(|e| ProxyError::CreateProxyFailed(e.to_string()))?
            .build()
            .await
            .map_err(|e| ProxyError::CreateProxyFailed(e.to_string()))
    }

    async fn call(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<OwnedValue>,
    ) -> Result<Message, ProxyError> {
        call_raw(&self.conn, &self.service, path, interface, method, args).await
    }
}

async fn call_raw(
    conn: &Connection,
    service: &str,
    path: &str,
    interface: &str,
    method: &str,
    args: Vec<OwnedValue>,
) -> Result<Message, ProxyError> {
    if args.is_empty() {
        return conn
            .call_method(Some(service), path, Some(interface), method, &())
            .await
            .map_err(ProxyError::from);
    }
    let body = args
        .into_iter()
        .fold(StructureBuilder::new(), |builder, arg| {
            builder.append_field(Value::from(arg))
        })
        .build()
        .map_err(|e| ProxyError::UnexpectedReply(e.to_string()))?;
    conn.call_method(Some(service), path, Some(interface), method, &body)
        .await
        .map_err(ProxyError::from)
}

fn reply_values(reply: &Message) -> Result<Vec<OwnedValue>, ProxyError> {
    let body = reply.body();
    if body.signature().to_string().is_empty() {
        return Ok(Vec::new());
    }
    let fields: Structure<'_> = body
        .deserialize()
        .map_err(|e| ProxyError::UnexpectedReply(e.to_string()))?;
    fields
        .into_fields()
        .into_iter()
        .map(|field| {
            OwnedValue::try_from(field).map_err(|e| ProxyError::UnexpectedReply(e.to_string()))
        })
        .collect()
}

/// bluez answers a read of a property the object lacks with `InvalidArgs`
/// ("No such property"); other services use `UnknownProperty`.
fn property_read_error(name: &str, e: zbus::Error) -> ProxyError {
    match zbus::fdo::Error::from(e) {
        zbus::fdo::Error::InvalidArgs(_) | zbus::fdo::Error::UnknownProperty(_) => {
            ProxyError::UnknownProperty(name.to_string())
        }
        other => ProxyError::from(other),
    }
}

fn child_node_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"<node\s+name="([^"/]+)"\s*/?>"#).expect("valid regex"))
}

/// Extracts the names of the direct child `<node>` elements from introspection XML.
pub(crate) fn parse_child_nodes(xml: &str) -> Vec<String> {
    child_node_pattern()
        .captures_iter(xml)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[async_trait]
impl BusConnection for SystemBus {
    async fn objects_with_interface(&self, interface: &str) -> Result<Vec<String>, ProxyError> {
        let objects = self.object_manager().await?.get_managed_objects().await?;
        let mut paths: Vec<String> = objects
            .into_iter()
            .filter(|(_, interfaces)| interfaces.keys().any(|name| name.as_str() == interface))
            .map(|(path, _)| path.to_string())
            .collect();
        paths.sort();
        debug!("{} objects implement {}", paths.len(), interface);
        Ok(paths)
    }

    async fn get_property(
        &self,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<OwnedValue, ProxyError> {
        let reply = self
            .conn
            .call_method(
                Some(self.service.as_str()),
                path,
                Some(PROPERTIES_INTERFACE),
                "Get",
                &(interface, name),
            )
            .await
            .map_err(|e| property_read_error(name, e))?;
        let value: OwnedValue = reply
            .body()
            .deserialize()
            .map_err(|e| ProxyError::UnexpectedReply(e.to_string()))?;
        Ok(value)
    }

    async fn set_property(
        &self,
        path: &str,
        interface: &str,
        name: &str,
        value: OwnedValue,
    ) -> Result<(), ProxyError> {
        self.conn
            .call_method(
                Some(self.service.as_str()),
                path,
                Some(PROPERTIES_INTERFACE),
                "Set",
                &(interface, name, Value::from(value)),
            )
            .await?;
        Ok(())
    }

    async fn call_method(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<OwnedValue>,
    ) -> Result<Vec<OwnedValue>, ProxyError> {
        let reply = self.call(path, interface, method, args).await?;
        reply_values(&reply)
    }

    fn call_method_async(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<OwnedValue>,
        on_success: SuccessCallback,
        on_failure: FailureCallback,
    ) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("cannot dispatch {}.{}: {}", interface, method, e);
                on_failure(e.to_string());
                return;
            }
        };
        let conn = self.conn.clone();
        let service = self.service.clone();
        let path = path.to_string();
        let interface = interface.to_string();
        let method = method.to_string();
        handle.spawn(async move {
            match call_raw(&conn, &service, &path, &interface, &method, args).await {
                Ok(_) => on_success(),
                Err(e) => on_failure(e.to_string()),
            }
        });
    }

    async fn child_nodes(&self, path: &str) -> Result<Vec<String>, ProxyError> {
        let xml = IntrospectableProxy::builder(&self.conn)
            .destination(self.service.clone())
            .map_err(|e| ProxyError::CreateProxyFailed(e.to_string()))?
            .path(path.to_string())
            .map_err(|e| ProxyError::CreateProxyFailed(e.to_string()))?
            .build()
            .await
            .map_err(|e| ProxyError::CreateProxyFailed(e.to_string()))?
            .introspect()
            .await?;
        Ok(parse_child_nodes(&xml))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_child_nodes() {
        let xml = r#"<!DOCTYPE node PUBLIC "-//freedesktop//DTD D-BUS Object Introspection 1.0//EN"
"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd">
<node><interface name="org.bluez.Device1"><method name="Pair"></method></interface>
<node name="sep1"/><node name="sep2"></node></node>"#;
        assert_eq!(parse_child_nodes(xml), vec!["sep1", "sep2"]);
    }

    #[test]
    fn test_parse_child_nodes_ignores_named_root() {
        let xml = r#"<node name="/org/bluez/hci0"><node name="dev_00_11_22_33_44_55"/></node>"#;
        assert_eq!(parse_child_nodes(xml), vec!["dev_00_11_22_33_44_55"]);
    }

    #[test]
    fn test_missing_property_is_distinguished() {
        let missing = zbus::Error::FDO(Box::new(zbus::fdo::Error::InvalidArgs(
            "No such property 'Class'".into(),
        )));
        assert_eq!(
            property_read_error("Class", missing),
            ProxyError::UnknownProperty("Class".into())
        );

        let denied = zbus::Error::FDO(Box::new(zbus::fdo::Error::AccessDenied(
            "Rejected send message".into(),
        )));
        assert!(matches!(
            property_read_error("Class", denied),
            ProxyError::DbusCallFailed(_)
        ));
    }

    #[test]
    fn test_parse_child_nodes_leaf() {
        assert!(parse_child_nodes("<node></node>").is_empty());
    }
}
