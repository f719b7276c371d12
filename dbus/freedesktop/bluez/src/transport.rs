//! Media transport discovery and acquisition.
//!
//! A connected streaming profile shows up as a small object tree below the device:
//! `dev_XX → sepN → fdN`. [`TransportDiscoverer`] searches that tree for the `fdN` leaves
//! without assuming its exact shape; [`TransportAcquirer`] requests exclusive access to a
//! leaf and turns the reply into a [`TransportHandle`].

use crate::errors::BluezError;
use crate::interfaces::device::DeviceHandle;
use crate::interfaces::transport::TransportHandle;
use crate::profiles::ProfileUuid;
use crate::properties::PropertyAccessor;
use crate::proxies::{BusConnection, ProxyError, MEDIA_TRANSPORT_INTERFACE};
use log::{debug, error, info, warn};
use std::os::fd::AsFd;
use std::sync::Arc;
use zbus::zvariant::{OwnedValue, Value};

/// Levels searched below the device object.
const MAX_SEARCH_DEPTH: usize = 2;

/// Whether a node name follows the transport leaf convention (`fd0`, `fd12`).
pub fn is_transport_leaf(name: &str) -> bool {
    name.strip_prefix("fd")
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Clone)]
pub struct TransportDiscoverer {
    bus: Arc<dyn BusConnection>,
    props: PropertyAccessor,
}

impl TransportDiscoverer {
    pub fn new(bus: Arc<dyn BusConnection>) -> Self {
        Self {
            props: PropertyAccessor::new(bus.clone()),
            bus,
        }
    }

    /// Every transport leaf below `device`, depth first, children in the order the bus
    /// lists them.
    pub async fn transports(&self, device: &DeviceHandle) -> Result<Vec<String>, BluezError> {
        let mut found = Vec::new();
        let mut pending = vec![(device.path.clone(), 0usize)];
        while let Some((path, depth)) = pending.pop() {
            let children = self.bus.child_nodes(&path).await?;
            debug!("{} has children {:?}", path, children);
            let mut descend = Vec::new();
            for child in children {
                let child_path = format!("{}/{}", path, child);
                if is_transport_leaf(&child) {
                    found.push(child_path);
                } else if depth + 1 < MAX_SEARCH_DEPTH {
                    descend.push((child_path, depth + 1));
                }
            }
            pending.extend(descend.into_iter().rev());
        }
        Ok(found)
    }

    /// The first transport below `device`.
    pub async fn find_transport(&self, device: &DeviceHandle) -> Result<String, BluezError> {
        let path = self
            .transports(device)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BluezError::not_found("transport", &device.address))?;
        info!("found transport {} for {}", path, device);
        Ok(path)
    }

    /// The first transport below `device` carrying `profile`.
    pub async fn find_transport_for_profile(
        &self,
        device: &DeviceHandle,
        profile: &ProfileUuid,
    ) -> Result<String, BluezError> {
        for path in self.transports(device).await? {
            let uuid = self
                .props
                .get_string(&path, MEDIA_TRANSPORT_INTERFACE, "UUID")
                .await?;
            match uuid.parse::<ProfileUuid>() {
                Ok(found) if found == *profile => {
                    info!("found {} transport {} for {}", profile, path, device);
                    return Ok(path);
                }
                Ok(_) => debug!("transport {} carries {}", path, uuid),
                Err(_) => warn!("transport {} reports malformed uuid {:?}", path, uuid),
            }
        }
        Err(BluezError::not_found(
            "transport",
            format!("{} for {}", profile, device.address),
        ))
    }
}

#[derive(Clone)]
pub struct TransportAcquirer {
    bus: Arc<dyn BusConnection>,
}

impl TransportAcquirer {
    pub fn new(bus: Arc<dyn BusConnection>) -> Self {
        Self { bus }
    }

    /// Requests exclusive access to the transport at `path`.
    ///
    /// Exclusivity is enforced by the remote stack: when the transport is already held the
    /// request fails and the failure is returned as is, without retrying.
    pub async fn acquire(&self, path: &str) -> Result<TransportHandle, BluezError> {
        let reply = self
            .bus
            .call_method(path, MEDIA_TRANSPORT_INTERFACE, "Acquire", Vec::new())
            .await
            .map_err(|source| {
                error!("failed to acquire transport {}: {}", path, source);
                BluezError::AcquireFailed {
                    path: path.to_string(),
                    source,
                }
            })?;
        let handle = parse_acquire_reply(path, reply).map_err(|source| BluezError::AcquireFailed {
            path: path.to_string(),
            source,
        })?;
        info!(
            "acquired transport {} (read mtu {}, write mtu {})",
            path,
            handle.read_mtu(),
            handle.write_mtu()
        );
        Ok(handle)
    }

    /// Hands an acquired transport back to the stack.
    pub async fn release(&self, handle: TransportHandle) -> Result<(), BluezError> {
        self.bus
            .call_method(handle.path(), MEDIA_TRANSPORT_INTERFACE, "Release", Vec::new())
            .await?;
        info!("released transport {}", handle.path());
        Ok(())
    }
}

fn parse_acquire_reply(path: &str, reply: Vec<OwnedValue>) -> Result<TransportHandle, ProxyError> {
    let [fd, read_mtu, write_mtu]: [OwnedValue; 3] = reply.try_into().map_err(|v: Vec<_>| {
        ProxyError::UnexpectedReply(format!("acquire returned {} values, expected 3", v.len()))
    })?;
    let fd = match &*fd {
        Value::Fd(fd) => fd
            .as_fd()
            .try_clone_to_owned()
            .map_err(|e| ProxyError::UnexpectedReply(e.to_string()))?,
        other => {
            return Err(ProxyError::UnexpectedReply(format!(
                "expected a file descriptor, got {}",
                other.value_signature()
            )))
        }
    };
    let mtu = |value: OwnedValue, name: &str| {
        u16::try_from(value).map_err(|_| ProxyError::PropertyTypeMismatch {
            property: name.to_string(),
            expected: "u16",
        })
    };
    Ok(TransportHandle::new(
        path,
        fd,
        mtu(read_mtu, "read_mtu")?,
        mtu(write_mtu, "write_mtu")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxies::MockBusConnection;
    use mockall::predicate::*;
    use std::io::Read;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;
    use zbus::zvariant::Fd;

    const DEVICE: &str = "/org/bluez/hci0/dev_94_DB_56_83_CB_FF";

    fn device() -> DeviceHandle {
        DeviceHandle {
            path: DEVICE.to_string(),
            adapter: "/org/bluez/hci0".to_string(),
            address: "94:DB:56:83:CB:FF".to_string(),
            ..Default::default()
        }
    }

    fn owned<'a>(value: impl Into<Value<'a>>) -> OwnedValue {
        OwnedValue::try_from(value.into()).unwrap()
    }

    fn tree(mock: &mut MockBusConnection, nodes: &'static [(&'static str, &'static [&'static str])]) {
        mock.expect_child_nodes().returning(move |path| {
            Ok(nodes
                .iter()
                .find(|(node, _)| *node == path)
                .map(|(_, children)| children.iter().map(|c| c.to_string()).collect())
                .unwrap_or_default())
        });
    }

    #[test]
    fn test_transport_leaf_convention() {
        assert!(is_transport_leaf("fd0"));
        assert!(is_transport_leaf("fd12"));
        assert!(!is_transport_leaf("fd"));
        assert!(!is_transport_leaf("sep1"));
        assert!(!is_transport_leaf("fdx"));
    }

    #[tokio::test]
    async fn test_find_transport_below_endpoint() {
        let mut mock = MockBusConnection::new();
        tree(
            &mut mock,
            &[
                (DEVICE, &["service0010", "sep1", "sep2"]),
                ("/org/bluez/hci0/dev_94_DB_56_83_CB_FF/service0010", &["char0011"]),
                ("/org/bluez/hci0/dev_94_DB_56_83_CB_FF/sep2", &["fd3"]),
            ],
        );
        let discoverer = TransportDiscoverer::new(Arc::new(mock));
        let path = discoverer.find_transport(&device()).await.unwrap();
        assert_eq!(path, "/org/bluez/hci0/dev_94_DB_56_83_CB_FF/sep2/fd3");
    }

    #[tokio::test]
    async fn test_search_depth_is_bounded() {
        let mut mock = MockBusConnection::new();
        tree(
            &mut mock,
            &[
                (DEVICE, &["sep1"]),
                ("/org/bluez/hci0/dev_94_DB_56_83_CB_FF/sep1", &["nested"]),
                ("/org/bluez/hci0/dev_94_DB_56_83_CB_FF/sep1/nested", &["fd0"]),
            ],
        );
        let discoverer = TransportDiscoverer::new(Arc::new(mock));
        let result = discoverer.find_transport(&device()).await;
        assert!(matches!(result, Err(BluezError::NotFound { kind: "transport", .. })));
    }

    #[tokio::test]
    async fn test_no_transport_leaf() {
        let mut mock = MockBusConnection::new();
        tree(&mut mock, &[(DEVICE, &["sep1"])]);
        let discoverer = TransportDiscoverer::new(Arc::new(mock));
        let result = discoverer.find_transport(&device()).await;
        assert!(matches!(result, Err(BluezError::NotFound { kind: "transport", .. })));
    }

    #[tokio::test]
    async fn test_find_transport_for_profile() {
        let mut mock = MockBusConnection::new();
        tree(
            &mut mock,
            &[
                (DEVICE, &["sep1", "sep2"]),
                ("/org/bluez/hci0/dev_94_DB_56_83_CB_FF/sep1", &["fd0"]),
                ("/org/bluez/hci0/dev_94_DB_56_83_CB_FF/sep2", &["fd1"]),
            ],
        );
        mock.expect_get_property()
            .with(always(), eq(MEDIA_TRANSPORT_INTERFACE), eq("UUID"))
            .returning(|path, _, _| {
                Ok(if path.ends_with("fd0") {
                    owned(crate::profiles::HFP_HS_UUID)
                } else {
                    owned(crate::profiles::A2DP_SINK_UUID)
                })
            });
        let discoverer = TransportDiscoverer::new(Arc::new(mock));
        let path = discoverer
            .find_transport_for_profile(&device(), &ProfileUuid::a2dp_sink())
            .await
            .unwrap();
        assert_eq!(path, "/org/bluez/hci0/dev_94_DB_56_83_CB_FF/sep2/fd1");

        let missing = discoverer
            .find_transport_for_profile(&device(), &ProfileUuid::hid())
            .await;
        assert!(matches!(missing, Err(BluezError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_acquire() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        let fd = std::sync::Mutex::new(Some(OwnedFd::from(local)));
        let mut mock = MockBusConnection::new();
        mock.expect_call_method()
            .with(eq("/t/fd0"), eq(MEDIA_TRANSPORT_INTERFACE), eq("Acquire"), always())
            .times(1)
            .returning(move |_, _, _, _| {
                let fd = fd.lock().unwrap().take().unwrap();
                Ok(vec![owned(Fd::from(fd)), owned(672u16), owned(895u16)])
            });
        let acquirer = TransportAcquirer::new(Arc::new(mock));

        let mut handle = acquirer.acquire("/t/fd0").await.unwrap();
        assert_eq!(handle.read_mtu(), 672);
        assert_eq!(handle.write_mtu(), 895);

        handle.write(b"pcm").unwrap();
        let mut buf = [0u8; 3];
        remote.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pcm");
    }

    #[tokio::test]
    async fn test_acquire_already_held() {
        let mut mock = MockBusConnection::new();
        mock.expect_call_method().times(1).returning(|_, _, _, _| {
            Err(ProxyError::DbusCallFailed("org.bluez.Error.NotAuthorized".into()))
        });
        let acquirer = TransportAcquirer::new(Arc::new(mock));
        let result = acquirer.acquire("/t/fd0").await;
        assert!(matches!(result, Err(BluezError::AcquireFailed { .. })));
    }

    #[tokio::test]
    async fn test_acquire_malformed_reply() {
        let mut mock = MockBusConnection::new();
        mock.expect_call_method()
            .returning(|_, _, _, _| Ok(vec![owned(1u16), owned(2u16), owned(3u16)]));
        let acquirer = TransportAcquirer::new(Arc::new(mock));
        let result = acquirer.acquire("/t/fd0").await;
        assert!(matches!(
            result,
            Err(BluezError::AcquireFailed {
                source: ProxyError::UnexpectedReply(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_release() {
        let (local, _remote) = UnixStream::pair().unwrap();
        let mut mock = MockBusConnection::new();
        mock.expect_call_method()
            .with(eq("/t/fd0"), eq(MEDIA_TRANSPORT_INTERFACE), eq("Release"), always())
            .times(1)
            .returning(|_, _, _, _| Ok(Vec::new()));
        let acquirer = TransportAcquirer::new(Arc::new(mock));
        let handle = TransportHandle::new("/t/fd0", OwnedFd::from(local), 672, 895);
        acquirer.release(handle).await.unwrap();
    }
}
