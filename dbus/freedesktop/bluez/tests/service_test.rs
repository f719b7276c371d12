use bluez_validation::config::Config;
use bluez_validation::errors::BluezError;
use bluez_validation::interfaces::device::{DeviceCategory, DeviceFilter};
use bluez_validation::proxies::{
    BusConnection, FailureCallback, ProxyError, SuccessCallback, ADAPTER_INTERFACE,
    DEVICE_INTERFACE,
};
use bluez_validation::service::BluetoothService;
use mockall::mock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::zvariant::{ObjectPath, OwnedValue, Value};

mock! {
    pub Bus {}

    #[async_trait::async_trait]
    impl BusConnection for Bus {
        async fn objects_with_interface(&self, interface: &str) -> Result<Vec<String>, ProxyError>;
        async fn get_property(&self, path: &str, interface: &str, name: &str) -> Result<OwnedValue, ProxyError>;
        async fn set_property(&self, path: &str, interface: &str, name: &str, value: OwnedValue) -> Result<(), ProxyError>;
        async fn call_method(&self, path: &str, interface: &str, method: &str, args: Vec<OwnedValue>) -> Result<Vec<OwnedValue>, ProxyError>;
        fn call_method_async(&self, path: &str, interface: &str, method: &str, args: Vec<OwnedValue>, on_success: SuccessCallback, on_failure: FailureCallback);
        async fn child_nodes(&self, path: &str) -> Result<Vec<String>, ProxyError>;
    }
}

const HCI0: &str = "/org/bluez/hci0";
const HCI1: &str = "/org/bluez/hci1";

type Store = Arc<Mutex<HashMap<(String, String), OwnedValue>>>;

fn owned<'a>(value: impl Into<Value<'a>>) -> OwnedValue {
    OwnedValue::try_from(value.into()).unwrap()
}

/// A device object under hci0 with the given address, pairing state and class.
struct FakeDevice {
    address: &'static str,
    paired: bool,
    class: u32,
}

impl FakeDevice {
    fn path(&self) -> String {
        format!("{}/dev_{}", HCI0, self.address.replace(':', "_"))
    }
}

/// Builds a bus exposing hci0 and hci1 plus `devices`, with properties kept in a shared
/// in-memory store so writes are visible to later reads.
fn fake_bus(devices: &[FakeDevice]) -> (MockBus, Store) {
    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    {
        let mut props = store.lock().unwrap();
        for adapter in [HCI0, HCI1] {
            props.insert((adapter.to_string(), "Powered".to_string()), owned(false));
            props.insert((adapter.to_string(), "Alias".to_string()), owned("dut"));
        }
        for device in devices {
            let path = device.path();
            props.insert((path.clone(), "Address".to_string()), owned(device.address));
            props.insert((path.clone(), "Paired".to_string()), owned(device.paired));
            props.insert((path.clone(), "Trusted".to_string()), owned(device.paired));
            props.insert((path, "Class".to_string()), owned(device.class));
        }
    }

    let mut bus = MockBus::new();
    let device_paths: Vec<String> = devices.iter().map(FakeDevice::path).collect();
    bus.expect_objects_with_interface()
        .returning(move |interface| match interface {
            ADAPTER_INTERFACE => Ok(vec![HCI0.to_string(), HCI1.to_string()]),
            DEVICE_INTERFACE => Ok(device_paths.clone()),
            _ => Ok(Vec::new()),
        });

    let reader = store.clone();
    bus.expect_get_property().returning(move |path, _, name| {
        reader
            .lock()
            .unwrap()
            .get(&(path.to_string(), name.to_string()))
            .map(|value| value.try_clone().unwrap())
            .ok_or_else(|| ProxyError::UnknownProperty(name.to_string()))
    });

    let writer = store.clone();
    bus.expect_set_property().returning(move |path, _, name, value| {
        writer
            .lock()
            .unwrap()
            .insert((path.to_string(), name.to_string()), value);
        Ok(())
    });

    (bus, store)
}

fn service(bus: MockBus) -> BluetoothService {
    BluetoothService::with_bus(Arc::new(bus), &Config::default())
}

#[tokio::test]
async fn test_power_on_then_power_state() {
    let (bus, _) = fake_bus(&[]);
    let mut service = service(bus);

    service.select_adapter("hci0").await.unwrap();
    assert!(!service.power_state().await.unwrap());

    service.power_on().await.unwrap();
    assert!(service.power_state().await.unwrap());

    service.power_off().await.unwrap();
    assert!(!service.power_state().await.unwrap());
}

#[tokio::test]
async fn test_selection_follows_last_successful_resolution() {
    let (bus, _) = fake_bus(&[]);
    let mut service = service(bus);

    service.select_adapter("hci0").await.unwrap();
    service.select_adapter("hci1").await.unwrap();
    let result = service.select_adapter("hci9").await;

    assert!(matches!(result, Err(BluezError::NotFound { .. })));
    assert_eq!(service.selected_adapter().unwrap().path, HCI1);
}

#[tokio::test]
async fn test_operations_before_selection() {
    let (bus, _) = fake_bus(&[]);
    let service = service(bus);

    assert!(matches!(service.power_on().await, Err(BluezError::NoAdapterSelected)));
    assert!(matches!(
        service.devices(None, DeviceFilter::default()).await,
        Err(BluezError::NoAdapterSelected)
    ));
    assert!(matches!(service.unpair_all().await, Err(BluezError::NoAdapterSelected)));
}

#[tokio::test]
async fn test_set_name() {
    let (bus, store) = fake_bus(&[]);
    let mut service = service(bus);
    service.select_adapter("hci1").await.unwrap();

    service.set_name("lab-bench-3").await.unwrap();
    assert_eq!(service.name().await.unwrap(), "lab-bench-3");

    let stored = store.lock().unwrap();
    let hci0_alias = stored
        .get(&(HCI0.to_string(), "Alias".to_string()))
        .unwrap()
        .try_clone()
        .unwrap();
    assert_eq!(String::try_from(hci0_alias).unwrap(), "dut");
}

#[tokio::test]
async fn test_ensure_adapters_off() {
    let (bus, store) = fake_bus(&[]);
    {
        let mut props = store.lock().unwrap();
        props.insert((HCI0.to_string(), "Powered".to_string()), owned(true));
        props.insert((HCI1.to_string(), "Powered".to_string()), owned(true));
    }
    let mut service = service(bus);
    service.select_adapter("hci1").await.unwrap();

    service.ensure_adapters_off().await.unwrap();

    assert_eq!(service.selected_adapter().unwrap().path, HCI1);
    for adapter in service.adapters().await.unwrap() {
        let powered = store
            .lock()
            .unwrap()
            .get(&(adapter.path.clone(), "Powered".to_string()))
            .unwrap()
            .try_clone()
            .unwrap();
        assert!(!bool::try_from(powered).unwrap(), "{} still powered", adapter);
    }
}

#[tokio::test]
async fn test_enumerate_by_category_keeps_order() {
    let devices = [
        FakeDevice { address: "00:00:00:00:00:01", paired: false, class: 0x240404 },
        FakeDevice { address: "00:00:00:00:00:02", paired: false, class: 0x002540 },
        FakeDevice { address: "00:00:00:00:00:03", paired: true, class: 0x240418 },
        FakeDevice { address: "00:00:00:00:00:04", paired: false, class: 0x5a020c },
    ];
    let (bus, _) = fake_bus(&devices);
    let mut service = service(bus);
    service.select_adapter("hci0").await.unwrap();

    let audio = service
        .devices(Some(DeviceCategory::AudioVideo), DeviceFilter::default())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    let addresses: Vec<_> = audio.iter().map(|d| d.address.as_str()).collect();
    assert_eq!(addresses, vec!["00:00:00:00:00:01", "00:00:00:00:00:03"]);

    let paired_audio = service
        .devices(Some(DeviceCategory::AudioVideo), DeviceFilter::paired())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(paired_audio.len(), 1);
    assert_eq!(paired_audio[0].address, "00:00:00:00:00:03");
}

#[tokio::test]
async fn test_unpair_all_continues_after_failure() {
    let devices = [
        FakeDevice { address: "00:00:00:00:00:01", paired: true, class: 0x240404 },
        FakeDevice { address: "00:00:00:00:00:02", paired: true, class: 0x240404 },
        FakeDevice { address: "00:00:00:00:00:03", paired: false, class: 0x240404 },
        FakeDevice { address: "00:00:00:00:00:04", paired: true, class: 0x240404 },
    ];
    let stuck = owned(ObjectPath::try_from(devices[1].path()).unwrap());
    let (mut bus, _) = fake_bus(&devices);
    let attempts = Arc::new(Mutex::new(0usize));
    let recorded = attempts.clone();
    bus.expect_call_method()
        .withf(|path, interface, method, args| {
            path == HCI0
                && interface == ADAPTER_INTERFACE
                && method == "RemoveDevice"
                && args.len() == 1
        })
        .times(3)
        .returning(move |_, _, _, args| {
            *recorded.lock().unwrap() += 1;
            if args[0] == stuck {
                Err(ProxyError::DbusCallFailed("org.bluez.Error.Failed".into()))
            } else {
                Ok(Vec::new())
            }
        });
    let mut service = service(bus);
    service.select_adapter("hci0").await.unwrap();

    let report = service.unpair_all().await.unwrap();

    assert_eq!(*attempts.lock().unwrap(), 3);
    assert_eq!(report.unpaired, vec!["00:00:00:00:00:01", "00:00:00:00:00:04"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "00:00:00:00:00:02");
    assert!(matches!(report.failed[0].1, BluezError::UnpairFailed { .. }));
    assert!(!report.is_complete());
}

#[tokio::test]
async fn test_find_transport_absent() {
    let devices = [FakeDevice { address: "94:DB:56:83:CB:FF", paired: true, class: 0x240404 }];
    let (mut bus, _) = fake_bus(&devices);
    bus.expect_child_nodes().returning(|_| Ok(Vec::new()));
    let mut service = service(bus);
    service.select_adapter("hci0").await.unwrap();

    let device = service.find_device("94:DB:56:83:CB:FF").await.unwrap();
    let result = service.find_transport(&device).await;
    assert!(matches!(result, Err(BluezError::NotFound { kind: "transport", .. })));
}

#[tokio::test]
async fn test_denied_reads_are_not_an_empty_adapter() {
    let devices = [
        FakeDevice { address: "00:00:00:00:00:01", paired: true, class: 0x240404 },
        FakeDevice { address: "00:00:00:00:00:02", paired: true, class: 0x240404 },
    ];
    let device_paths: Vec<String> = devices.iter().map(FakeDevice::path).collect();
    let mut bus = MockBus::new();
    bus.expect_objects_with_interface()
        .returning(move |interface| match interface {
            ADAPTER_INTERFACE => Ok(vec![HCI0.to_string()]),
            _ => Ok(device_paths.clone()),
        });
    bus.expect_get_property().returning(|_, _, _| {
        Err(ProxyError::DbusCallFailed(
            "org.freedesktop.DBus.Error.AccessDenied".into(),
        ))
    });
    bus.expect_call_method().times(0);
    let mut service = service(bus);
    service.select_adapter("hci0").await.unwrap();

    let listed = service
        .devices(None, DeviceFilter::default())
        .await
        .unwrap()
        .collect()
        .await;
    assert!(matches!(listed, Err(BluezError::BusError(ProxyError::DbusCallFailed(_)))));

    let report = service.unpair_all().await;
    assert!(matches!(report, Err(BluezError::BusError(ProxyError::DbusCallFailed(_)))));
}
