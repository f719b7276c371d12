//! Basic example: list the devices known to hci0 using bluez-validation

use bluez_validation::config::Config;
use bluez_validation::interfaces::device::DeviceFilter;
use bluez_validation::service::BluetoothService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut bluetooth_service = BluetoothService::new(&Config::default()).await?;
    bluetooth_service.select_adapter("hci0").await?;

    let devices = match bluetooth_service.devices(None, DeviceFilter::default()).await {
        Ok(devices) => devices,
        Err(e) => {
            eprintln!("Error getting devices: {e}");
            return Ok(());
        }
    };

    for device in devices.collect().await? {
        println!(
            "Known Bluetooth device: {} paired={} category={:?}",
            device,
            device.paired,
            device.category()
        );
    }

    Ok(())
}
