//! Pair with a headset and connect its audio sink profile.
//!
//! Usage: cargo run --example pair_and_connect -- 94:DB:56:83:CB:FF

use bluez_validation::config::Config;
use bluez_validation::profiles::ProfileUuid;
use bluez_validation::service::BluetoothService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let address = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("missing device address"))?;

    let mut bluetooth_service = BluetoothService::new(&Config::default()).await?;
    bluetooth_service.select_adapter("hci0").await?;

    let device = bluetooth_service.find_device(&address).await?;
    if !device.paired {
        bluetooth_service.pair(&device).await?;
    }
    for profile in bluetooth_service.device_profiles(&device).await? {
        println!(" - {} {}", profile, profile.name().unwrap_or_default());
    }
    bluetooth_service
        .connect_profile(&device, &ProfileUuid::a2dp_sink())
        .await?;

    let transport = bluetooth_service.find_transport(&device).await?;
    println!("media transport: {}", transport);
    Ok(())
}
