//! Basic example: power on the hci0 adapter using bluez-validation

use bluez_validation::config::Config;
use bluez_validation::service::BluetoothService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut bluetooth_service = BluetoothService::new(&Config::default()).await?;
    bluetooth_service.select_adapter("hci0").await?;
    bluetooth_service.power_on().await?;
    println!("powered: {}", bluetooth_service.power_state().await?);
    Ok(())
}
