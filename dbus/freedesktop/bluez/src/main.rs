use anyhow::{bail, Context, Result};
use bluez_validation::config::Config;
use bluez_validation::interfaces::device::DeviceFilter;
use bluez_validation::profiles::ProfileUuid;
use bluez_validation::service::BluetoothService;
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use log::{error, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Bluetooth profile validation scenarios
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The bluetooth interface to use (e.g. hci0)
    #[arg(short, long)]
    interface: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Power on, unpair everything, then list devices and the profiles of the target
    Basic {
        /// Regex matched against device addresses
        #[arg(short, long)]
        target: String,
    },
    /// Print the profiles the adapter supports
    Profiles,
    /// Rename the adapter and check the new name sticks
    SetName {
        /// Name to set, random when omitted
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Control or read the adapter power state
    Power {
        #[arg(value_enum)]
        state: PowerArg,
    },
    /// Power off every adapter
    AdaptersOff,
    /// Pair with a device
    Pair {
        /// Address of the device
        #[arg(short, long)]
        target: String,
    },
    /// Unpair every paired device
    UnpairAll,
    /// Connect a profile on a device
    ConnectProfile {
        #[arg(short, long)]
        target: String,
        /// Profile alias (a2dp-source, a2dp-sink, hfp-hs, hfp-ag, hid, hogp) or uuid
        #[arg(short, long)]
        profile: String,
    },
    /// Stream a raw, already encoded file to a device's media transport
    Stream {
        #[arg(short, long)]
        target: String,
        #[arg(short, long, default_value = "a2dp-sink")]
        profile: String,
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PowerArg {
    On,
    Off,
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let interface = cli
        .interface
        .clone()
        .unwrap_or_else(|| config.default_adapter.clone());

    let mut service = BluetoothService::new(&config)
        .await
        .context("failed to connect to bluez")?;
    service
        .select_adapter(&interface)
        .await
        .with_context(|| format!("adapter {} not available", interface))?;

    run(&mut service, &config, cli.command).await
}

/// Runs one scenario. Every failure is logged here before being returned.
async fn run(service: &mut BluetoothService, config: &Config, command: Commands) -> Result<()> {
    let result = match command {
        Commands::Basic { target } => basic(service, config, &target).await,
        Commands::Profiles => show_adapter_profiles(service).await,
        Commands::SetName { name } => set_name(service, config, name).await,
        Commands::Power { state } => power(service, state).await,
        Commands::AdaptersOff => service.ensure_adapters_off().await.map_err(Into::into),
        Commands::Pair { target } => pair(service, &target).await,
        Commands::UnpairAll => unpair_all(service).await,
        Commands::ConnectProfile { target, profile } => {
            connect_profile(service, &target, &profile).await
        }
        Commands::Stream {
            target,
            profile,
            file,
        } => stream(service, &target, &profile, &file).await,
    };
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

async fn basic(service: &BluetoothService, config: &Config, target: &str) -> Result<()> {
    info!("starting bluetooth basic functional test");
    let target = Regex::new(target).context("invalid target pattern")?;
    if !service.power_state().await? {
        service.power_on().await?;
    }
    service.unpair_all().await?;
    tokio::time::sleep(config.settle_delay()).await;

    info!("test scan ...");
    let devices = service.devices(None, DeviceFilter::default()).await?;
    let mut devices = std::pin::pin!(devices.stream());
    while let Some(device) = devices.next().await {
        let device = device?;
        println!("{}", device);
        if target.is_match(&device.address) {
            info!("found target {}", device);
            print_profiles(&device.to_string(), &service.device_profiles(&device).await?);
        }
    }
    Ok(())
}

async fn pair(service: &BluetoothService, target: &str) -> Result<()> {
    let device = service.find_device(target).await?;
    service.pair(&device).await?;
    Ok(())
}

async fn unpair_all(service: &BluetoothService) -> Result<()> {
    let report = service.unpair_all().await?;
    for (address, e) in &report.failed {
        warn!("unpairing {} failed: {}", address, e);
    }
    Ok(())
}

async fn connect_profile(service: &BluetoothService, target: &str, profile: &str) -> Result<()> {
    let device = service.find_device(target).await?;
    let profile = ProfileUuid::from_alias(profile)?;
    service
        .connect_profile(&device, &profile)
        .await
        .context("profile connection failed")
}

async fn show_adapter_profiles(service: &BluetoothService) -> Result<()> {
    let profiles = service.adapter_profiles().await?;
    let adapter = service
        .selected_adapter()
        .map(ToString::to_string)
        .unwrap_or_default();
    print_profiles(&format!("adapter {}", adapter), &profiles);
    Ok(())
}

fn print_profiles<'a>(owner: &str, profiles: impl IntoIterator<Item = &'a ProfileUuid>) {
    println!("Supported profiles for {}:", owner);
    for profile in profiles {
        match profile.name() {
            Some(name) => println!(" - {} ({})", profile, name),
            None => println!(" - {}", profile),
        }
    }
}

async fn set_name(service: &BluetoothService, config: &Config, name: Option<String>) -> Result<()> {
    let original = service.name().await?;
    let name = name.unwrap_or_else(random_name);
    info!("attempting to set bluetooth name to {}", name);
    service.set_name(&name).await?;
    tokio::time::sleep(config.settle_delay()).await;
    let current = service.name().await?;
    if current != name && current == original {
        bail!("set bluetooth name failed, name is still {}", current);
    }
    info!("bluetooth name is now {}", current);
    Ok(())
}

/// `bt-` followed by five random lower-case letters.
fn random_name() -> String {
    let letters: String = uuid::Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(5)
        .map(|b| char::from(b'a' + b % 26))
        .collect();
    format!("bt-{}", letters)
}

async fn power(service: &BluetoothService, state: PowerArg) -> Result<()> {
    match state {
        PowerArg::On => service.power_on().await?,
        PowerArg::Off => service.power_off().await?,
        PowerArg::Status => {}
    }
    let on = service.power_state().await?;
    println!("Current power state: {}", if on { "on" } else { "off" });
    Ok(())
}

async fn stream(
    service: &BluetoothService,
    target: &str,
    profile: &str,
    file: &Path,
) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let device = service.find_device(target).await?;
    let profile = ProfileUuid::from_alias(profile)?;
    let path = service.find_transport_for_profile(&device, &profile).await?;
    let mut transport = service.acquire_transport(&path).await?;
    let written = transport.write_all_chunked(&data);
    service.release_transport(transport).await?;
    info!("streamed {} bytes to {}", written?, device);
    Ok(())
}
