/*!
 # Device discovery

 Resolves a BLE address (or any nearby supported strip) to a connectable
 peripheral handle plus its advertised name and signal strength. The session
 layer never scans; it is handed a [`FoundDevice`].
*/

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time;
use tracing::{debug, error, info};

use crate::{model, Error, Result};

/// Maximum time to wait for device discovery
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause between scan polls
const SCAN_POLL: Duration = Duration::from_millis(500);

/// A connectable peripheral resolved by discovery
pub struct FoundDevice {
    pub peripheral: Peripheral,
    /// Advertised local name, `"Unknown"` when the device does not report one
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
}

/// Gets the default Bluetooth adapter
async fn default_adapter() -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let manager = Manager::new().await?;
    let mut adapters = manager.adapters().await?;
    if adapters.is_empty() {
        error!("No Bluetooth adapters found");
        return Err(Error::NoBluetoothAdapters);
    }
    Ok(adapters.remove(0))
}

async fn scan<F>(mut accept: F) -> Result<Option<FoundDevice>>
where
    F: FnMut(&str, &str) -> bool,
{
    let central = default_adapter().await?;
    info!("Scanning for compatible BLE devices...");
    central.start_scan(ScanFilter::default()).await?;

    let start = std::time::Instant::now();
    let found = loop {
        let mut found = None;
        for peripheral in central.peripherals().await? {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let address = peripheral.address().to_string().to_lowercase();
            let id = peripheral.id().to_string().to_lowercase();
            debug!("Found device: {address} {name}");
            if accept(&name, &address) || accept(&name, &id) {
                found = Some(FoundDevice {
                    rssi: props.rssi,
                    address,
                    name,
                    peripheral,
                });
                break;
            }
        }
        if found.is_some() || start.elapsed() >= DISCOVERY_TIMEOUT {
            break found;
        }
        let remaining = DISCOVERY_TIMEOUT.saturating_sub(start.elapsed());
        info!(
            "Still scanning for a device... ({} seconds remaining)",
            remaining.as_secs()
        );
        time::sleep(SCAN_POLL).await;
    };

    central.stop_scan().await?;
    Ok(found)
}

/// Resolves a specific MAC address or platform peripheral id.
///
/// The advertised name is not required to match a supported prefix; model
/// resolution falls back to a best-effort default for unknown names.
pub async fn find_by_address(addr: &str) -> Result<FoundDevice> {
    let wanted = addr.to_lowercase();
    let found = scan(|_, address| address == wanted).await?;
    let device = found.ok_or_else(|| Error::DeviceNotFound(addr.to_string()))?;
    if model::supported_prefixes()
        .iter()
        .all(|p| !device.name.to_lowercase().starts_with(&p.to_lowercase()))
    {
        error!(
            "Device with a given address {addr} has an unrecognized name: {}",
            device.name
        );
    }
    info!(
        "Found device: {} ({}), RSSI {:?}",
        device.name, device.address, device.rssi
    );
    Ok(device)
}

/// Resolves the first nearby device advertising a supported name prefix.
pub async fn find_supported() -> Result<FoundDevice> {
    let prefixes = model::supported_prefixes();
    let found = scan(|name, _| {
        let name = name.to_lowercase();
        prefixes.iter().any(|p| name.starts_with(&p.to_lowercase()))
    })
    .await?;
    let device = found.ok_or_else(|| {
        error!(
            "No compatible LED device found within {} seconds",
            DISCOVERY_TIMEOUT.as_secs()
        );
        Error::DeviceNotFound("no supported device in range".to_string())
    })?;
    info!(
        "Found compatible device: {} ({}), RSSI {:?}",
        device.name, device.address, device.rssi
    );
    Ok(device)
}
