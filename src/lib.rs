/*!
 # BLEDOM session driver

 A Rust library for driving ELK-BLEDOM family Bluetooth LED strips through
 their vendor-varying binary protocol. Supports the ELK-BLEDDM, ELK-BLE,
 LEDBLE, MELK-OG10, MELK, ELK-BULB2, ELK-BULB and ELK-LAMPL hardware
 dialects.

 ## Features

 * Model dispatch by advertised device name
 * Resilient connection lifecycle with bounded retry and idle disconnect
 * Power, RGB color, white, brightness, effect and effect speed control
 * Color temperature (native dual-white or RGB emulation)
 * Per-channel RGB calibration gains
 * Microphone reactivity commands
 * Scheduling and time synchronization
 * Persistent auto-detection of a working status-query command

 ## Example

 ```rust,no_run
 use bledom_driver::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     // Resolve a nearby peripheral and open a session
     let found = discover::find_by_address("be:58:a0:00:12:34").await?;
     let mut session = DeviceSession::new(found, SessionConfig::default());

     // Basic operations
     session.turn_on().await?;
     session.set_color(255, 0, 0).await?; // Set to red
     session.set_brightness(200).await?;

     session.stop().await;
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Error taxonomy for the BLEDOM session driver
#[derive(Error, Debug)]
pub enum Error {
    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// Address could not be resolved to a reachable peripheral
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Connected, but no known read/write characteristic pair exists
    #[error("Failed to find supported characteristics, device may not be supported")]
    CharacteristicMissing,

    /// Connection attempt exceeded the transport timeout
    #[error("Connection attempt timed out")]
    ConnectionTimeout,

    /// The BLE link dropped mid-operation
    #[error("Not connected to device")]
    NotConnected,

    /// Error from btleplug
    #[error(transparent)]
    Transport(#[from] btleplug::Error),

    /// Query cache file could not be read or written
    #[error("Query cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// Re-export modules
pub mod ble;
pub mod codec;
pub mod discover;
pub mod effects;
pub mod link;
pub mod model;
pub mod notify;
pub mod probe;
pub mod retry;
pub mod schedule;
pub mod session;

// Re-export key types
pub use codec::{BrightnessMode, RgbGains};
pub use discover::FoundDevice;
pub use effects::{Effects, MicEffects, EFFECTS, MIC_EFFECTS};
pub use model::{Model, ModelConfig};
pub use schedule::{Days, WEEK_DAYS};
pub use session::{DeviceSession, SessionConfig};
