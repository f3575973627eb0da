/*!
 # btleplug transport

 Production [`Transport`] implementation over a btleplug `Peripheral`:
 establishes the link, resolves the model registry's characteristic UUID
 sets against the device, runs the per-family login handshake, and pumps
 inbound notifications onto the session's event channel.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::link::{LinkEvent, Transport};
use crate::{model, Error, Result};

/// Name prefixes whose hardware misbehaves when subscribed to notifications
const NOTIFY_EXCLUDED_PREFIXES: [&str; 2] = ["melk", "ledble"];
/// Name prefix requiring the two-frame login handshake after connect
const LOGIN_PREFIX: &str = "modelx";

pub struct BleTransport {
    peripheral: Peripheral,
    device_name: String,
    connected: Arc<AtomicBool>,
    write_char: parking_lot::Mutex<Option<Characteristic>>,
    read_char: parking_lot::Mutex<Option<Characteristic>>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl BleTransport {
    pub fn new(
        peripheral: Peripheral,
        device_name: impl Into<String>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Arc<BleTransport> {
        Arc::new(BleTransport {
            peripheral,
            device_name: device_name.into(),
            connected: Arc::new(AtomicBool::new(false)),
            write_char: parking_lot::Mutex::new(None),
            read_char: parking_lot::Mutex::new(None),
            events,
        })
    }

    /// Picks whichever known read/write characteristic the device actually
    /// declares. Both must resolve; anything else means the device is not
    /// one of ours.
    fn resolve_characteristics(&self) -> bool {
        let chars = self.peripheral.characteristics();
        for ch in &chars {
            debug!(
                "{}: Characteristic {} (properties: {:?})",
                self.device_name, ch.uuid, ch.properties
            );
        }

        let (read_uuids, write_uuids) = model::characteristic_uuids();
        let read = read_uuids
            .iter()
            .find_map(|uuid| chars.iter().find(|c| c.uuid == *uuid).cloned());
        let write = write_uuids
            .iter()
            .find_map(|uuid| chars.iter().find(|c| c.uuid == *uuid).cloned());

        if let Some(ref ch) = read {
            debug!("{}: Found read characteristic: {}", self.device_name, ch.uuid);
        } else {
            warn!(
                "{}: Could not find any read characteristic from: {read_uuids:?}",
                self.device_name
            );
        }
        if let Some(ref ch) = write {
            debug!("{}: Found write characteristic: {}", self.device_name, ch.uuid);
        } else {
            warn!(
                "{}: Could not find any write characteristic from: {write_uuids:?}",
                self.device_name
            );
        }

        let resolved = read.is_some() && write.is_some();
        *self.read_char.lock() = read;
        *self.write_char.lock() = write;
        resolved
    }

    fn notifications_excluded(&self) -> bool {
        let name = self.device_name.to_lowercase();
        NOTIFY_EXCLUDED_PREFIXES.iter().any(|p| name.starts_with(p))
    }

    /// Two probe writes with 1-second pauses; only the MODELX family needs
    /// this, and failures are logged rather than fatal.
    async fn login_handshake(&self) {
        if !self.device_name.to_lowercase().starts_with(LOGIN_PREFIX) {
            debug!("{}: Login command not needed", self.device_name);
            return;
        }
        debug!("{}: Executing login command", self.device_name);
        for frame in [&[0x7e, 0x07, 0x83][..], &[0x7e, 0x04, 0x04][..]] {
            if let Err(err) = self.raw_write(frame).await {
                warn!("{}: Error during login command: {err}", self.device_name);
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn raw_write(&self, frame: &[u8]) -> Result<()> {
        let characteristic = self
            .write_char
            .lock()
            .clone()
            .ok_or(Error::NotConnected)?;
        // Prefer acknowledged writes when the characteristic supports them
        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral.write(&characteristic, frame, write_type).await?;
        Ok(())
    }

    async fn subscribe_notifications(&self) {
        if self.notifications_excluded() {
            debug!(
                "{}: Skipping notification subscription for this hardware",
                self.device_name
            );
            return;
        }
        let Some(read_char) = self.read_char.lock().clone() else {
            return;
        };
        if let Err(err) = self.peripheral.subscribe(&read_char).await {
            warn!(
                "{}: Notifications could not be enabled: {err}",
                self.device_name
            );
            return;
        }
        let stream = match self.peripheral.notifications().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(
                    "{}: Notification stream unavailable: {err}",
                    self.device_name
                );
                return;
            }
        };
        info!("{}: Notifications enabled", self.device_name);

        // Pump inbound frames onto the session channel; the stream ending
        // means the link dropped
        let events = self.events.clone();
        let connected = Arc::clone(&self.connected);
        tokio::spawn(async move {
            let mut stream = stream;
            while let Some(notification) = stream.next().await {
                if events
                    .send(LinkEvent::Notification(notification.value))
                    .is_err()
                {
                    return;
                }
            }
            connected.store(false, Ordering::SeqCst);
            let _ = events.send(LinkEvent::Disconnected);
        });
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&self) -> Result<()> {
        if !self.peripheral.is_connected().await? {
            self.peripheral.connect().await?;
        }
        self.peripheral.discover_services().await?;

        let mut resolved = self.resolve_characteristics();
        if !resolved {
            // Services occasionally come back empty on the first pass
            debug!("{}: Re-discovering services", self.device_name);
            self.peripheral.discover_services().await?;
            resolved = self.resolve_characteristics();
        }
        if !resolved {
            *self.write_char.lock() = None;
            *self.read_char.lock() = None;
            let _ = self.peripheral.disconnect().await;
            return Err(Error::CharacteristicMissing);
        }

        self.connected.store(true, Ordering::SeqCst);
        self.login_handshake().await;
        self.subscribe_notifications().await;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        let read_char = self.read_char.lock().clone();
        if let Some(characteristic) = read_char {
            if !self.notifications_excluded() {
                let _ = self.peripheral.unsubscribe(&characteristic).await;
            }
        }
        *self.write_char.lock() = None;
        *self.read_char.lock() = None;
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn write(&self, frame: &[u8]) -> Result<()> {
        self.raw_write(frame).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn rssi(&self) -> Option<i16> {
        self.peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|props| props.rssi)
    }
}
