/*!
 # Device session

 Composes the model registry, command codec, retry policy, connection
 manager and query prober into the object callers drive. The session owns
 the observed device state: the protocol has no write acknowledgment beyond
 best-effort notifications, so every successful write updates state
 optimistically, and inbound status notifications correct it when the
 hardware does answer.
*/

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::ble::BleTransport;
use crate::codec::{self, BrightnessMode, RgbGains};
use crate::discover::FoundDevice;
use crate::link::{Link, LinkEvent, Transport};
use crate::model::Model;
use crate::notify;
use crate::probe::{QueryCacheStore, QueryProber};
use crate::retry::retry;
use crate::Result;

/// Wait after the primary ELK-BLEDDM power-on before concluding the unit
/// wants the alternate byte layout
const VARIANT_CHECK_WINDOW: Duration = Duration::from_millis(300);

/// Session construction parameters; the §6-style calibration inputs plus
/// connection housekeeping.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle seconds before a voluntary disconnect; 0 keeps the link up
    pub disconnect_delay_secs: u64,
    /// Where detected status-query commands are persisted; `None` disables
    /// persistence (detection still works within the session)
    pub cache_path: Option<PathBuf>,
    /// Initial per-channel calibration; defaults to the model's gains
    pub rgb_gains: Option<RgbGains>,
    pub brightness_mode: BrightnessMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            disconnect_delay_secs: 120,
            cache_path: None,
            rgb_gains: None,
            brightness_mode: BrightnessMode::Auto,
        }
    }
}

/// Which power-command byte layout the session currently uses.
///
/// The swap is a session-local override resolved at encode time, never a
/// mutation of the shared model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerCommands {
    Primary,
    Alternate,
}

#[derive(Debug, Clone)]
struct ObservedState {
    is_on: Option<bool>,
    rgb_color: Option<(u8, u8, u8)>,
    brightness: u8,
    effect: Option<u8>,
    effect_speed: u8,
    color_temp_kelvin: Option<u32>,
    mic_effect: Option<u8>,
    mic_sensitivity: u8,
    mic_enabled: bool,
    rssi: Option<i16>,
}

impl Default for ObservedState {
    fn default() -> Self {
        ObservedState {
            is_on: None,
            rgb_color: None,
            brightness: 255,
            effect: None,
            effect_speed: 128,
            color_temp_kelvin: None,
            mic_effect: None,
            mic_sensitivity: 50,
            mic_enabled: false,
            rssi: None,
        }
    }
}

/// One logical session with one LED strip.
pub struct DeviceSession {
    address: String,
    name: String,
    model: Model,
    link: Arc<Link>,
    state: Arc<parking_lot::Mutex<ObservedState>>,
    responded: Arc<AtomicBool>,
    gains: RgbGains,
    brightness_mode: BrightnessMode,
    prober: QueryProber,
    power_cmds: PowerCommands,
    variant_checked: bool,
    pump: JoinHandle<()>,
}

impl DeviceSession {
    /// Opens a session over the btleplug transport for a discovered device.
    pub fn new(found: FoundDevice, config: SessionConfig) -> DeviceSession {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = BleTransport::new(found.peripheral, found.name.clone(), events_tx);
        let session = Self::with_transport(&found.address, &found.name, transport, events_rx, config);
        session.state.lock().rssi = found.rssi;
        session
    }

    /// Opens a session over any [`Transport`]. The transport must deliver
    /// its [`LinkEvent`]s on `events`.
    pub fn with_transport(
        address: &str,
        name: &str,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedReceiver<LinkEvent>,
        config: SessionConfig,
    ) -> DeviceSession {
        let model = Model::resolve(name);
        let model_config = model.config();
        info!(
            "{name}: Resolved model {} (turn on {:02x?})",
            model_config.name, model_config.turn_on_cmd
        );

        let gains = config.rgb_gains.unwrap_or_else(|| {
            let (r, g, b) = model_config.default_rgb_gains;
            RgbGains { r, g, b }
        });

        let link = Link::new(
            name,
            transport,
            Duration::from_secs(config.disconnect_delay_secs),
        );
        let state = Arc::new(parking_lot::Mutex::new(ObservedState::default()));
        let responded = Arc::new(AtomicBool::new(false));
        let pump = spawn_event_pump(
            events,
            Arc::clone(&state),
            Arc::clone(&responded),
            Arc::clone(&link),
            name.to_string(),
        );
        let store = config.cache_path.map(QueryCacheStore::new);

        DeviceSession {
            address: address.to_string(),
            name: name.to_string(),
            model,
            link,
            state,
            responded,
            gains,
            brightness_mode: config.brightness_mode,
            prober: QueryProber::new(name, model_config.name, store),
            power_cmds: PowerCommands::Primary,
            variant_checked: false,
            pump,
        }
    }

    // --- observed properties -------------------------------------------------

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// `None` until the first connect-or-update cycle completes
    pub fn is_on(&self) -> Option<bool> {
        self.state.lock().is_on
    }

    pub fn rgb_color(&self) -> Option<(u8, u8, u8)> {
        self.state.lock().rgb_color
    }

    pub fn brightness(&self) -> u8 {
        self.state.lock().brightness
    }

    pub fn effect(&self) -> Option<u8> {
        self.state.lock().effect
    }

    pub fn effect_speed(&self) -> u8 {
        self.state.lock().effect_speed
    }

    pub fn color_temp_kelvin(&self) -> Option<u32> {
        self.state.lock().color_temp_kelvin
    }

    pub fn min_color_temp_kelvin(&self) -> u32 {
        self.model.config().min_color_temp_k
    }

    pub fn max_color_temp_kelvin(&self) -> u32 {
        self.model.config().max_color_temp_k
    }

    pub fn mic_effect(&self) -> Option<u8> {
        self.state.lock().mic_effect
    }

    pub fn mic_sensitivity(&self) -> u8 {
        self.state.lock().mic_sensitivity
    }

    pub fn mic_enabled(&self) -> bool {
        self.state.lock().mic_enabled
    }

    pub fn rssi(&self) -> Option<i16> {
        self.state.lock().rssi
    }

    pub fn rgb_gains(&self) -> RgbGains {
        self.gains
    }

    pub fn brightness_mode(&self) -> BrightnessMode {
        self.brightness_mode
    }

    // --- calibration ---------------------------------------------------------

    /// Updates the per-channel gains; invalid triples keep the current ones.
    pub fn set_rgb_gains(&mut self, r: f32, g: f32, b: f32) {
        if let Some(gains) = RgbGains::new(r, g, b) {
            self.gains = gains;
        }
    }

    pub fn set_brightness_mode(&mut self, mode: BrightnessMode) {
        self.brightness_mode = mode;
    }

    // --- mutating operations -------------------------------------------------

    /// Encodes + writes one frame under the retry policy. `Ok(true)` means
    /// the write went out and optimistic state may be updated; `Ok(false)`
    /// means the broad-transient class exhausted its attempts and the
    /// operation was dropped as best-effort.
    async fn send_retry(&self, label: &'static str, frame: Vec<u8>) -> Result<bool> {
        let link = Arc::clone(&self.link);
        let outcome = retry(label, move || {
            let link = Arc::clone(&link);
            let frame = frame.clone();
            async move { link.send(&frame).await }
        })
        .await;
        Ok(outcome.into_result()?.is_some())
    }

    fn power_frame(&self, on: bool) -> &'static [u8] {
        let config = self.model.config();
        match (self.power_cmds, on) {
            (PowerCommands::Primary, true) => config.turn_on_cmd,
            (PowerCommands::Primary, false) => config.turn_off_cmd,
            (PowerCommands::Alternate, true) => config.alt_turn_on_cmd.unwrap_or(config.turn_on_cmd),
            (PowerCommands::Alternate, false) => {
                config.alt_turn_off_cmd.unwrap_or(config.turn_off_cmd)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn turn_on(&mut self) -> Result<()> {
        if self.model == Model::ElkBleddm && !self.variant_checked {
            return self.turn_on_with_variant_check().await;
        }
        if self.send_retry("turn_on", self.power_frame(true).to_vec()).await? {
            self.state.lock().is_on = Some(true);
        }
        Ok(())
    }

    /// Some ELK-BLEDDM units only accept the alternate power byte layout.
    /// The first power-on writes the primary command and, when no
    /// notification arrives inside the check window, swaps the session to
    /// the alternate commands permanently. Runs at most once per session.
    async fn turn_on_with_variant_check(&mut self) -> Result<()> {
        self.variant_checked = true;
        self.responded.store(false, Ordering::SeqCst);
        if !self.send_retry("turn_on", self.power_frame(true).to_vec()).await? {
            return Ok(());
        }
        tokio::time::sleep(VARIANT_CHECK_WINDOW).await;
        if !self.responded.load(Ordering::SeqCst) {
            debug!("{}: Primary cmd no response, trying alternate", self.name);
            self.power_cmds = PowerCommands::Alternate;
            if !self.send_retry("turn_on", self.power_frame(true).to_vec()).await? {
                return Ok(());
            }
        }
        self.state.lock().is_on = Some(true);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn turn_off(&mut self) -> Result<()> {
        if self.send_retry("turn_off", self.power_frame(false).to_vec()).await? {
            self.state.lock().is_on = Some(false);
        }
        Ok(())
    }

    /// Sets an RGB color; calibration gains apply to the wire bytes, the
    /// observed state keeps the requested triple.
    #[instrument(skip(self))]
    pub async fn set_color(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        let frame = codec::color_frame(r, g, b, &self.gains);
        if self.send_retry("set_color", frame).await? {
            self.state.lock().rgb_color = Some((r, g, b));
        }
        Ok(())
    }

    /// White intensity 0-255
    #[instrument(skip(self))]
    pub async fn set_white(&mut self, intensity: u8) -> Result<()> {
        let frame = codec::white_frame(self.model.config(), intensity);
        if self.send_retry("set_white", frame).await? {
            self.state.lock().brightness = intensity;
        }
        Ok(())
    }

    /// Brightness 0-255, applied per the configured [`BrightnessMode`]
    #[instrument(skip(self))]
    pub async fn set_brightness(&mut self, value: u8) -> Result<()> {
        match self.brightness_mode {
            BrightnessMode::Native => {
                if self.send_retry("set_brightness", codec::brightness_frame(value)).await? {
                    self.state.lock().brightness = value;
                }
            }
            // RGB-only hardware dims by rescaling the current color
            BrightnessMode::Auto | BrightnessMode::Rgb => {
                let (r, g, b) = self.state.lock().rgb_color.unwrap_or((255, 255, 255));
                let scale = value as f32 / 255.0;
                let frame = codec::color_frame(
                    codec::clamp_byte(r as f32 * scale),
                    codec::clamp_byte(g as f32 * scale),
                    codec::clamp_byte(b as f32 * scale),
                    &self.gains,
                );
                if self.send_retry("set_brightness", frame).await? {
                    self.state.lock().brightness = value;
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_effect(&mut self, code: u8) -> Result<()> {
        let frame = codec::effect_frame(self.model.config(), code);
        if self.send_retry("set_effect", frame).await? {
            self.state.lock().effect = Some(code);
        }
        Ok(())
    }

    /// Effect speed 0-255
    #[instrument(skip(self))]
    pub async fn set_effect_speed(&mut self, value: u8) -> Result<()> {
        let frame = codec::effect_speed_frame(self.model.config(), value);
        if self.send_retry("set_effect_speed", frame).await? {
            self.state.lock().effect_speed = value;
        }
        Ok(())
    }

    /// Native warm/cold position, 0-100
    #[instrument(skip(self))]
    pub async fn set_color_temp(&mut self, value: u8) -> Result<()> {
        let warm = value.min(100);
        let frame = codec::color_temp_frame(self.model.config(), warm, 100 - warm);
        self.send_retry("set_color_temp", frame).await?;
        Ok(())
    }

    /// Color temperature in Kelvin, clamped to the model's range.
    ///
    /// Tries the native dual-white command first; any failure of that path
    /// degrades to RGB emulation between the warm and cool anchors.
    #[instrument(skip(self))]
    pub async fn set_color_temp_kelvin(&mut self, value: u32, brightness: Option<u8>) -> Result<()> {
        let config = self.model.config();
        let kelvin = codec::clamp_kelvin(config, value);
        if kelvin != value {
            warn!(
                "{}: Color temperature {value} out of range ({}-{}), adjusting to {kelvin}",
                self.name, config.min_color_temp_k, config.max_color_temp_k
            );
        }
        let brightness = brightness.unwrap_or_else(|| self.state.lock().brightness);

        let warm = codec::kelvin_percent(config, kelvin);
        let brightness_percent = (brightness as u32 * 100 / 255) as u8;
        let native = codec::color_temp_frame(config, warm, brightness_percent);
        match self.link.send(&native).await {
            Ok(()) => {
                debug!("{}: Used native CCT command for {kelvin}K", self.name);
                let mut state = self.state.lock();
                state.color_temp_kelvin = Some(kelvin);
                state.brightness = brightness;
                return Ok(());
            }
            Err(err) => {
                debug!(
                    "{}: Native CCT command failed, falling back to RGB emulation: {err}",
                    self.name
                );
            }
        }

        let (r, g, b) = codec::kelvin_to_rgb(config, kelvin, brightness);
        debug!(
            "{}: RGB emulation for {kelvin}K: RGB({r}, {g}, {b}) at brightness {brightness}",
            self.name
        );
        self.set_color(r, g, b).await?;
        let mut state = self.state.lock();
        state.color_temp_kelvin = Some(kelvin);
        state.brightness = brightness;
        Ok(())
    }

    /// Microphone effect, valid codes 0x80-0x87; out-of-range values are
    /// rejected with a warning and nothing is written.
    #[instrument(skip(self))]
    pub async fn set_mic_effect(&mut self, value: u8) -> Result<()> {
        let Some(frame) = codec::mic_effect_frame(value) else {
            return Ok(());
        };
        if self.send_retry("set_mic_effect", frame).await? {
            self.state.lock().mic_effect = Some(value);
        }
        Ok(())
    }

    /// Microphone sensitivity 0-100
    #[instrument(skip(self))]
    pub async fn set_mic_sensitivity(&mut self, value: u8) -> Result<()> {
        let Some(frame) = codec::mic_sensitivity_frame(value) else {
            return Ok(());
        };
        if self.send_retry("set_mic_sensitivity", frame).await? {
            self.state.lock().mic_sensitivity = value;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn enable_mic(&mut self) -> Result<()> {
        if self.send_retry("enable_mic", codec::mic_enable_frame(true)).await? {
            self.state.lock().mic_enabled = true;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn disable_mic(&mut self) -> Result<()> {
        if self.send_retry("disable_mic", codec::mic_enable_frame(false)).await? {
            self.state.lock().mic_enabled = false;
        }
        Ok(())
    }

    /// Schedules a daily turn-on; `days` is a [`crate::WEEK_DAYS`] bitmask
    #[instrument(skip(self))]
    pub async fn set_scheduler_on(
        &mut self,
        days: u8,
        hours: u8,
        minutes: u8,
        enabled: bool,
    ) -> Result<()> {
        self.send_retry(
            "set_scheduler_on",
            codec::scheduler_on_frame(days, hours, minutes, enabled),
        )
        .await?;
        Ok(())
    }

    /// Schedules a daily turn-off
    #[instrument(skip(self))]
    pub async fn set_scheduler_off(
        &mut self,
        days: u8,
        hours: u8,
        minutes: u8,
        enabled: bool,
    ) -> Result<()> {
        self.send_retry(
            "set_scheduler_off",
            codec::scheduler_off_frame(days, hours, minutes, enabled),
        )
        .await?;
        Ok(())
    }

    /// Synchronizes the strip's internal clock with the local wall clock
    #[instrument(skip(self))]
    pub async fn sync_time(&mut self) -> Result<()> {
        self.send_retry("sync_time", codec::sync_time_frame()).await?;
        Ok(())
    }

    /// Sets an arbitrary time (day_of_week: 1 = Monday .. 7 = Sunday)
    #[instrument(skip(self))]
    pub async fn custom_time(
        &mut self,
        hour: u8,
        minute: u8,
        second: u8,
        day_of_week: u8,
    ) -> Result<()> {
        self.send_retry("custom_time", codec::time_frame(hour, minute, second, day_of_week))
            .await?;
        Ok(())
    }

    // --- polling -------------------------------------------------------------

    /// Periodic poll entry point. Never fails: one dead cycle must not
    /// disable future cycles, so every error degrades to "assume off" with
    /// a log line.
    #[instrument(skip(self))]
    pub async fn update(&mut self) {
        match self.link.ensure_connected().await {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    // The hardware mostly can't report state; seed documented
                    // defaults once and let notifications correct them
                    if state.is_on.is_none() {
                        state.is_on = Some(false);
                        state.rgb_color = Some((0, 0, 0));
                        state.color_temp_kelvin = Some(5000);
                        state.brightness = 255;
                    }
                }
                if self.link.is_connected() {
                    if let Some(rssi) = self.link.rssi().await {
                        self.state.lock().rssi = Some(rssi);
                    }
                    self.query_state().await;
                }
            }
            Err(err) => {
                self.state.lock().is_on = Some(false);
                error!("{}: Error getting status: {err}", self.name);
            }
        }
    }

    /// Issues the known status query, or runs auto-detection once.
    pub async fn query_state(&mut self) {
        self.prober.run(&self.link, &self.responded).await;
    }

    /// Tears the session down, bypassing the idle timer.
    pub async fn stop(&mut self) {
        self.link.stop().await;
        self.pump.abort();
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Consumes transport events: notifications feed the parser and flip the
/// response flag the prober and variant check watch; disconnect events are
/// classified as expected or not.
fn spawn_event_pump(
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
    state: Arc<parking_lot::Mutex<ObservedState>>,
    responded: Arc<AtomicBool>,
    link: Arc<Link>,
    name: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                LinkEvent::Notification(data) => {
                    responded.store(true, Ordering::SeqCst);
                    debug!(
                        "{name}: Notification received ({} bytes): {}",
                        data.len(),
                        data.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
                    );
                    if let Some(update) = notify::parse(&data) {
                        let mut observed = state.lock();
                        if let Some(power) = update.power {
                            observed.is_on = Some(power);
                        }
                        if let Some(rgb) = update.rgb {
                            observed.rgb_color = Some(rgb);
                        }
                        if let Some(brightness) = update.brightness {
                            observed.brightness = brightness;
                        }
                    }
                }
                LinkEvent::Disconnected => {
                    if link.is_expected_disconnect() {
                        debug!("{name}: Disconnected from device");
                    } else {
                        warn!("{name}: Device unexpectedly disconnected");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::MockTransport;
    use crate::{Error, WEEK_DAYS};

    fn session_for(name: &str, transport: &Arc<MockTransport>) -> DeviceSession {
        let events = transport.with_events();
        DeviceSession::with_transport(
            "be:58:a0:00:12:34",
            name,
            transport.clone(),
            events,
            SessionConfig {
                disconnect_delay_secs: 0,
                ..SessionConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn bleddm_swaps_to_alternate_when_silent() {
        let transport = MockTransport::new();
        let mut session = session_for("ELK-BLEDDM-1234", &transport);
        assert_eq!(session.model(), Model::ElkBleddm);

        session.turn_on().await.unwrap();
        let writes = transport.written();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], [0x7e, 0x04, 0x04, 0xf0, 0x00, 0x01, 0xff, 0x00, 0xef]);
        assert_eq!(writes[1], [0x7e, 0x00, 0x04, 0xf0, 0x00, 0x01, 0xff, 0x00, 0xef]);
        assert_eq!(session.is_on(), Some(true));

        // Subsequent power commands stay on the alternate layout
        session.turn_off().await.unwrap();
        let writes = transport.written();
        assert_eq!(writes[2], [0x7e, 0x00, 0x04, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef]);

        // The check never runs again
        session.turn_on().await.unwrap();
        assert_eq!(transport.written().len(), 4);
        assert_eq!(
            transport.written()[3],
            [0x7e, 0x00, 0x04, 0xf0, 0x00, 0x01, 0xff, 0x00, 0xef]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bleddm_keeps_primary_when_device_answers() {
        let transport = MockTransport::new();
        *transport.responder.lock() = Some(Box::new(|frame| {
            // Unit acknowledges the primary power-on
            if frame[1] == 0x04 {
                Some(vec![0x7e, 0x00, 0x01, 0x23, 0xff, 0xff, 0xff, 0xff, 0xef])
            } else {
                None
            }
        }));
        let mut session = session_for("ELK-BLEDDM-1234", &transport);

        session.turn_on().await.unwrap();
        assert_eq!(transport.written().len(), 1);
        session.turn_off().await.unwrap();
        assert_eq!(
            transport.written()[1],
            [0x7e, 0x04, 0x04, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef]
        );
    }

    #[tokio::test]
    async fn writes_are_optimistically_reflected() {
        let transport = MockTransport::new();
        let mut session = session_for("ELK-BLE-77", &transport);

        session.set_color(10, 20, 30).await.unwrap();
        assert_eq!(session.rgb_color(), Some((10, 20, 30)));
        assert_eq!(
            transport.written()[0],
            [0x7e, 0x00, 0x05, 0x03, 10, 20, 30, 0x00, 0xef]
        );

        session.set_effect(0x8a).await.unwrap();
        assert_eq!(session.effect(), Some(0x8a));
        session.set_effect_speed(44).await.unwrap();
        assert_eq!(session.effect_speed(), 44);
        session.set_white(128).await.unwrap();
        assert_eq!(session.brightness(), 128);
        session.enable_mic().await.unwrap();
        assert!(session.mic_enabled());
    }

    #[tokio::test]
    async fn bleddm_gains_shape_color_writes() {
        let transport = MockTransport::new();
        let mut session = session_for("ELK-BLEDDM-1234", &transport);
        session.variant_checked = true;

        session.set_color(200, 100, 100).await.unwrap();
        let frame = &transport.written()[0];
        assert_eq!(frame[4], 200); // gain 1.00
        assert_eq!(frame[5], 88); // gain 0.88
        assert_eq!(frame[6], 38); // gain 0.38
        // Observed state keeps the requested color, not the wire bytes
        assert_eq!(session.rgb_color(), Some((200, 100, 100)));
    }

    #[tokio::test]
    async fn swallowed_write_leaves_state_untouched() {
        let transport = MockTransport::new();
        *transport.fail_write_with.lock() =
            Some(|| Error::Transport(btleplug::Error::NoSuchCharacteristic));
        let mut session = session_for("ELK-BLE-77", &transport);

        // Broad transient class exhausts and is swallowed
        session.turn_on().await.unwrap();
        assert_eq!(session.is_on(), None);
    }

    #[tokio::test]
    async fn mic_validation_rejects_without_writing() {
        let transport = MockTransport::new();
        let mut session = session_for("ELK-BLE-77", &transport);

        session.set_mic_effect(0x10).await.unwrap();
        session.set_mic_sensitivity(200).await.unwrap();
        assert!(transport.written().is_empty());
        assert_eq!(session.mic_effect(), None);

        session.set_mic_effect(0x81).await.unwrap();
        assert_eq!(session.mic_effect(), Some(0x81));
    }

    #[tokio::test(start_paused = true)]
    async fn update_seeds_defaults_once_and_never_fails() {
        let transport = MockTransport::new();
        let mut session = session_for("LEDBLE-01", &transport);
        assert_eq!(session.is_on(), None);

        session.update().await;
        assert_eq!(session.is_on(), Some(false));
        assert_eq!(session.rgb_color(), Some((0, 0, 0)));
        assert_eq!(session.color_temp_kelvin(), Some(5000));
        assert_eq!(session.brightness(), 255);
        assert_eq!(session.rssi(), Some(-60));

        session.set_color(1, 2, 3).await.unwrap();
        session.update().await;
        // Subsequent cycles leave state alone
        assert_eq!(session.rgb_color(), Some((1, 2, 3)));
    }

    #[tokio::test]
    async fn update_degrades_to_assume_off_on_failure() {
        let transport = MockTransport::new();
        *transport.fail_connect_with.lock() =
            Some(|| Error::Transport(btleplug::Error::DeviceNotFound));
        let mut session = session_for("ELK-BLE-77", &transport);

        session.update().await;
        assert_eq!(session.is_on(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_correct_observed_state() {
        let transport = MockTransport::new();
        let mut session = session_for("ELK-BLE-77", &transport);
        session.update().await;

        transport.emit(LinkEvent::Notification(vec![
            0x7e, 0x00, 0x01, 0xf0, 30, 40, 50, 50, 0xef,
        ]));
        // The paused clock only advances once the pump task is idle
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(session.is_on(), Some(true));
        assert_eq!(session.rgb_color(), Some((30, 40, 50)));
        assert_eq!(session.brightness(), 127);

        // Garbage still counts as "responded" but changes nothing
        transport.emit(LinkEvent::Notification(vec![0x42]));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(session.rgb_color(), Some((30, 40, 50)));
    }

    #[tokio::test]
    async fn scheduler_and_time_frames_hit_the_wire() {
        let transport = MockTransport::new();
        let mut session = session_for("ELK-BLE-77", &transport);

        session
            .set_scheduler_on(WEEK_DAYS.week_days, 8, 30, true)
            .await
            .unwrap();
        session.custom_time(13, 37, 0, 3).await.unwrap();
        let writes = transport.written();
        assert_eq!(writes[0], [0x7e, 0x00, 0x82, 8, 30, 0x00, 0x00, 0x9f, 0xef]);
        assert_eq!(writes[1], [0x7e, 0x00, 0x83, 13, 37, 0, 3, 0x00, 0xef]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_disconnects_unconditionally() {
        let transport = MockTransport::new();
        let mut session = session_for("ELK-BLE-77", &transport);
        session.update().await;
        assert!(transport.is_connected());

        session.stop().await;
        assert!(!transport.is_connected());
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn brightness_modes_pick_their_frames() {
        let transport = MockTransport::new();
        let mut session = session_for("ELK-BLE-77", &transport);

        session.set_brightness_mode(BrightnessMode::Native);
        session.set_brightness(255).await.unwrap();
        assert_eq!(
            transport.written()[0],
            [0x7e, 0x04, 0x01, 100, 0xff, 0x00, 0xff, 0x00, 0xef]
        );

        session.set_brightness_mode(BrightnessMode::Rgb);
        session.set_color(200, 100, 50).await.unwrap();
        session.set_brightness(51).await.unwrap();
        let frame = &transport.written()[2];
        // Last color rescaled by 51/255
        assert_eq!(&frame[4..7], &[40, 20, 10]);
        assert_eq!(session.brightness(), 51);
    }

    #[tokio::test(start_paused = true)]
    async fn kelvin_setter_emulates_rgb_when_native_write_fails() {
        let transport = MockTransport::new();
        let mut session = session_for("ELK-BLE-77", &transport);

        // Native CCT write succeeds
        session.set_color_temp_kelvin(7000, Some(255)).await.unwrap();
        assert_eq!(
            transport.written()[0],
            [0x7e, 0x00, 0x05, 0x02, 100, 100, 0x00, 0x00, 0xef]
        );
        assert_eq!(session.color_temp_kelvin(), Some(7000));

        // Kelvin clamps into the model range
        session.set_color_temp_kelvin(500, Some(255)).await.unwrap();
        assert_eq!(session.color_temp_kelvin(), Some(1800));

        // A failing native write degrades to RGB emulation without raising
        *transport.fail_write_with.lock() =
            Some(|| Error::Transport(btleplug::Error::NotConnected));
        session.set_color_temp_kelvin(3000, Some(255)).await.unwrap();
        assert_eq!(session.color_temp_kelvin(), Some(3000));
    }
}
