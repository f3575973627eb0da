/*!
 # Command frame codec

 Pure functions turning logical intents (turn on, set RGB, set white, ...)
 plus a model's byte templates into concrete command frames. Frames are
 generally 9 bytes framed by 0x7e .. 0xef; templates mark payload positions
 with the 0xbb sentinel.
*/

use chrono::{Datelike, Timelike};
use tracing::warn;

use crate::model::ModelConfig;

/// Template byte substituted with a computed payload value at encode time
pub const SENTINEL: u8 = 0xbb;

/// Warm anchor for RGB color-temperature emulation (~1800K, orange)
const WARM_RGB: (f64, f64, f64) = (255.0, 138.0, 18.0);
/// Cool anchor for RGB color-temperature emulation (~7000K, blue-white)
const COOL_RGB: (f64, f64, f64) = (180.0, 220.0, 255.0);

/// How brightness writes are applied to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrightnessMode {
    /// Pick per hardware behavior (currently RGB rescaling)
    #[default]
    Auto,
    /// Rescale the last RGB color by the requested brightness
    Rgb,
    /// Use the native brightness command
    Native,
}

impl std::str::FromStr for BrightnessMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BrightnessMode::Auto),
            "rgb" => Ok(BrightnessMode::Rgb),
            "native" => Ok(BrightnessMode::Native),
            other => Err(format!("invalid brightness mode '{other}'")),
        }
    }
}

/// Per-channel RGB calibration gains applied to color writes.
///
/// Gains let host color picks better match the physical LED output; some
/// hardware (ELK-BLEDDM) ships with heavily unbalanced channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbGains {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for RgbGains {
    fn default() -> Self {
        RgbGains { r: 1.0, g: 1.0, b: 1.0 }
    }
}

impl RgbGains {
    /// Builds a gain triple, rejecting negative or non-finite components.
    pub fn new(r: f32, g: f32, b: f32) -> Option<RgbGains> {
        let valid = |v: f32| v.is_finite() && v >= 0.0;
        if valid(r) && valid(g) && valid(b) {
            Some(RgbGains { r, g, b })
        } else {
            warn!("Invalid RGB gains ({r}, {g}, {b}); keeping existing values");
            None
        }
    }

    /// Applies the gains to an RGB triple, saturating each channel.
    pub fn apply(&self, r: u8, g: u8, b: u8) -> (u8, u8, u8) {
        (
            clamp_byte(r as f32 * self.r),
            clamp_byte(g as f32 * self.g),
            clamp_byte(b as f32 * self.b),
        )
    }
}

/// Round-then-clip to 0..=255. Idempotent and saturating.
pub fn clamp_byte(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Copies a template, substituting the first sentinel with `value`.
/// Returns `None` when the template has no sentinel.
fn substitute(template: &[u8], value: u8) -> Option<Vec<u8>> {
    let index = template.iter().position(|&b| b == SENTINEL)?;
    let mut frame = template.to_vec();
    frame[index] = value;
    Some(frame)
}

/// White intensity frame. Intensity 0-255 is rescaled to a 0-100 percent
/// payload; a template without a sentinel falls back to the fixed shape.
pub fn white_frame(config: &ModelConfig, intensity: u8) -> Vec<u8> {
    let percent = (intensity as u32 * 100 / 255) as u8;
    substitute(config.white_cmd, percent)
        .unwrap_or_else(|| vec![0x7e, 0x00, 0x01, percent, 0x00, 0x00, 0x00, 0x00, 0xef])
}

/// Effect speed frame (raw 0-255 payload)
pub fn effect_speed_frame(config: &ModelConfig, value: u8) -> Vec<u8> {
    substitute(config.effect_speed_cmd, value)
        .unwrap_or_else(|| vec![0x7e, 0x00, 0x02, value, 0x00, 0x00, 0x00, 0x00, 0xef])
}

/// Effect selection frame
pub fn effect_frame(config: &ModelConfig, code: u8) -> Vec<u8> {
    substitute(config.effect_cmd, code)
        .unwrap_or_else(|| vec![0x7e, 0x00, 0x03, code, 0x03, 0x00, 0x00, 0x00, 0xef])
}

/// Native color temperature frame. The template carries two sentinel
/// positions substituted in template order (warm, then cold); fewer than
/// two falls back to the fixed shape.
pub fn color_temp_frame(config: &ModelConfig, warm: u8, cold: u8) -> Vec<u8> {
    let indices: Vec<usize> = config
        .color_temp_cmd
        .iter()
        .enumerate()
        .filter(|(_, &b)| b == SENTINEL)
        .map(|(i, _)| i)
        .collect();
    if indices.len() >= 2 {
        let mut frame = config.color_temp_cmd.to_vec();
        frame[indices[0]] = warm;
        frame[indices[1]] = cold;
        frame
    } else {
        vec![0x7e, 0x00, 0x04, warm, cold, 0x00, 0x00, 0x00, 0xef]
    }
}

/// RGB color frame with calibration gains applied
pub fn color_frame(r: u8, g: u8, b: u8, gains: &RgbGains) -> Vec<u8> {
    let (rr, gg, bb) = gains.apply(r, g, b);
    vec![0x7e, 0x00, 0x05, 0x03, rr, gg, bb, 0x00, 0xef]
}

/// Native brightness frame (0-255 rescaled to percent)
pub fn brightness_frame(value: u8) -> Vec<u8> {
    let percent = (value as u32 * 100 / 255) as u8;
    vec![0x7e, 0x04, 0x01, percent, 0xff, 0x00, 0xff, 0x00, 0xef]
}

/// Clamps a Kelvin value to the model's supported range
pub fn clamp_kelvin(config: &ModelConfig, value: u32) -> u32 {
    value.clamp(config.min_color_temp_k, config.max_color_temp_k)
}

/// Converts a Kelvin value to a 0-100 percent position in the model's range
pub fn kelvin_percent(config: &ModelConfig, value: u32) -> u8 {
    let value = clamp_kelvin(config, value);
    let (min, max) = (config.min_color_temp_k, config.max_color_temp_k);
    if max > min {
        ((value - min) * 100 / (max - min)) as u8
    } else {
        50
    }
}

/// Emulates a color temperature on RGB-only hardware.
///
/// Linear interpolation between the warm and cool anchors by the position of
/// `value` in the model's Kelvin range, then scaled by `brightness / 255`.
pub fn kelvin_to_rgb(config: &ModelConfig, value: u32, brightness: u8) -> (u8, u8, u8) {
    let value = clamp_kelvin(config, value);
    let (min, max) = (config.min_color_temp_k, config.max_color_temp_k);
    let t = if max > min {
        (value - min) as f64 / (max - min) as f64
    } else {
        1.0
    };

    let lerp = |warm: f64, cool: f64| warm + (cool - warm) * t;
    let scale = brightness as f64 / 255.0;
    (
        (lerp(WARM_RGB.0, COOL_RGB.0) * scale) as u8,
        (lerp(WARM_RGB.1, COOL_RGB.1) * scale) as u8,
        (lerp(WARM_RGB.2, COOL_RGB.2) * scale) as u8,
    )
}

/// Microphone effect frame. Valid codes are 0x80-0x87; anything else is
/// rejected with a warning and no frame.
pub fn mic_effect_frame(value: u8) -> Option<Vec<u8>> {
    if !(0x80..=0x87).contains(&value) {
        warn!("Invalid mic effect value: {value:#04x}, must be between 0x80 and 0x87");
        return None;
    }
    Some(vec![0x7e, 0x05, 0x03, value, 0x04, 0xff, 0xff, 0x00, 0xef])
}

/// Microphone sensitivity frame, valid range 0-100
pub fn mic_sensitivity_frame(value: u8) -> Option<Vec<u8>> {
    if value > 100 {
        warn!("Invalid mic sensitivity value: {value}, must be between 0 and 100");
        return None;
    }
    Some(vec![0x7e, 0x04, 0x06, value, 0xff, 0xff, 0xff, 0x00, 0xef])
}

/// External microphone enable/disable frame
pub fn mic_enable_frame(enabled: bool) -> Vec<u8> {
    let flag = if enabled { 0x01 } else { 0x00 };
    vec![0x7e, 0x04, 0x07, flag, 0xff, 0xff, 0xff, 0x00, 0xef]
}

/// Scheduler frame shared by the on and off variants. The day mask gains a
/// high bit when the schedule is enabled.
fn scheduler_frame(days: u8, hours: u8, minutes: u8, enabled: bool, off: u8) -> Vec<u8> {
    let hours = hours.min(23);
    let minutes = minutes.min(59);
    let mask = if enabled { days | 0x80 } else { days };
    vec![0x7e, 0x00, 0x82, hours, minutes, 0x00, off, mask, 0xef]
}

/// Schedule a daily turn-on
pub fn scheduler_on_frame(days: u8, hours: u8, minutes: u8, enabled: bool) -> Vec<u8> {
    scheduler_frame(days, hours, minutes, enabled, 0x00)
}

/// Schedule a daily turn-off
pub fn scheduler_off_frame(days: u8, hours: u8, minutes: u8, enabled: bool) -> Vec<u8> {
    scheduler_frame(days, hours, minutes, enabled, 0x01)
}

/// Time-of-day frame (day_of_week: 1 = Monday .. 7 = Sunday)
pub fn time_frame(hour: u8, minute: u8, second: u8, day_of_week: u8) -> Vec<u8> {
    vec![
        0x7e,
        0x00,
        0x83,
        hour.min(23),
        minute.min(59),
        second.min(59),
        day_of_week.clamp(1, 7),
        0x00,
        0xef,
    ]
}

/// Time frame for the local wall clock
pub fn sync_time_frame() -> Vec<u8> {
    let now = chrono::Local::now();
    time_frame(
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
        now.weekday().number_from_monday() as u8,
    )
}
