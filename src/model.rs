/*!
 # Hardware model registry

 Static per-model wire-protocol parameters for every supported LED strip
 family. A model is resolved once from the advertised device name and its
 configuration drives characteristic lookup and command encoding.
*/

use uuid::{uuid, Uuid};

/// 0xfff3/0xfff4 characteristic pair used by most ELK hardware
pub const CHAR_FFF3_WRITE: Uuid = uuid!("0000fff3-0000-1000-8000-00805f9b34fb");
pub const CHAR_FFF4_READ: Uuid = uuid!("0000fff4-0000-1000-8000-00805f9b34fb");
/// 0xffe1/0xffe2 pair used by LEDBLE hardware
pub const CHAR_FFE1_WRITE: Uuid = uuid!("0000ffe1-0000-1000-8000-00805f9b34fb");
pub const CHAR_FFE2_READ: Uuid = uuid!("0000ffe2-0000-1000-8000-00805f9b34fb");

/// Supported hardware families, in registry order.
///
/// Order matters for prefix resolution: longer prefixes shadow their shorter
/// siblings (`ELK-BLEDDM` before `ELK-BLE`, `MELK-OG10` before `MELK`,
/// `ELK-BULB2` before `ELK-BULB`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    ElkBleddm,
    ElkBle,
    LedBle,
    MelkOg10,
    Melk,
    ElkBulb2,
    ElkBulb,
    ElkLampl,
}

/// Configuration for a specific LED strip model
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Advertised name prefix and human-readable model name
    pub name: &'static str,
    /// UUID of the write characteristic
    pub write_uuid: Uuid,
    /// UUID of the notify-capable read characteristic
    pub read_uuid: Uuid,
    /// Command to turn the device on
    pub turn_on_cmd: &'static [u8],
    /// Command to turn the device off
    pub turn_off_cmd: &'static [u8],
    /// White intensity template (0xbb marks the payload byte)
    pub white_cmd: &'static [u8],
    /// Effect speed template
    pub effect_speed_cmd: &'static [u8],
    /// Effect selection template
    pub effect_cmd: &'static [u8],
    /// Color temperature template (two 0xbb positions: warm, then cold)
    pub color_temp_cmd: &'static [u8],
    /// Minimum supported color temperature in Kelvin
    pub min_color_temp_k: u32,
    /// Maximum supported color temperature in Kelvin
    pub max_color_temp_k: u32,
    /// Default per-channel RGB gains (1.0 = no adjustment)
    pub default_rgb_gains: (f32, f32, f32),
    /// Alternate power commands for hardware sub-variants
    pub alt_turn_on_cmd: Option<&'static [u8]>,
    pub alt_turn_off_cmd: Option<&'static [u8]>,
}

static ELK_BLEDDM: ModelConfig = ModelConfig {
    name: "ELK-BLEDDM",
    write_uuid: CHAR_FFF3_WRITE,
    read_uuid: CHAR_FFF4_READ,
    turn_on_cmd: &[0x7e, 0x04, 0x04, 0xf0, 0x00, 0x01, 0xff, 0x00, 0xef],
    turn_off_cmd: &[0x7e, 0x04, 0x04, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef],
    white_cmd: &[0x7e, 0x00, 0x01, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_speed_cmd: &[0x7e, 0x00, 0x02, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_cmd: &[0x7e, 0x00, 0x03, 0xbb, 0x03, 0x00, 0x00, 0x00, 0xef],
    color_temp_cmd: &[0x7e, 0x00, 0x05, 0x02, 0xbb, 0xbb, 0x00, 0x00, 0xef],
    min_color_temp_k: 1800,
    max_color_temp_k: 7000,
    default_rgb_gains: (1.00, 0.88, 0.38),
    // Some ELK-BLEDDM units use 0x00 instead of 0x04 as the second byte
    alt_turn_on_cmd: Some(&[0x7e, 0x00, 0x04, 0xf0, 0x00, 0x01, 0xff, 0x00, 0xef]),
    alt_turn_off_cmd: Some(&[0x7e, 0x00, 0x04, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef]),
};

static ELK_BLE: ModelConfig = ModelConfig {
    name: "ELK-BLE",
    write_uuid: CHAR_FFF3_WRITE,
    read_uuid: CHAR_FFF4_READ,
    turn_on_cmd: &[0x7e, 0x00, 0x04, 0xf0, 0x00, 0x01, 0xff, 0x00, 0xef],
    turn_off_cmd: &[0x7e, 0x00, 0x04, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef],
    white_cmd: &[0x7e, 0x00, 0x01, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_speed_cmd: &[0x7e, 0x00, 0x02, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_cmd: &[0x7e, 0x00, 0x03, 0xbb, 0x03, 0x00, 0x00, 0x00, 0xef],
    color_temp_cmd: &[0x7e, 0x00, 0x05, 0x02, 0xbb, 0xbb, 0x00, 0x00, 0xef],
    min_color_temp_k: 1800,
    max_color_temp_k: 7000,
    default_rgb_gains: (1.0, 1.0, 1.0),
    alt_turn_on_cmd: None,
    alt_turn_off_cmd: None,
};

static LEDBLE: ModelConfig = ModelConfig {
    name: "LEDBLE",
    write_uuid: CHAR_FFE1_WRITE,
    read_uuid: CHAR_FFE2_READ,
    turn_on_cmd: &[0x7e, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0xef],
    turn_off_cmd: &[0x7e, 0x00, 0x04, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef],
    white_cmd: &[0x7e, 0x00, 0x01, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_speed_cmd: &[0x7e, 0x00, 0x02, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_cmd: &[0x7e, 0x00, 0x03, 0xbb, 0x03, 0x00, 0x00, 0x00, 0xef],
    color_temp_cmd: &[0x7e, 0x00, 0x05, 0x02, 0xbb, 0xbb, 0x00, 0x00, 0xef],
    min_color_temp_k: 1800,
    max_color_temp_k: 7000,
    default_rgb_gains: (1.0, 1.0, 1.0),
    alt_turn_on_cmd: None,
    alt_turn_off_cmd: None,
};

static MELK_OG10: ModelConfig = ModelConfig {
    name: "MELK-OG10",
    write_uuid: CHAR_FFF3_WRITE,
    read_uuid: CHAR_FFF4_READ,
    turn_on_cmd: &[0x7e, 0x07, 0x04, 0xff, 0x00, 0x01, 0x02, 0x01, 0xef],
    turn_off_cmd: &[0x7e, 0x07, 0x04, 0x00, 0x00, 0x00, 0x02, 0x00, 0xef],
    // 8-byte frame, no trailing 0xef on this dialect
    white_cmd: &[0x7e, 0x07, 0x05, 0x01, 0xbb, 0xff, 0x02, 0x01],
    effect_speed_cmd: &[0x7e, 0x04, 0x02, 0xbb, 0xff, 0xff, 0xff, 0x00, 0xef],
    effect_cmd: &[0x7e, 0x05, 0x03, 0xbb, 0x06, 0xff, 0xff, 0x00, 0xef],
    color_temp_cmd: &[0x7e, 0x06, 0x05, 0x02, 0xbb, 0xbb, 0xff, 0x08, 0xef],
    min_color_temp_k: 1800,
    max_color_temp_k: 7000,
    default_rgb_gains: (1.0, 1.0, 1.0),
    alt_turn_on_cmd: None,
    alt_turn_off_cmd: None,
};

static MELK: ModelConfig = ModelConfig {
    name: "MELK",
    write_uuid: CHAR_FFF3_WRITE,
    read_uuid: CHAR_FFF4_READ,
    turn_on_cmd: &[0x7e, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0xef],
    turn_off_cmd: &[0x7e, 0x00, 0x04, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef],
    white_cmd: &[0x7e, 0x00, 0x01, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_speed_cmd: &[0x7e, 0x04, 0x02, 0xbb, 0xff, 0xff, 0xff, 0x00, 0xef],
    effect_cmd: &[0x7e, 0x05, 0x03, 0xbb, 0x06, 0xff, 0xff, 0x00, 0xef],
    color_temp_cmd: &[0x7e, 0x06, 0x05, 0x02, 0xbb, 0xbb, 0xff, 0x08, 0xef],
    min_color_temp_k: 1800,
    max_color_temp_k: 7000,
    default_rgb_gains: (1.0, 1.0, 1.0),
    alt_turn_on_cmd: None,
    alt_turn_off_cmd: None,
};

static ELK_BULB2: ModelConfig = ModelConfig {
    name: "ELK-BULB2",
    write_uuid: CHAR_FFF3_WRITE,
    read_uuid: CHAR_FFF4_READ,
    turn_on_cmd: &[0x7e, 0x00, 0x04, 0xf0, 0x00, 0x01, 0xff, 0x00, 0xef],
    turn_off_cmd: &[0x7e, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0xef],
    white_cmd: &[0x7e, 0x00, 0x01, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_speed_cmd: &[0x7e, 0x00, 0x02, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_cmd: &[0x7e, 0x00, 0x03, 0xbb, 0x03, 0x00, 0x00, 0x00, 0xef],
    color_temp_cmd: &[0x7e, 0x00, 0x05, 0x02, 0xbb, 0xbb, 0x00, 0x00, 0xef],
    min_color_temp_k: 1800,
    max_color_temp_k: 7000,
    default_rgb_gains: (1.0, 1.0, 1.0),
    alt_turn_on_cmd: None,
    alt_turn_off_cmd: None,
};

static ELK_BULB: ModelConfig = ModelConfig {
    name: "ELK-BULB",
    write_uuid: CHAR_FFF3_WRITE,
    read_uuid: CHAR_FFF4_READ,
    turn_on_cmd: &[0x7e, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0xef],
    turn_off_cmd: &[0x7e, 0x00, 0x04, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef],
    white_cmd: &[0x7e, 0x00, 0x01, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_speed_cmd: &[0x7e, 0x00, 0x02, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_cmd: &[0x7e, 0x00, 0x03, 0xbb, 0x03, 0x00, 0x00, 0x00, 0xef],
    color_temp_cmd: &[0x7e, 0x00, 0x05, 0x02, 0xbb, 0xbb, 0x00, 0x00, 0xef],
    min_color_temp_k: 1800,
    max_color_temp_k: 7000,
    default_rgb_gains: (1.0, 1.0, 1.0),
    alt_turn_on_cmd: None,
    alt_turn_off_cmd: None,
};

static ELK_LAMPL: ModelConfig = ModelConfig {
    name: "ELK-LAMPL",
    write_uuid: CHAR_FFF3_WRITE,
    read_uuid: CHAR_FFF4_READ,
    turn_on_cmd: &[0x7e, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0xef],
    turn_off_cmd: &[0x7e, 0x00, 0x04, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef],
    white_cmd: &[0x7e, 0x00, 0x01, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_speed_cmd: &[0x7e, 0x00, 0x02, 0xbb, 0x00, 0x00, 0x00, 0x00, 0xef],
    effect_cmd: &[0x7e, 0x00, 0x03, 0xbb, 0x03, 0x00, 0x00, 0x00, 0xef],
    color_temp_cmd: &[0x7e, 0x00, 0x05, 0x02, 0xbb, 0xbb, 0x00, 0x00, 0xef],
    min_color_temp_k: 1800,
    max_color_temp_k: 7000,
    default_rgb_gains: (1.0, 1.0, 1.0),
    alt_turn_on_cmd: None,
    alt_turn_off_cmd: None,
};

impl Model {
    /// All registered models, in resolution order
    pub const ALL: [Model; 8] = [
        Model::ElkBleddm,
        Model::ElkBle,
        Model::LedBle,
        Model::MelkOg10,
        Model::Melk,
        Model::ElkBulb2,
        Model::ElkBulb,
        Model::ElkLampl,
    ];

    /// Returns the immutable configuration record for this model
    pub fn config(self) -> &'static ModelConfig {
        match self {
            Model::ElkBleddm => &ELK_BLEDDM,
            Model::ElkBle => &ELK_BLE,
            Model::LedBle => &LEDBLE,
            Model::MelkOg10 => &MELK_OG10,
            Model::Melk => &MELK,
            Model::ElkBulb2 => &ELK_BULB2,
            Model::ElkBulb => &ELK_BULB,
            Model::ElkLampl => &ELK_LAMPL,
        }
    }

    /// Resolves a model from an advertised device name.
    ///
    /// Case-insensitive prefix match, first hit in registry order wins. An
    /// unmatched or empty name falls back to the first registered model so
    /// resolution never fails; the result is a best-effort default.
    pub fn resolve(device_name: &str) -> Model {
        let name_lower = device_name.to_lowercase();
        for model in Model::ALL {
            if name_lower.starts_with(&model.config().name.to_lowercase()) {
                return model;
            }
        }
        tracing::warn!(
            "Unknown device model '{}', using default configuration",
            device_name
        );
        Model::ALL[0]
    }

    pub fn name(self) -> &'static str {
        self.config().name
    }
}

/// Supported device name prefixes, in registry order
pub fn supported_prefixes() -> Vec<&'static str> {
    Model::ALL.iter().map(|m| m.config().name).collect()
}

/// Deduplicated (read, write) characteristic UUID sets across all models.
///
/// Characteristic resolution tries each member of a set against the
/// connected device and uses whichever is actually present.
pub fn characteristic_uuids() -> (Vec<Uuid>, Vec<Uuid>) {
    let mut read = Vec::new();
    let mut write = Vec::new();
    for model in Model::ALL {
        let config = model.config();
        if !read.contains(&config.read_uuid) {
            read.push(config.read_uuid);
        }
        if !write.contains(&config.write_uuid) {
            write.push(config.write_uuid);
        }
    }
    (read, write)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_registered_prefix() {
        for model in Model::ALL {
            let name = format!("{}-1234", model.config().name);
            assert_eq!(Model::resolve(&name), model, "prefix {name}");
            assert_eq!(Model::resolve(&name.to_lowercase()), model);
        }
    }

    #[test]
    fn longer_prefixes_win_over_shorter_siblings() {
        assert_eq!(Model::resolve("ELK-BLEDDM-0042"), Model::ElkBleddm);
        assert_eq!(Model::resolve("ELK-BLE42"), Model::ElkBle);
        assert_eq!(Model::resolve("MELK-OG10 strip"), Model::MelkOg10);
        assert_eq!(Model::resolve("MELK-XYZ"), Model::Melk);
        assert_eq!(Model::resolve("ELK-BULB2X"), Model::ElkBulb2);
        assert_eq!(Model::resolve("ELK-BULBY"), Model::ElkBulb);
    }

    #[test]
    fn unmatched_name_falls_back_to_first_entry() {
        assert_eq!(Model::resolve("TRIONES-778899"), Model::ElkBleddm);
        assert_eq!(Model::resolve(""), Model::ElkBleddm);
    }

    #[test]
    fn uuid_sets_are_deduplicated() {
        let (read, write) = characteristic_uuids();
        assert_eq!(read, vec![CHAR_FFF4_READ, CHAR_FFE2_READ]);
        assert_eq!(write, vec![CHAR_FFF3_WRITE, CHAR_FFE1_WRITE]);
    }

    #[test]
    fn only_bleddm_declares_variant_commands() {
        for model in Model::ALL {
            let config = model.config();
            let has_alt = config.alt_turn_on_cmd.is_some() || config.alt_turn_off_cmd.is_some();
            assert_eq!(has_alt, model == Model::ElkBleddm);
        }
    }
}
