/*!
 # Inbound notification parsing

 Stateless decode of frames the strip pushes over its notify characteristic
 into partial state updates. Anything that fails the minimal framing check is
 dropped silently; the device is free to send noise.
*/

use tracing::{debug, trace};

/// Raw power-state bytes several firmwares report for "on"
const POWER_ON_BYTES: [u8; 3] = [0x23, 0xf0, 0x01];
/// Raw power-state bytes reported for "off"
const POWER_OFF_BYTES: [u8; 2] = [0x24, 0x00];

/// Partial state decoded from one status notification.
///
/// Fields are `None` when the frame carried no usable data for them; the
/// session merges updates into its observed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub power: Option<bool>,
    pub rgb: Option<(u8, u8, u8)>,
    /// Rescaled to 0-255 from the reported percent
    pub brightness: Option<u8>,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        self.power.is_none() && self.rgb.is_none() && self.brightness.is_none()
    }
}

/// Decodes a notification frame into a partial state update.
///
/// A valid status frame is at least 9 bytes, starts with 0x7e, carries 0xef
/// at index 8 and has command type 0x01 at index 2. Everything else yields
/// `None` without error.
pub fn parse(data: &[u8]) -> Option<StateUpdate> {
    if data.len() < 9 || data[0] != 0x7e || data[8] != 0xef {
        trace!("Skipping unparseable notification ({} bytes)", data.len());
        return None;
    }

    let cmd_type = data[2];
    if cmd_type != 0x01 {
        trace!("Ignoring notification with command type {cmd_type:#04x}");
        return None;
    }

    let mut update = StateUpdate::default();

    let power_byte = data[3];
    if POWER_ON_BYTES.contains(&power_byte) {
        update.power = Some(true);
    } else if POWER_OFF_BYTES.contains(&power_byte) {
        update.power = Some(false);
    }

    let (r, g, b) = (data[4], data[5], data[6]);
    // (0xff, 0xff, 0xff) is the firmware's "no data" marker
    if !(r == 0xff && g == 0xff && b == 0xff) {
        update.rgb = Some((r, g, b));
    }

    if data[7] != 0xff {
        let percent = data[7].min(100) as u32;
        update.brightness = Some((percent * 255 / 100) as u8);
    }

    debug!("Parsed status notification: {update:?}");
    Some(update)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_and_misframed_data() {
        assert_eq!(parse(&[]), None);
        assert_eq!(parse(&[0x7e, 0x00, 0x01]), None);
        assert_eq!(parse(&[0x00, 0x00, 0x01, 0x23, 1, 2, 3, 50, 0xef]), None);
        assert_eq!(parse(&[0x7e, 0x00, 0x01, 0x23, 1, 2, 3, 50, 0x00]), None);
    }

    #[test]
    fn ignores_non_status_command_types() {
        assert_eq!(parse(&[0x7e, 0x00, 0x04, 0x23, 1, 2, 3, 50, 0xef]), None);
    }

    #[test]
    fn decodes_power_bytes() {
        for on in [0x23, 0xf0, 0x01] {
            let update = parse(&[0x7e, 0x00, 0x01, on, 0xff, 0xff, 0xff, 0xff, 0xef]).unwrap();
            assert_eq!(update.power, Some(true));
        }
        for off in [0x24, 0x00] {
            let update = parse(&[0x7e, 0x00, 0x01, off, 0xff, 0xff, 0xff, 0xff, 0xef]).unwrap();
            assert_eq!(update.power, Some(false));
        }
        // Unknown power byte leaves power untouched
        let update = parse(&[0x7e, 0x00, 0x01, 0x77, 0xff, 0xff, 0xff, 0xff, 0xef]).unwrap();
        assert_eq!(update.power, None);
        assert!(update.is_empty());
    }

    #[test]
    fn sentinel_rgb_means_no_data() {
        let update = parse(&[0x7e, 0x00, 0x01, 0x23, 0xff, 0xff, 0xff, 0xff, 0xef]).unwrap();
        assert_eq!(update.rgb, None);
        let update = parse(&[0x7e, 0x00, 0x01, 0x23, 0xff, 0xff, 0x00, 0xff, 0xef]).unwrap();
        assert_eq!(update.rgb, Some((0xff, 0xff, 0x00)));
    }

    #[test]
    fn brightness_percent_rescales_to_byte() {
        let update = parse(&[0x7e, 0x00, 0x01, 0x23, 1, 2, 3, 100, 0xef]).unwrap();
        assert_eq!(update.brightness, Some(255));
        let update = parse(&[0x7e, 0x00, 0x01, 0x23, 1, 2, 3, 50, 0xef]).unwrap();
        assert_eq!(update.brightness, Some(127));
        let update = parse(&[0x7e, 0x00, 0x01, 0x23, 1, 2, 3, 0xff, 0xef]).unwrap();
        assert_eq!(update.brightness, None);
    }
}
