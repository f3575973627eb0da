/*!
 # Scheduling functionality for LED strips

 Weekday bitmasks for the on/off scheduler, plus a parser for human-readable
 day lists.
*/

/// Represents days of the week for scheduling
#[derive(Debug, Clone, Copy)]
pub struct Days {
    /// Monday (0x01)
    pub monday: u8,
    /// Tuesday (0x02)
    pub tuesday: u8,
    /// Wednesday (0x04)
    pub wednesday: u8,
    /// Thursday (0x08)
    pub thursday: u8,
    /// Friday (0x10)
    pub friday: u8,
    /// Saturday (0x20)
    pub saturday: u8,
    /// Sunday (0x40)
    pub sunday: u8,
    /// All days (0x7f)
    pub all: u8,
    /// Week days (Monday-Friday, 0x1f)
    pub week_days: u8,
    /// Weekend days (Saturday-Sunday, 0x60)
    pub weekend_days: u8,
    /// No days (0x00)
    pub none: u8,
}

/// Predefined day constants for scheduling
pub const WEEK_DAYS: Days = Days {
    monday: 0x01,
    tuesday: 0x02,
    wednesday: 0x04,
    thursday: 0x08,
    friday: 0x10,
    saturday: 0x20,
    sunday: 0x40,
    all: 0x7f,
    week_days: 0x1f,
    weekend_days: 0x60,
    none: 0x00,
};

/// Parses a day list such as `"mon,wed,fri"`, `"weekdays"` or `"all"` into
/// a scheduler bitmask. Unknown tokens contribute no bits.
pub fn parse_days(days: &str) -> u8 {
    match days.trim().to_lowercase().as_str() {
        "mon" | "monday" => WEEK_DAYS.monday,
        "tue" | "tuesday" => WEEK_DAYS.tuesday,
        "wed" | "wednesday" => WEEK_DAYS.wednesday,
        "thu" | "thursday" => WEEK_DAYS.thursday,
        "fri" | "friday" => WEEK_DAYS.friday,
        "sat" | "saturday" => WEEK_DAYS.saturday,
        "sun" | "sunday" => WEEK_DAYS.sunday,
        "all" => WEEK_DAYS.all,
        "weekdays" => WEEK_DAYS.week_days,
        "weekend" => WEEK_DAYS.weekend_days,
        other if other.contains(',') => other.split(',').map(parse_days).fold(0, |acc, d| acc | d),
        _ => WEEK_DAYS.none,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_cover_the_week() {
        assert_eq!(WEEK_DAYS.week_days | WEEK_DAYS.weekend_days, WEEK_DAYS.all);
    }

    #[test]
    fn parses_single_days_and_groups() {
        assert_eq!(parse_days("mon"), 0x01);
        assert_eq!(parse_days("Sunday"), 0x40);
        assert_eq!(parse_days("weekdays"), 0x1f);
        assert_eq!(parse_days("weekend"), 0x60);
        assert_eq!(parse_days("all"), 0x7f);
    }

    #[test]
    fn parses_composite_lists() {
        assert_eq!(parse_days("mon,wed,fri"), 0x01 | 0x04 | 0x10);
        assert_eq!(parse_days("sat, sun"), 0x60);
        assert_eq!(parse_days("bogus"), 0x00);
    }
}
