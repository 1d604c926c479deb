//! Day and night detection for autolock.

use chrono::{DateTime, Local, Timelike};
use pinward_core::config::DaylightConfig;

/// Source of truth for whether the sun is up.
pub trait Daylight: Send + Sync {
    fn is_sun_up(&self, now: DateTime<Local>) -> bool;
}

/// Fixed sunrise and sunset hours in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDaylight {
    pub sunrise_hour: u32,
    pub sunset_hour: u32,
}

impl FixedDaylight {
    pub fn new(sunrise_hour: u32, sunset_hour: u32) -> Self {
        Self {
            sunrise_hour,
            sunset_hour,
        }
    }
}

impl From<&DaylightConfig> for FixedDaylight {
    fn from(config: &DaylightConfig) -> Self {
        Self::new(config.sunrise_hour, config.sunset_hour)
    }
}

impl Default for FixedDaylight {
    fn default() -> Self {
        Self::from(&DaylightConfig::default())
    }
}

impl Daylight for FixedDaylight {
    fn is_sun_up(&self, now: DateTime<Local>) -> bool {
        let hour = now.hour();
        hour >= self.sunrise_hour && hour < self.sunset_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(hour: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 6, 3, hour, 30, 0)
            .earliest()
            .unwrap()
    }

    #[rstest]
    #[case(6, false)]
    #[case(7, true)]
    #[case(12, true)]
    #[case(18, true)]
    #[case(19, false)]
    #[case(23, false)]
    fn test_fixed_hours(#[case] hour: u32, #[case] expected: bool) {
        let daylight = FixedDaylight::new(7, 19);
        assert_eq!(daylight.is_sun_up(at(hour)), expected);
    }
}
