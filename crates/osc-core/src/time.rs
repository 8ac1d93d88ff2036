//! Time tags
//!
//! OSC time is a 64-bit fixed point NTP timestamp: the upper 32 bits count
//! seconds since 1900-01-01T00:00Z and the lower 32 bits are a binary fraction
//! of a second. The value `(0, 1)` is reserved to mean "immediately".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// 2^32, the denominator of the fraction field
const FRACTION_SCALE: f64 = 4_294_967_296.0;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A 64-bit OSC/NTP time tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeTag {
    seconds: u32,
    fraction: u32,
}

impl TimeTag {
    /// The reserved "dispatch immediately" value
    pub const IMMEDIATE: TimeTag = TimeTag {
        seconds: 0,
        fraction: 1,
    };

    /// Build a time tag from its raw wire fields
    pub const fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// Current wall-clock time.
    ///
    /// Seconds wrap at the end of NTP era 0 (2036-02-07), as NTP itself does.
    pub fn now() -> Self {
        let since_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let seconds = (since_unix.as_secs() + NTP_UNIX_OFFSET) as u32;
        Self {
            seconds,
            fraction: nanos_to_fraction(since_unix.subsec_nanos()),
        }
    }

    /// Time tag for a Unix timestamp in (fractional) seconds
    pub fn from_unix_secs_f64(secs: f64) -> Result<Self> {
        Self::try_from(secs + NTP_UNIX_OFFSET as f64)
    }

    /// Whole seconds since 1900
    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Binary fraction of a second (denominator 2^32)
    pub fn fraction(&self) -> u32 {
        self.fraction
    }

    /// Check for the reserved "immediately" value
    pub fn is_immediate(&self) -> bool {
        *self == Self::IMMEDIATE
    }

    /// Seconds since 1900 as a float
    pub fn as_secs_f64(&self) -> f64 {
        self.seconds as f64 + self.fraction as f64 / FRACTION_SCALE
    }

    /// Offset from the NTP epoch
    pub fn to_ntp_duration(&self) -> Duration {
        Duration::new(self.seconds as u64, fraction_to_nanos(self.fraction))
    }

    /// Absolute wall-clock time this tag denotes
    pub fn to_system_time(&self) -> SystemTime {
        let ntp = self.to_ntp_duration();
        let offset = Duration::from_secs(NTP_UNIX_OFFSET);
        if ntp >= offset {
            UNIX_EPOCH + (ntp - offset)
        } else {
            UNIX_EPOCH.checked_sub(offset - ntp).unwrap_or(UNIX_EPOCH)
        }
    }
}

impl Default for TimeTag {
    fn default() -> Self {
        Self::IMMEDIATE
    }
}

impl fmt::Display for TimeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_immediate() {
            write!(f, "immediate")
        } else {
            write!(f, "{:.6}", self.as_secs_f64())
        }
    }
}

impl From<(u32, u32)> for TimeTag {
    fn from((seconds, fraction): (u32, u32)) -> Self {
        Self::new(seconds, fraction)
    }
}

impl From<TimeTag> for (u32, u32) {
    fn from(tag: TimeTag) -> Self {
        (tag.seconds, tag.fraction)
    }
}

/// An absent time means "immediately"
impl From<Option<TimeTag>> for TimeTag {
    fn from(tag: Option<TimeTag>) -> Self {
        tag.unwrap_or(Self::IMMEDIATE)
    }
}

/// Seconds since 1900
impl TryFrom<f64> for TimeTag {
    type Error = Error;

    fn try_from(secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs < 0.0 || secs >= FRACTION_SCALE {
            return Err(Error::InvalidTimeValue(format!(
                "{} seconds is outside NTP era 0",
                secs
            )));
        }
        let whole = secs.floor();
        let fraction = ((secs - whole) * FRACTION_SCALE).min(u32::MAX as f64) as u32;
        Ok(Self::new(whole as u32, fraction))
    }
}

/// Offset from the NTP epoch
impl TryFrom<Duration> for TimeTag {
    type Error = Error;

    fn try_from(since_ntp: Duration) -> Result<Self> {
        let seconds = u32::try_from(since_ntp.as_secs()).map_err(|_| {
            Error::InvalidTimeValue(format!("{:?} is outside NTP era 0", since_ntp))
        })?;
        Ok(Self::new(seconds, nanos_to_fraction(since_ntp.subsec_nanos())))
    }
}

impl TryFrom<SystemTime> for TimeTag {
    type Error = Error;

    fn try_from(time: SystemTime) -> Result<Self> {
        let offset = Duration::from_secs(NTP_UNIX_OFFSET);
        let since_ntp = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => offset + after,
            Err(e) => offset.checked_sub(e.duration()).ok_or_else(|| {
                Error::InvalidTimeValue("time is before 1900-01-01".to_string())
            })?,
        };
        Self::try_from(since_ntp)
    }
}

fn nanos_to_fraction(nanos: u32) -> u32 {
    (((nanos as u64) << 32) / NANOS_PER_SEC) as u32
}

fn fraction_to_nanos(fraction: u32) -> u32 {
    ((fraction as u64 * NANOS_PER_SEC) >> 32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        let tag = TimeTag::try_from(UNIX_EPOCH).unwrap();
        assert_eq!(tag.seconds() as u64, NTP_UNIX_OFFSET);
        assert_eq!(tag.fraction(), 0);
        assert_eq!(tag.to_system_time(), UNIX_EPOCH);
    }

    #[test]
    fn test_system_time_roundtrip() {
        let t = UNIX_EPOCH + Duration::from_micros(1_700_000_000_123_456);
        let back = TimeTag::try_from(t).unwrap().to_system_time();
        let diff = match back.duration_since(t) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        assert!(diff < Duration::from_micros(1));
    }

    #[test]
    fn test_half_second_fraction() {
        let tag = TimeTag::try_from(10.5).unwrap();
        assert_eq!(tag.seconds(), 10);
        assert_eq!(tag.fraction(), 0x8000_0000);
        assert_eq!(tag.as_secs_f64(), 10.5);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            TimeTag::try_from(f64::NAN),
            Err(Error::InvalidTimeValue(_))
        ));
        assert!(TimeTag::try_from(-1.0).is_err());
        assert!(TimeTag::try_from(FRACTION_SCALE).is_err());
        let before_1900 = UNIX_EPOCH - Duration::from_secs(NTP_UNIX_OFFSET + 1);
        assert!(TimeTag::try_from(before_1900).is_err());
    }

    #[test]
    fn test_nil_is_immediate() {
        assert_eq!(TimeTag::from(None), TimeTag::IMMEDIATE);
        assert!(TimeTag::default().is_immediate());
        assert_eq!(TimeTag::IMMEDIATE.to_string(), "immediate");
    }

    #[test]
    fn test_now_is_after_unix_offset() {
        let now = TimeTag::now();
        assert!(now.seconds() as u64 > NTP_UNIX_OFFSET);
        assert!(!now.is_immediate());
    }
}
