
use std::time::Duration;

use super::{check_size, read_u24, write_u24, ExtensionKind, HeaderExtension, PLAYOUT_DELAY_URI};
use crate::error::{Error, Result};

pub const PLAYOUT_DELAY_EXTENSION_SIZE: usize = 3;
pub const PLAYOUT_DELAY_MAX_VALUE: u16 = (1 << 12) - 1;
pub const PLAYOUT_DELAY_GRANULARITY: Duration = Duration::from_millis(10);
pub const PLAYOUT_DELAY_MAX: Duration = Duration::from_secs(10);

/// PlayoutDelayLimitsExtension is an extension payload format described in
/// http://www.webrtc.org/experiments/rtp-hdrext/playout-delay
///
/// Both limits travel in units of 10ms.
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  ID   | len=2 |       MIN delay       |       MAX delay       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone)]
pub struct PlayoutDelayLimitsExtension {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl PlayoutDelayLimitsExtension {
    /// Builds a validated pair of limits, `min <= max <= 10s`.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Result<Self> {
        let delay = PlayoutDelayLimitsExtension {
            min_delay,
            max_delay,
        };
        delay.validate()?;
        Ok(delay)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_delay > PLAYOUT_DELAY_MAX {
            return Err(Error::PlayoutDelayOverflow);
        }
        if self.min_delay > self.max_delay {
            return Err(Error::PlayoutDelayInverted);
        }
        Ok(())
    }

    fn to_raw(delay: Duration) -> Result<u32> {
        let raw = delay.as_micros() / PLAYOUT_DELAY_GRANULARITY.as_micros();
        if raw > PLAYOUT_DELAY_MAX_VALUE as u128 {
            return Err(Error::PlayoutDelayOverflow);
        }
        Ok(raw as u32)
    }
}

impl HeaderExtension for PlayoutDelayLimitsExtension {
    const URI: &'static str = PLAYOUT_DELAY_URI;
    const KIND: ExtensionKind = ExtensionKind::PlayoutDelayLimits;

    fn value_size(&self) -> usize {
        PLAYOUT_DELAY_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        check_size(data, PLAYOUT_DELAY_EXTENSION_SIZE)?;
        let raw = read_u24(data);
        let min_raw = raw >> 12;
        let max_raw = raw & 0xFFF;

        PlayoutDelayLimitsExtension::new(
            PLAYOUT_DELAY_GRANULARITY * min_raw,
            PLAYOUT_DELAY_GRANULARITY * max_raw,
        )
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        self.validate()?;
        let min_raw = Self::to_raw(self.min_delay)?;
        let max_raw = Self::to_raw(self.max_delay)?;

        write_u24(data, (min_raw << 12) | max_raw);
        Ok(())
    }
}
