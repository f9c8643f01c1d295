
use super::{check_size, ExtensionKind, HeaderExtension, INBAND_COMFORT_NOISE_URI};
use crate::error::{Error, Result};

pub const INBAND_COMFORT_NOISE_EXTENSION_SIZE: usize = 1;

/// Signals that the payload carries comfort noise, optionally at a level
/// in -dBov. `N` set means a level follows in the low seven bits.
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  ID   | len=0 |N| level       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone)]
pub struct InbandComfortNoiseExtension {
    pub level: Option<u8>,
}

impl HeaderExtension for InbandComfortNoiseExtension {
    const URI: &'static str = INBAND_COMFORT_NOISE_URI;
    const KIND: ExtensionKind = ExtensionKind::InbandComfortNoise;

    fn value_size(&self) -> usize {
        INBAND_COMFORT_NOISE_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        check_size(data, INBAND_COMFORT_NOISE_EXTENSION_SIZE)?;
        let b = data[0];
        let level = if b & 0x80 != 0 { Some(b & 0x7F) } else { None };
        Ok(InbandComfortNoiseExtension { level })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        data[0] = match self.level {
            Some(level) if level > 127 => return Err(Error::AudioLevelOverflow),
            Some(level) => 0x80 | level,
            None => 0,
        };
        Ok(())
    }
}
