#[cfg(test)]
mod audio_level_extension_test;

use serde::{Deserialize, Serialize};

use super::{check_size, ExtensionKind, HeaderExtension, AUDIO_LEVEL_URI};
use crate::error::{Error, Result};

// AUDIO_LEVEL_EXTENSION_SIZE One byte header size
pub const AUDIO_LEVEL_EXTENSION_SIZE: usize = 1;
pub const AUDIO_LEVEL_MAX: u8 = 127;

/// AudioLevelExtension is a extension payload format described in
/// [RFC 6464]. The level is expressed in -dBov, 127 being silence.
///
/// One byte format:
/// ```text
/// 0                   1
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  ID   | len=0 |V| level       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Two byte format:
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      ID       |     len=1     |V|    level    |    0 (pad)    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// [RFC 6464]: https://tools.ietf.org/html/rfc6464
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone, Serialize, Deserialize)]
pub struct AudioLevelExtension {
    pub level: u8,
    pub voice: bool,
}

impl HeaderExtension for AudioLevelExtension {
    const URI: &'static str = AUDIO_LEVEL_URI;
    const KIND: ExtensionKind = ExtensionKind::AudioLevel;

    fn value_size(&self) -> usize {
        AUDIO_LEVEL_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        check_size(data, AUDIO_LEVEL_EXTENSION_SIZE)?;
        let b = data[0];

        Ok(AudioLevelExtension {
            level: b & 0x7F,
            voice: (b & 0x80) != 0,
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        if self.level > AUDIO_LEVEL_MAX {
            return Err(Error::AudioLevelOverflow);
        }
        let voice = if self.voice { 0x80u8 } else { 0u8 };
        data[0] = voice | self.level;

        Ok(())
    }
}
