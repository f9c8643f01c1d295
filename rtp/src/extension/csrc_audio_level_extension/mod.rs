#[cfg(test)]
mod csrc_audio_level_extension_test;

use serde::{Deserialize, Serialize};

use super::{ExtensionKind, HeaderExtension, CSRC_AUDIO_LEVEL_URI};
use crate::error::{Error, Result};
use crate::header::MAX_CSRCS;

/// RFC 6465 mixer-to-client audio levels, one byte per CSRC in the order
/// the CSRCs appear in the header.
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  ID   | len=2 |0|   level 1   |0|   level 2   |0|   level 3   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Clone, Serialize, Deserialize)]
pub struct CsrcAudioLevelExtension {
    pub levels: Vec<u8>,
}

impl HeaderExtension for CsrcAudioLevelExtension {
    const URI: &'static str = CSRC_AUDIO_LEVEL_URI;
    const KIND: ExtensionKind = ExtensionKind::CsrcAudioLevel;

    fn value_size(&self) -> usize {
        self.levels.len()
    }

    fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() || data.len() > MAX_CSRCS {
            return Err(Error::ErrExtensionValueSize(data.len()));
        }
        Ok(CsrcAudioLevelExtension {
            levels: data.iter().map(|level| level & 0x7F).collect(),
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        if self.levels.is_empty() || self.levels.len() > MAX_CSRCS {
            return Err(Error::CsrcAudioLevelCount);
        }
        for (dst, level) in data.iter_mut().zip(&self.levels) {
            *dst = level & 0x7F;
        }
        Ok(())
    }
}
