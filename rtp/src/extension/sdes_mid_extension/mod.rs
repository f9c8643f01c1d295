#[cfg(test)]
mod sdes_mid_extension_test;

use super::{ExtensionKind, HeaderExtension, SDES_MID_URI};
use crate::error::{Error, Result};

pub const SDES_MID_EXTENSION_MAX_SIZE: usize = 16;

/// RFC 8843 media identification, a short string binding the packet to an
/// m-section. A NUL inside the value terminates it.
#[derive(PartialEq, Eq, Debug, Default, Clone)]
pub struct MidExtension {
    pub mid: String,
}

impl HeaderExtension for MidExtension {
    const URI: &'static str = SDES_MID_URI;
    const KIND: ExtensionKind = ExtensionKind::Mid;

    fn value_size(&self) -> usize {
        self.mid.len()
    }

    fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() || data[0] == 0 || data.len() > SDES_MID_EXTENSION_MAX_SIZE {
            return Err(Error::InvalidStringExtension);
        }
        let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
        let mid = String::from_utf8(data[..end].to_vec())
            .map_err(|_| Error::InvalidStringExtension)?;
        Ok(MidExtension { mid })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        if self.mid.is_empty() || self.mid.len() > SDES_MID_EXTENSION_MAX_SIZE {
            return Err(Error::InvalidStringExtension);
        }
        data.copy_from_slice(self.mid.as_bytes());
        Ok(())
    }
}
