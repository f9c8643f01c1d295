
use super::{
    check_size, read_u24, write_u24, ExtensionKind, HeaderExtension, TRANSMISSION_OFFSET_URI,
};
use crate::error::{Error, Result};

pub const TRANSMISSION_OFFSET_EXTENSION_SIZE: usize = 3;
const MAX_OFFSET: i32 = (1 << 23) - 1;
const MIN_OFFSET: i32 = -(1 << 23);

/// RFC 5450 transmission time offset: the signed difference, in RTP
/// timestamp units, between the send time and the sampling time.
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  ID   | len=2 |              transmission offset              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone)]
pub struct TransmissionOffsetExtension {
    pub offset: i32,
}

impl HeaderExtension for TransmissionOffsetExtension {
    const URI: &'static str = TRANSMISSION_OFFSET_URI;
    const KIND: ExtensionKind = ExtensionKind::TransmissionOffset;

    fn value_size(&self) -> usize {
        TRANSMISSION_OFFSET_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        check_size(data, TRANSMISSION_OFFSET_EXTENSION_SIZE)?;
        // sign-extend from 24 bits
        let offset = ((read_u24(data) << 8) as i32) >> 8;
        Ok(TransmissionOffsetExtension { offset })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        if !(MIN_OFFSET..=MAX_OFFSET).contains(&self.offset) {
            return Err(Error::TransmissionOffsetOverflow);
        }
        write_u24(data, self.offset as u32 & 0xFFFFFF);
        Ok(())
    }
}
