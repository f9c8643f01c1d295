
use serde::{Deserialize, Serialize};

use super::{check_size, read_u16, ExtensionKind, HeaderExtension, TRANSPORT_CC_URI};
use crate::error::Result;

// transport-wide sequence
pub const TRANSPORT_CC_EXTENSION_SIZE: usize = 2;

/// TransportSequenceNumberExtension is a extension payload format in
/// https://tools.ietf.org/html/draft-holmer-rmcat-transport-wide-cc-extensions-01
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       0xBE    |    0xDE       |           length=1            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  ID   | L=1   |transport-wide sequence number | zero padding  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone, Serialize, Deserialize)]
pub struct TransportSequenceNumberExtension {
    pub transport_sequence: u16,
}

impl HeaderExtension for TransportSequenceNumberExtension {
    const URI: &'static str = TRANSPORT_CC_URI;
    const KIND: ExtensionKind = ExtensionKind::TransportSequenceNumber;

    fn value_size(&self) -> usize {
        TRANSPORT_CC_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        check_size(data, TRANSPORT_CC_EXTENSION_SIZE)?;
        Ok(TransportSequenceNumberExtension {
            transport_sequence: read_u16(data, 0),
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        data.copy_from_slice(&self.transport_sequence.to_be_bytes());
        Ok(())
    }
}
