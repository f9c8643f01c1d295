
use serde::{Deserialize, Serialize};

use super::{check_size, read_u16, ExtensionKind, HeaderExtension, TRANSPORT_CC_V2_URI};
use crate::error::{Error, Result};

pub const TRANSPORT_CC_V2_EXTENSION_SIZE: usize = 4;
pub const TRANSPORT_CC_V2_EXTENSION_SIZE_WITHOUT_REQUEST: usize = 2;
pub const INCLUDE_TIMESTAMPS_BIT: u16 = 1 << 15;

/// Asks the receiver to send feedback for the last `sequence_count` packets.
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub include_timestamps: bool,
    pub sequence_count: u16,
}

/// Transport-wide sequence number with an optional feedback request.
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  ID   | L=3   |transport-wide sequence number |T|  seq count  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |seq count cont.|
/// +-+-+-+-+-+-+-+-+
/// ```
/// A zero `seq count` means no feedback is requested.
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone, Serialize, Deserialize)]
pub struct TransportSequenceNumberV2Extension {
    pub transport_sequence: u16,
    pub feedback_request: Option<FeedbackRequest>,
}

impl HeaderExtension for TransportSequenceNumberV2Extension {
    const URI: &'static str = TRANSPORT_CC_V2_URI;
    const KIND: ExtensionKind = ExtensionKind::TransportSequenceNumberV2;

    fn value_size(&self) -> usize {
        if self.feedback_request.is_some() {
            TRANSPORT_CC_V2_EXTENSION_SIZE
        } else {
            TRANSPORT_CC_V2_EXTENSION_SIZE_WITHOUT_REQUEST
        }
    }

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != TRANSPORT_CC_V2_EXTENSION_SIZE {
            check_size(data, TRANSPORT_CC_V2_EXTENSION_SIZE_WITHOUT_REQUEST)?;
        }

        let transport_sequence = read_u16(data, 0);
        let mut feedback_request = None;
        if data.len() == TRANSPORT_CC_V2_EXTENSION_SIZE {
            let raw = read_u16(data, 2);
            let sequence_count = raw & !INCLUDE_TIMESTAMPS_BIT;
            if sequence_count != 0 {
                feedback_request = Some(FeedbackRequest {
                    include_timestamps: raw & INCLUDE_TIMESTAMPS_BIT != 0,
                    sequence_count,
                });
            }
        }

        Ok(TransportSequenceNumberV2Extension {
            transport_sequence,
            feedback_request,
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        data[..2].copy_from_slice(&self.transport_sequence.to_be_bytes());

        if let Some(request) = &self.feedback_request {
            if request.sequence_count >= INCLUDE_TIMESTAMPS_BIT {
                return Err(Error::FeedbackRequestOverflow);
            }
            let mut raw = request.sequence_count;
            if request.include_timestamps {
                raw |= INCLUDE_TIMESTAMPS_BIT;
            }
            data[2..4].copy_from_slice(&raw.to_be_bytes());
        }
        Ok(())
    }
}
