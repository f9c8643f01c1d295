
use serde::{Deserialize, Serialize};

use super::{read_u16, ExtensionKind, HeaderExtension, VIDEO_TIMING_URI};
use crate::error::{Error, Result};

pub const VIDEO_TIMING_EXTENSION_SIZE: usize = 13;
/// Old wire format without the flags byte.
pub const VIDEO_TIMING_EXTENSION_LEGACY_SIZE: usize = 12;

pub const VIDEO_TIMING_FLAG_NOT_TRIGGERED: u8 = 0;
pub const VIDEO_TIMING_FLAG_TRIGGERED_BY_TIMER: u8 = 1;
pub const VIDEO_TIMING_FLAG_TRIGGERED_BY_SIZE: u8 = 2;
pub const VIDEO_TIMING_FLAG_INVALID: u8 = 255;

/// Six millisecond deltas from the capture time in the RTP header.
/// ```text
///    0                   1                   2                   3
///    0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |  ID   | len=12|     flags     |     encode start ms delta     |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |    encode finish ms delta     |  packetizer finish ms delta   |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |     pacer exit ms delta       |  network timestamp ms delta   |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |  network2 timestamp ms delta  |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone, Serialize, Deserialize)]
pub struct VideoTimingExtension {
    pub flags: u8,
    pub encode_start_delta_ms: u16,
    pub encode_finish_delta_ms: u16,
    pub packetization_finish_delta_ms: u16,
    pub pacer_exit_delta_ms: u16,
    pub network_timestamp_delta_ms: u16,
    pub network2_timestamp_delta_ms: u16,
}

impl VideoTimingExtension {
    fn deltas(&self) -> [u16; 6] {
        [
            self.encode_start_delta_ms,
            self.encode_finish_delta_ms,
            self.packetization_finish_delta_ms,
            self.pacer_exit_delta_ms,
            self.network_timestamp_delta_ms,
            self.network2_timestamp_delta_ms,
        ]
    }
}

impl HeaderExtension for VideoTimingExtension {
    const URI: &'static str = VIDEO_TIMING_URI;
    const KIND: ExtensionKind = ExtensionKind::VideoTiming;

    fn value_size(&self) -> usize {
        VIDEO_TIMING_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        let (flags, deltas) = match data.len() {
            VIDEO_TIMING_EXTENSION_SIZE => (data[0], &data[1..]),
            VIDEO_TIMING_EXTENSION_LEGACY_SIZE => (VIDEO_TIMING_FLAG_NOT_TRIGGERED, data),
            len => return Err(Error::ErrExtensionValueSize(len)),
        };

        Ok(VideoTimingExtension {
            flags,
            encode_start_delta_ms: read_u16(deltas, 0),
            encode_finish_delta_ms: read_u16(deltas, 2),
            packetization_finish_delta_ms: read_u16(deltas, 4),
            pacer_exit_delta_ms: read_u16(deltas, 6),
            network_timestamp_delta_ms: read_u16(deltas, 8),
            network2_timestamp_delta_ms: read_u16(deltas, 10),
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        data[0] = self.flags;
        for (chunk, delta) in data[1..].chunks_exact_mut(2).zip(self.deltas()) {
            chunk.copy_from_slice(&delta.to_be_bytes());
        }
        Ok(())
    }
}
