#[cfg(test)]
mod abs_capture_time_extension_test;

use std::time::SystemTime;

use super::abs_send_time_extension::{ntp2unix, unix2ntp};
use super::{ExtensionKind, HeaderExtension, ABS_CAPTURE_TIME_URI};
use crate::error::{Error, Result};

pub const ABS_CAPTURE_TIME_EXTENSION_SIZE: usize = 16;
pub const ABS_CAPTURE_TIME_EXTENSION_SIZE_WITHOUT_OFFSET: usize = 8;

/// Absolute capture time of the first sample in the packet, as a 64-bit
/// UQ32.32 NTP timestamp, optionally followed by the sender's estimate of
/// the offset between its clock and the capture system's clock (Q32.32).
/// ```text
///    0                   1                   2                   3
///    0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |  ID   | len=15|     absolute capture timestamp (bit 0-23)     |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |             absolute capture timestamp (bit 24-55)            |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |  ... (56-63)  |   estimated capture clock offset (bit 0-23)   |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |           estimated capture clock offset (bit 24-55)          |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |  ... (56-63)  |
///   +-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone)]
pub struct AbsoluteCaptureTimeExtension {
    pub timestamp: u64,
    pub estimated_capture_clock_offset: Option<i64>,
}

impl AbsoluteCaptureTimeExtension {
    pub fn new(capture_time: SystemTime) -> Self {
        AbsoluteCaptureTimeExtension {
            timestamp: unix2ntp(capture_time),
            estimated_capture_clock_offset: None,
        }
    }

    pub fn capture_time(&self) -> SystemTime {
        ntp2unix(self.timestamp)
    }
}

impl HeaderExtension for AbsoluteCaptureTimeExtension {
    const URI: &'static str = ABS_CAPTURE_TIME_URI;
    const KIND: ExtensionKind = ExtensionKind::AbsoluteCaptureTime;

    fn value_size(&self) -> usize {
        if self.estimated_capture_clock_offset.is_some() {
            ABS_CAPTURE_TIME_EXTENSION_SIZE
        } else {
            ABS_CAPTURE_TIME_EXTENSION_SIZE_WITHOUT_OFFSET
        }
    }

    fn parse(data: &[u8]) -> Result<Self> {
        let mut timestamp = [0u8; 8];
        let mut offset = [0u8; 8];
        let estimated_capture_clock_offset = match data.len() {
            ABS_CAPTURE_TIME_EXTENSION_SIZE => {
                timestamp.copy_from_slice(&data[..8]);
                offset.copy_from_slice(&data[8..]);
                Some(i64::from_be_bytes(offset))
            }
            ABS_CAPTURE_TIME_EXTENSION_SIZE_WITHOUT_OFFSET => {
                timestamp.copy_from_slice(data);
                None
            }
            len => return Err(Error::ErrExtensionValueSize(len)),
        };

        Ok(AbsoluteCaptureTimeExtension {
            timestamp: u64::from_be_bytes(timestamp),
            estimated_capture_clock_offset,
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        data[..8].copy_from_slice(&self.timestamp.to_be_bytes());
        if let Some(offset) = self.estimated_capture_clock_offset {
            data[8..16].copy_from_slice(&offset.to_be_bytes());
        }
        Ok(())
    }
}
