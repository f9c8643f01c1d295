#[cfg(test)]
mod abs_send_time_extension_test;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{check_size, read_u24, write_u24, ExtensionKind, HeaderExtension, ABS_SEND_TIME_URI};
use crate::error::Result;

pub const ABS_SEND_TIME_EXTENSION_SIZE: usize = 3;

/// AbsSendTimeExtension is a extension payload format in
/// http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time
///
/// The value is the sender's time in seconds as a 6.18 fixed point number.
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  ID   | len=2 |              absolute send time               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone)]
pub struct AbsSendTimeExtension {
    pub timestamp: u64,
}

impl HeaderExtension for AbsSendTimeExtension {
    const URI: &'static str = ABS_SEND_TIME_URI;
    const KIND: ExtensionKind = ExtensionKind::AbsSendTime;

    fn value_size(&self) -> usize {
        ABS_SEND_TIME_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        check_size(data, ABS_SEND_TIME_EXTENSION_SIZE)?;
        Ok(AbsSendTimeExtension {
            timestamp: read_u24(data) as u64,
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        write_u24(data, (self.timestamp & 0xFFFFFF) as u32);
        Ok(())
    }
}

impl AbsSendTimeExtension {
    /// Estimate absolute send time according to the receive time.
    /// Note that if the transmission delay is larger than 64 seconds, estimated time will be wrong.
    pub fn estimate(&self, receive: SystemTime) -> SystemTime {
        let receive_ntp = unix2ntp(receive);
        let mut ntp = receive_ntp & 0xFFFFFFC000000000 | (self.timestamp & 0xFFFFFF) << 14;
        if receive_ntp < ntp {
            // Receive time must be always later than send time
            ntp -= 0x1000000 << 14;
        }

        ntp2unix(ntp)
    }

    /// Makes the 24-bit send time for `send_time`.
    pub fn new(send_time: SystemTime) -> Self {
        AbsSendTimeExtension {
            timestamp: (unix2ntp(send_time) >> 14) & 0xFFFFFF,
        }
    }
}

pub fn unix2ntp(st: SystemTime) -> u64 {
    let u = st
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos() as u64;
    let mut s = u / 1_000_000_000;
    s += 0x83AA7E80; //offset in seconds between unix epoch and ntp epoch
    let mut f = u % 1_000_000_000;
    f <<= 32;
    f /= 1_000_000_000;
    s <<= 32;

    s | f
}

pub fn ntp2unix(t: u64) -> SystemTime {
    let s = (t >> 32).saturating_sub(0x83AA7E80);
    let f = ((t & 0xFFFFFFFF) * 1_000_000_000) >> 32;

    UNIX_EPOCH
        .checked_add(Duration::new(s, f as u32))
        .unwrap_or(UNIX_EPOCH)
}
