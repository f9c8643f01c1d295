#[cfg(test)]
mod video_frame_tracking_id_extension_test;

use super::{check_size, read_u16, ExtensionKind, HeaderExtension, VIDEO_FRAME_TRACKING_ID_URI};
use crate::error::Result;

pub const VIDEO_FRAME_TRACKING_ID_EXTENSION_SIZE: usize = 2;

/// ```text
///   0                   1                   2
///   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |  ID   | L=1   |    video-frame-tracking-id    |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone)]
pub struct VideoFrameTrackingIdExtension {
    pub tracking_id: u16,
}

impl HeaderExtension for VideoFrameTrackingIdExtension {
    const URI: &'static str = VIDEO_FRAME_TRACKING_ID_URI;
    const KIND: ExtensionKind = ExtensionKind::VideoFrameTrackingId;

    fn value_size(&self) -> usize {
        VIDEO_FRAME_TRACKING_ID_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        check_size(data, VIDEO_FRAME_TRACKING_ID_EXTENSION_SIZE)?;
        Ok(VideoFrameTrackingIdExtension {
            tracking_id: read_u16(data, 0),
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        data.copy_from_slice(&self.tracking_id.to_be_bytes());
        Ok(())
    }
}
