
use serde::{Deserialize, Serialize};

use super::{check_size, ExtensionKind, HeaderExtension, VIDEO_ORIENTATION_URI};
use crate::error::{Error, Result};

// One byte header size
pub const VIDEO_ORIENTATION_EXTENSION_SIZE: usize = 1;

/// Coordination of Video Orientation (3GPP TS 26.114, CVO).
///
/// C = Camera: direction of the camera used for this video stream.
/// 0 is front-facing (and the default when unknown), 1 is back-facing.
///
/// F = Flip: horizontal mirror operation on the video as sent on the link.
///
/// R = Rotation: clockwise rotation applied before display, in 90 degree steps.
///
/// ```text
///    0                   1
///    0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |  ID   | len=0 |0 0 0 0 C F R R|
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone, Serialize, Deserialize)]
pub struct VideoOrientationExtension {
    pub direction: CameraDirection,
    pub flip: bool,
    pub rotation: VideoRotation,
}

#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub enum CameraDirection {
    #[default]
    Front = 0,
    Back = 1,
}

#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub enum VideoRotation {
    #[default]
    Degree0 = 0,
    Degree90 = 1,
    Degree180 = 2,
    Degree270 = 3,
}

impl From<u8> for VideoRotation {
    /// Only the two low bits are read.
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => VideoRotation::Degree0,
            1 => VideoRotation::Degree90,
            2 => VideoRotation::Degree180,
            _ => VideoRotation::Degree270,
        }
    }
}

impl HeaderExtension for VideoOrientationExtension {
    const URI: &'static str = VIDEO_ORIENTATION_URI;
    const KIND: ExtensionKind = ExtensionKind::VideoOrientation;

    fn value_size(&self) -> usize {
        VIDEO_ORIENTATION_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        check_size(data, VIDEO_ORIENTATION_EXTENSION_SIZE)?;
        let b = data[0];
        if b & 0xF0 != 0 {
            return Err(Error::InvalidVideoOrientation(b));
        }

        let direction = if b & 0b1000 != 0 {
            CameraDirection::Back
        } else {
            CameraDirection::Front
        };

        Ok(VideoOrientationExtension {
            direction,
            flip: b & 0b0100 != 0,
            rotation: VideoRotation::from(b),
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        let c = (self.direction as u8) << 3;
        let f = if self.flip { 0b0100 } else { 0 };
        let r = self.rotation as u8;

        data[0] = c | f | r;
        Ok(())
    }
}
