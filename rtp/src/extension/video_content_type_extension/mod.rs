#[cfg(test)]
mod video_content_type_extension_test;

use serde::{Deserialize, Serialize};

use super::{check_size, ExtensionKind, HeaderExtension, VIDEO_CONTENT_TYPE_URI};
use crate::error::{Error, Result};

pub const VIDEO_CONTENT_TYPE_EXTENSION_SIZE: usize = 1;

/// Values at or above this were never assigned.
const VIDEO_CONTENT_TYPE_LIMIT: u8 = 64;

/// Only the lowest bit has a meaning. Older senders used five more bits;
/// those values are still accepted and masked out.
/// ```text
///    0                   1
///    0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |  ID   | len=0 | Content type  |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub enum VideoContentTypeExtension {
    #[default]
    Unspecified = 0,
    Screenshare = 1,
}

impl HeaderExtension for VideoContentTypeExtension {
    const URI: &'static str = VIDEO_CONTENT_TYPE_URI;
    const KIND: ExtensionKind = ExtensionKind::VideoContentType;

    fn value_size(&self) -> usize {
        VIDEO_CONTENT_TYPE_EXTENSION_SIZE
    }

    fn parse(data: &[u8]) -> Result<Self> {
        check_size(data, VIDEO_CONTENT_TYPE_EXTENSION_SIZE)?;
        let b = data[0];
        if b >= VIDEO_CONTENT_TYPE_LIMIT {
            return Err(Error::InvalidVideoContentType(b));
        }
        Ok(if b & 0x1 != 0 {
            VideoContentTypeExtension::Screenshare
        } else {
            VideoContentTypeExtension::Unspecified
        })
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        data[0] = *self as u8;
        Ok(())
    }
}
