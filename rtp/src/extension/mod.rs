use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod abs_capture_time_extension;
pub mod abs_send_time_extension;
pub mod audio_level_extension;
pub mod color_space_extension;
pub mod csrc_audio_level_extension;
pub mod extension_map;
pub mod inband_comfort_noise_extension;
pub mod playout_delay_extension;
pub mod sdes_mid_extension;
pub mod transmission_offset_extension;
pub mod transport_cc_extension;
pub mod transport_cc_v2_extension;
pub mod video_content_type_extension;
pub mod video_frame_tracking_id_extension;
pub mod video_orientation_extension;
pub mod video_timing_extension;

pub const ABS_SEND_TIME_URI: &str = "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";
pub const ABS_CAPTURE_TIME_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/abs-capture-time";
pub const TRANSMISSION_OFFSET_URI: &str = "urn:ietf:params:rtp-hdrext:toffset";
pub const TRANSPORT_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";
pub const TRANSPORT_CC_V2_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/transport-wide-cc-02";
pub const AUDIO_LEVEL_URI: &str = "urn:ietf:params:rtp-hdrext:ssrc-audio-level";
pub const CSRC_AUDIO_LEVEL_URI: &str = "urn:ietf:params:rtp-hdrext:csrc-audio-level";
pub const VIDEO_ORIENTATION_URI: &str = "urn:3gpp:video-orientation";
pub const PLAYOUT_DELAY_URI: &str = "http://www.webrtc.org/experiments/rtp-hdrext/playout-delay";
pub const VIDEO_CONTENT_TYPE_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/video-content-type";
pub const VIDEO_TIMING_URI: &str = "http://www.webrtc.org/experiments/rtp-hdrext/video-timing";
pub const COLOR_SPACE_URI: &str = "http://www.webrtc.org/experiments/rtp-hdrext/color-space";
pub const VIDEO_FRAME_TRACKING_ID_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/video-frame-tracking-id";
pub const INBAND_COMFORT_NOISE_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/inband-cn";
pub const SDES_MID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:mid";

/// Every header extension this crate knows how to negotiate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtensionKind {
    AbsSendTime,
    AbsoluteCaptureTime,
    TransmissionOffset,
    TransportSequenceNumber,
    TransportSequenceNumberV2,
    AudioLevel,
    CsrcAudioLevel,
    VideoOrientation,
    PlayoutDelayLimits,
    VideoContentType,
    VideoTiming,
    ColorSpace,
    VideoFrameTrackingId,
    InbandComfortNoise,
    Mid,
}

impl ExtensionKind {
    pub const ALL: [ExtensionKind; 15] = [
        ExtensionKind::AbsSendTime,
        ExtensionKind::AbsoluteCaptureTime,
        ExtensionKind::TransmissionOffset,
        ExtensionKind::TransportSequenceNumber,
        ExtensionKind::TransportSequenceNumberV2,
        ExtensionKind::AudioLevel,
        ExtensionKind::CsrcAudioLevel,
        ExtensionKind::VideoOrientation,
        ExtensionKind::PlayoutDelayLimits,
        ExtensionKind::VideoContentType,
        ExtensionKind::VideoTiming,
        ExtensionKind::ColorSpace,
        ExtensionKind::VideoFrameTrackingId,
        ExtensionKind::InbandComfortNoise,
        ExtensionKind::Mid,
    ];

    pub fn uri(&self) -> &'static str {
        use ExtensionKind::*;

        match self {
            AbsSendTime => ABS_SEND_TIME_URI,
            AbsoluteCaptureTime => ABS_CAPTURE_TIME_URI,
            TransmissionOffset => TRANSMISSION_OFFSET_URI,
            TransportSequenceNumber => TRANSPORT_CC_URI,
            TransportSequenceNumberV2 => TRANSPORT_CC_V2_URI,
            AudioLevel => AUDIO_LEVEL_URI,
            CsrcAudioLevel => CSRC_AUDIO_LEVEL_URI,
            VideoOrientation => VIDEO_ORIENTATION_URI,
            PlayoutDelayLimits => PLAYOUT_DELAY_URI,
            VideoContentType => VIDEO_CONTENT_TYPE_URI,
            VideoTiming => VIDEO_TIMING_URI,
            ColorSpace => COLOR_SPACE_URI,
            VideoFrameTrackingId => VIDEO_FRAME_TRACKING_ID_URI,
            InbandComfortNoise => INBAND_COMFORT_NOISE_URI,
            Mid => SDES_MID_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.uri() == uri)
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

/// A typed RTP header extension value.
///
/// `write` is only ever handed a span of exactly `value_size()` bytes, while
/// `parse` must reject any span whose length the codec does not accept.
pub trait HeaderExtension: Sized {
    const URI: &'static str;
    const KIND: ExtensionKind;

    /// Number of value bytes this instance needs on the wire.
    fn value_size(&self) -> usize;

    fn parse(data: &[u8]) -> Result<Self>;

    fn write(&self, data: &mut [u8]) -> Result<()>;

    fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = vec![0u8; self.value_size()];
        self.write(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// Rejects a span whose length differs from `expected`.
pub(crate) fn check_size(data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        Err(Error::ErrExtensionValueSize(data.len()))
    } else {
        Ok(())
    }
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

pub(crate) fn read_u24(data: &[u8]) -> u32 {
    (data[0] as u32) << 16 | (data[1] as u32) << 8 | data[2] as u32
}

pub(crate) fn write_u24(data: &mut [u8], value: u32) {
    data[0] = (value >> 16) as u8;
    data[1] = (value >> 8) as u8;
    data[2] = value as u8;
}
