
pub mod frame_transformer_delegate;
pub mod fn_frame_transformer;

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

pub use frame_transformer_delegate::{FrameSender, FrameTransformerDelegate, FrameTransformerState};
pub use fn_frame_transformer::FnFrameTransformer;

/// AudioFrameType classifies the content of an encoded audio frame.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum AudioFrameType {
    #[default]
    Empty,
    Speech,
    ComfortNoise,
}

/// TransformableAudioFrame is an encoded audio frame exposed to a transformer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformableAudioFrame {
    data: Bytes,
    pub payload_type: u8,
    pub rtp_timestamp: u32,
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    pub mime_type: String,
    pub frame_type: AudioFrameType,
    pub absolute_capture_timestamp_ms: Option<i64>,
    /// Audio level in -dBov, 0..=127.
    pub audio_level: Option<u8>,
    /// Set on received frames only.
    pub sequence_number: Option<u16>,
    /// Set on received frames only.
    pub receive_time: Option<SystemTime>,
}

impl TransformableAudioFrame {
    pub fn new(
        data: Bytes,
        payload_type: u8,
        rtp_timestamp: u32,
        ssrc: u32,
        mime_type: &str,
    ) -> Self {
        TransformableAudioFrame {
            data,
            payload_type,
            rtp_timestamp,
            ssrc,
            csrcs: vec![],
            mime_type: mime_type.to_owned(),
            frame_type: AudioFrameType::Speech,
            absolute_capture_timestamp_ms: None,
            audio_level: None,
            sequence_number: None,
            receive_time: None,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Replaces the payload. The previous buffer is left untouched for any
    /// other holder.
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }

    /// Audio frames are always independently decodable.
    pub fn is_key_frame(&self) -> bool {
        true
    }
}

/// TransformableFrame is a frame travelling through a transformer, tagged
/// with the direction it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformableFrame {
    Sender(TransformableAudioFrame),
    Receiver(TransformableAudioFrame),
}

impl TransformableFrame {
    pub fn audio(&self) -> &TransformableAudioFrame {
        match self {
            TransformableFrame::Sender(f) => f,
            TransformableFrame::Receiver(f) => f,
        }
    }

    pub fn audio_mut(&mut self) -> &mut TransformableAudioFrame {
        match self {
            TransformableFrame::Sender(f) => f,
            TransformableFrame::Receiver(f) => f,
        }
    }

    pub fn into_audio(self) -> TransformableAudioFrame {
        match self {
            TransformableFrame::Sender(f) => f,
            TransformableFrame::Receiver(f) => f,
        }
    }

    pub fn is_sender(&self) -> bool {
        matches!(self, TransformableFrame::Sender(_))
    }

    pub fn ssrc(&self) -> u32 {
        self.audio().ssrc
    }
}

/// TransformedFrameCallback receives frames back from a transformer.
pub trait TransformedFrameCallback: Send + Sync {
    fn on_transformed_frame(&self, frame: TransformableFrame);

    /// Asks the callback to bypass the transformer from now on.
    fn start_short_circuiting(&self) {}
}

/// FrameTransformer processes encoded frames out of band, e.g. for end to
/// end encryption, and returns them through the callback registered for the
/// frame's SSRC.
pub trait FrameTransformer: Send + Sync {
    fn transform(&self, frame: TransformableFrame);

    fn register_transformed_frame_sink_callback(
        &self,
        callback: Arc<dyn TransformedFrameCallback>,
        ssrc: u32,
    );

    fn unregister_transformed_frame_sink_callback(&self, ssrc: u32);
}
