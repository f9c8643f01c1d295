#[cfg(test)]
mod channel_test;

pub mod audio_coding;
pub mod bitrate_accountant;
pub mod channel_receive;
pub mod channel_send;
pub mod codec;
pub mod statistics;

pub use channel_receive::{ChannelReceive, ChannelReceiveConfig};
pub use channel_send::{ChannelSend, ChannelSendConfig};
pub use codec::{
    AudioDecoder, AudioDecoderFactory, AudioEncoder, BuiltinAudioDecoderFactory, L16Decoder,
    L16Encoder, SdpAudioFormat,
};
pub use statistics::{
    CallReceiveStatistics, CallSendStatistics, ContributingSourceStats, RtpSource, RtpSourceType,
};
