use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::{samples_per_10ms, SUPPORTED_SENDING_RATES};
use crate::error::{Error, Result};

pub const L16_CODEC_NAME: &str = "L16";

/// SdpAudioFormat names a codec the way an SDP rtpmap/fmtp pair does.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpAudioFormat {
    pub name: String,
    pub clockrate_hz: u32,
    pub num_channels: usize,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl SdpAudioFormat {
    pub fn new(name: &str, clockrate_hz: u32, num_channels: usize) -> Self {
        SdpAudioFormat {
            name: name.to_owned(),
            clockrate_hz,
            num_channels,
            parameters: BTreeMap::new(),
        }
    }

    pub fn is_l16(&self) -> bool {
        self.name.eq_ignore_ascii_case(L16_CODEC_NAME)
    }
}

impl fmt::Display for SdpAudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.clockrate_hz, self.num_channels)
    }
}

/// EncodedInfo describes the output of one `AudioEncoder::encode` call.
/// Zero `encoded_bytes` means the encoder is still collecting a packet.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct EncodedInfo {
    pub encoded_bytes: usize,
    /// RTP timestamp of the first 10 ms block in the packet.
    pub encoded_timestamp: u32,
    pub payload_type: u8,
    pub speech: bool,
}

/// BitrateAllocationUpdate is the share of the send bandwidth assigned to a
/// stream.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct BitrateAllocationUpdate {
    pub target_bitrate_bps: u32,
}

/// AudioEncoder turns 10 ms blocks of interleaved PCM into packets.
pub trait AudioEncoder: Send {
    fn sample_rate_hz(&self) -> u32;

    fn num_channels(&self) -> usize;

    fn rtp_timestamp_rate_hz(&self) -> u32 {
        self.sample_rate_hz()
    }

    /// Appends to `encoded` once a packet is complete.
    fn encode(&mut self, rtp_timestamp: u32, audio: &[i16], encoded: &mut Vec<u8>)
        -> Result<EncodedInfo>;

    /// Drops any partially collected packet.
    fn reset(&mut self);

    fn get_target_bitrate(&self) -> Option<u32> {
        None
    }

    fn on_received_uplink_packet_loss_fraction(&mut self, _fraction: f32) {}

    fn on_received_rtt(&mut self, _rtt_ms: u64) {}

    fn on_received_uplink_allocation(&mut self, _update: BitrateAllocationUpdate) {}
}

/// AudioDecoder turns received payloads back into interleaved PCM.
pub trait AudioDecoder: Send {
    fn sample_rate_hz(&self) -> u32;

    fn num_channels(&self) -> usize;

    /// Appends the decoded samples to `decoded` and returns the number of
    /// samples per channel.
    fn decode(&mut self, encoded: &[u8], decoded: &mut Vec<i16>) -> Result<usize>;

    /// Conceals one lost 10 ms block.
    fn packet_loss_concealment(&mut self, decoded: &mut Vec<i16>) -> usize {
        let samples = samples_per_10ms(self.sample_rate_hz());
        decoded.extend(std::iter::repeat(0).take(samples * self.num_channels()));
        samples
    }

    fn reset(&mut self) {}
}

/// AudioDecoderFactory creates decoders for negotiated formats.
pub trait AudioDecoderFactory: Send + Sync {
    fn make_audio_decoder(&self, format: &SdpAudioFormat) -> Option<Box<dyn AudioDecoder>>;
}

/// Creates decoders for the formats this crate implements itself.
#[derive(Default, Debug, Copy, Clone)]
pub struct BuiltinAudioDecoderFactory;

impl AudioDecoderFactory for BuiltinAudioDecoderFactory {
    fn make_audio_decoder(&self, format: &SdpAudioFormat) -> Option<Box<dyn AudioDecoder>> {
        if !format.is_l16() {
            return None;
        }
        L16Decoder::new(format.clockrate_hz, format.num_channels)
            .ok()
            .map(|d| Box::new(d) as Box<dyn AudioDecoder>)
    }
}

fn check_l16_format(sample_rate_hz: u32, num_channels: usize) -> Result<()> {
    if !SUPPORTED_SENDING_RATES.contains(&sample_rate_hz) && sample_rate_hz != 8000 {
        return Err(Error::ErrUnsupportedSampleRate(sample_rate_hz));
    }
    if !(1..=2).contains(&num_channels) {
        return Err(Error::ErrUnsupportedChannels(num_channels));
    }
    Ok(())
}

/// L16Encoder is RFC 3551 linear PCM: big-endian 16 bit samples.
#[derive(Debug, Clone)]
pub struct L16Encoder {
    payload_type: u8,
    sample_rate_hz: u32,
    num_channels: usize,
    frames_per_packet: usize,
    buffer: Vec<i16>,
    frames_buffered: usize,
    first_timestamp: u32,
}

impl L16Encoder {
    /// `frames_per_packet` 10 ms blocks go into each packet.
    pub fn new(
        payload_type: u8,
        sample_rate_hz: u32,
        num_channels: usize,
        frames_per_packet: usize,
    ) -> Result<Self> {
        check_l16_format(sample_rate_hz, num_channels)?;
        if frames_per_packet == 0 {
            return Err(Error::ErrInvalidConfig("zero frames per packet".to_owned()));
        }
        Ok(L16Encoder {
            payload_type,
            sample_rate_hz,
            num_channels,
            frames_per_packet,
            buffer: vec![],
            frames_buffered: 0,
            first_timestamp: 0,
        })
    }
}

impl AudioEncoder for L16Encoder {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn encode(
        &mut self,
        rtp_timestamp: u32,
        audio: &[i16],
        encoded: &mut Vec<u8>,
    ) -> Result<EncodedInfo> {
        let expected = samples_per_10ms(self.sample_rate_hz) * self.num_channels;
        if audio.len() != expected {
            return Err(Error::ErrAudioFrameSize {
                expected,
                got: audio.len(),
            });
        }

        if self.frames_buffered == 0 {
            self.first_timestamp = rtp_timestamp;
        }
        self.buffer.extend_from_slice(audio);
        self.frames_buffered += 1;

        let mut info = EncodedInfo {
            encoded_bytes: 0,
            encoded_timestamp: self.first_timestamp,
            payload_type: self.payload_type,
            speech: true,
        };
        if self.frames_buffered < self.frames_per_packet {
            return Ok(info);
        }

        encoded.reserve(self.buffer.len() * 2);
        for sample in self.buffer.drain(..) {
            encoded.extend_from_slice(&sample.to_be_bytes());
        }
        self.frames_buffered = 0;
        info.encoded_bytes = expected * 2 * self.frames_per_packet;
        Ok(info)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.frames_buffered = 0;
    }

    fn get_target_bitrate(&self) -> Option<u32> {
        Some(self.sample_rate_hz * 16 * self.num_channels as u32)
    }
}

/// L16Decoder reverses L16Encoder.
#[derive(Debug, Clone)]
pub struct L16Decoder {
    sample_rate_hz: u32,
    num_channels: usize,
}

impl L16Decoder {
    pub fn new(sample_rate_hz: u32, num_channels: usize) -> Result<Self> {
        check_l16_format(sample_rate_hz, num_channels)?;
        Ok(L16Decoder {
            sample_rate_hz,
            num_channels,
        })
    }
}

impl AudioDecoder for L16Decoder {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn decode(&mut self, encoded: &[u8], decoded: &mut Vec<i16>) -> Result<usize> {
        let frame_bytes = 2 * self.num_channels;
        if encoded.len() % frame_bytes != 0 {
            return Err(Error::ErrDecoder(format!(
                "{} bytes is not a whole number of {}-channel samples",
                encoded.len(),
                self.num_channels
            )));
        }
        decoded.extend(
            encoded
                .chunks_exact(2)
                .map(|b| i16::from_be_bytes([b[0], b[1]])),
        );
        Ok(encoded.len() / frame_bytes)
    }
}
