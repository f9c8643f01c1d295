use bytes::Bytes;

use super::codec::AudioEncoder;
use crate::audio::audio_converter::{AudioConfig, AudioConverter};
use crate::audio::audio_packetizer::AudioPacketizer;
use crate::audio::{samples_per_10ms, AudioFrame};
use crate::error::{Error, Result};
use crate::frame_transformer::AudioFrameType;

/// EncodedPacket is one packet produced by the encoder, ready for RTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub frame_type: AudioFrameType,
    pub payload_type: u8,
    /// Timestamp in encoder RTP units, without the RTP module offset.
    pub rtp_timestamp: u32,
    pub payload: Bytes,
    pub absolute_capture_timestamp_ms: Option<i64>,
}

/// AudioCoding feeds 10 ms frames to an encoder, resampling them to the
/// encoder's format and mapping their timestamps onto the encoder clock.
#[derive(Default)]
pub struct AudioCoding {
    encoder: Option<Box<dyn AudioEncoder>>,
    converter: Option<AudioConverter>,
    packetizer: Option<AudioPacketizer>,
    expected_in_timestamp: Option<u32>,
    expected_codec_timestamp: u32,
}

impl AudioCoding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_encoder(&mut self, encoder: Box<dyn AudioEncoder>) {
        self.encoder = Some(encoder);
        self.reset_pipeline();
    }

    /// Gives `f` the encoder slot, which may replace or remove the encoder.
    pub fn modify_encoder<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Option<Box<dyn AudioEncoder>>),
    {
        f(&mut self.encoder);
        self.reset_pipeline();
    }

    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn encoder_mut(&mut self) -> Option<&mut (dyn AudioEncoder + 'static)> {
        self.encoder.as_deref_mut()
    }

    pub fn get_target_bitrate(&self) -> Option<u32> {
        self.encoder.as_ref().and_then(|e| e.get_target_bitrate())
    }

    /// Clears buffered audio in the encoder and the resampler.
    pub fn reset(&mut self) {
        if let Some(encoder) = &mut self.encoder {
            encoder.reset();
        }
        self.reset_pipeline();
    }

    fn reset_pipeline(&mut self) {
        self.converter = None;
        self.packetizer = None;
        self.expected_in_timestamp = None;
    }

    /// Encodes one 10 ms frame and returns every packet it completed.
    pub fn add_10ms_data(&mut self, frame: &AudioFrame) -> Result<Vec<EncodedPacket>> {
        let encoder = self.encoder.as_mut().ok_or(Error::ErrNoEncoder)?;
        if frame.num_channels == 0 || frame.sample_rate_hz == 0 {
            return Err(Error::ErrUnsupportedChannels(frame.num_channels));
        }

        let in_config = AudioConfig::new(frame.num_channels, frame.sample_rate_hz);
        let out_config = AudioConfig::new(encoder.num_channels(), encoder.sample_rate_hz());
        let rtp_rate = encoder.rtp_timestamp_rate_hz();

        // map the capture timestamp onto the encoder clock
        let expected_in = match self.expected_in_timestamp {
            Some(t) => t,
            None => {
                self.expected_codec_timestamp = frame.timestamp;
                frame.timestamp
            }
        };
        if frame.timestamp != expected_in {
            let gap = frame.timestamp.wrapping_sub(expected_in) as u64;
            self.expected_codec_timestamp = self
                .expected_codec_timestamp
                .wrapping_add((gap * rtp_rate as u64 / frame.sample_rate_hz as u64) as u32);
        }
        self.expected_in_timestamp = Some(
            frame
                .timestamp
                .wrapping_add(frame.samples_per_channel as u32),
        );

        let converted = if in_config == out_config {
            frame.data.clone()
        } else {
            let stale = !matches!(&self.converter,
                Some(c) if c.input_config() == in_config && c.output_config() == out_config);
            if stale {
                self.converter = None;
            }
            self.converter
                .get_or_insert_with(|| AudioConverter::new(in_config, out_config))
                .process(&frame.data, frame.samples_per_channel)
        };

        let block = samples_per_10ms(out_config.rate);
        let stale = !matches!(&self.packetizer,
            Some(p) if p.packet_size() == block && p.channels() == out_config.channels);
        if stale {
            self.packetizer = None;
        }
        let packetizer = self
            .packetizer
            .get_or_insert_with(|| AudioPacketizer::new(block, out_config.channels));
        packetizer.input(&converted, converted.len() / out_config.channels);

        let mut packets = vec![];
        while let Some(audio) = packetizer.output() {
            let timestamp = self.expected_codec_timestamp;
            self.expected_codec_timestamp = self
                .expected_codec_timestamp
                .wrapping_add(samples_per_10ms(rtp_rate) as u32);

            let mut encoded = vec![];
            let info = encoder.encode(timestamp, &audio, &mut encoded)?;
            if info.encoded_bytes == 0 {
                continue;
            }
            encoded.truncate(info.encoded_bytes);
            packets.push(EncodedPacket {
                frame_type: if info.speech {
                    AudioFrameType::Speech
                } else {
                    AudioFrameType::ComfortNoise
                },
                payload_type: info.payload_type,
                rtp_timestamp: info.encoded_timestamp,
                payload: Bytes::from(encoded),
                absolute_capture_timestamp_ms: frame.absolute_capture_timestamp_ms,
            });
        }
        Ok(packets)
    }
}
