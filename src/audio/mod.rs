
pub mod audio_converter;
pub mod audio_level;
pub mod audio_packetizer;
pub mod audio_proxy;
pub mod jitter_buffer;

use crate::error::{Error, Result};
use crate::AUDIO_FRAMES_PER_SECOND;

/// Sample rates the send path can hand to an encoder.
pub const SUPPORTED_SENDING_RATES: [u32; 4] = [16000, 32000, 44100, 48000];

/// Maps an input rate onto the sending rate audio is resampled to: supported
/// rates map to themselves, anything else rounds up to the next supported
/// rate and saturates at 48 kHz.
pub fn appropriate_sending_rate(input_rate: u32) -> u32 {
    if SUPPORTED_SENDING_RATES.contains(&input_rate) {
        return input_rate;
    }
    if input_rate < 16000 {
        return 16000;
    }
    if input_rate < 32000 {
        return 32000;
    }
    if input_rate < 44100 {
        return 44100;
    }
    48000
}

/// Number of samples per channel in 10 ms at `sample_rate_hz`.
pub fn samples_per_10ms(sample_rate_hz: u32) -> usize {
    (sample_rate_hz / AUDIO_FRAMES_PER_SECOND) as usize
}

/// AudioFrame is 10 ms of interleaved 16-bit PCM.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Vec<i16>,
    pub sample_rate_hz: u32,
    pub num_channels: usize,
    pub samples_per_channel: usize,
    /// RTP timestamp, assigned by the sender.
    pub timestamp: u32,
    /// Wall-clock capture time in milliseconds, if the source knows it.
    pub absolute_capture_timestamp_ms: Option<i64>,
    pub muted: bool,
}

impl AudioFrame {
    /// Returns a muted 10 ms frame.
    pub fn silence(sample_rate_hz: u32, num_channels: usize) -> Self {
        let samples_per_channel = samples_per_10ms(sample_rate_hz);
        AudioFrame {
            data: vec![0; samples_per_channel * num_channels],
            sample_rate_hz,
            num_channels,
            samples_per_channel,
            muted: true,
            ..Default::default()
        }
    }

    /// Wraps interleaved samples, which must hold exactly 10 ms.
    pub fn from_interleaved(
        data: Vec<i16>,
        sample_rate_hz: u32,
        num_channels: usize,
    ) -> Result<Self> {
        if num_channels == 0 || num_channels > 2 {
            return Err(Error::ErrUnsupportedChannels(num_channels));
        }
        let samples_per_channel = samples_per_10ms(sample_rate_hz);
        let expected = samples_per_channel * num_channels;
        if data.len() != expected {
            return Err(Error::ErrAudioFrameSize {
                expected,
                got: data.len(),
            });
        }
        Ok(AudioFrame {
            data,
            sample_rate_hz,
            num_channels,
            samples_per_channel,
            ..Default::default()
        })
    }

    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate_hz == 0 {
            return 0;
        }
        (self.samples_per_channel as u64 * 1000 / self.sample_rate_hz as u64) as u32
    }

    /// Zeroes the samples and flags the frame muted.
    pub fn mute(&mut self) {
        self.data.iter_mut().for_each(|s| *s = 0);
        self.muted = true;
    }

    /// Applies the mute state of this frame given the state of the previous
    /// one. A change of state ramps the gain over the first (unmute) or last
    /// (mute) 128 samples per channel.
    pub fn apply_mute(&mut self, previous_frame_muted: bool, current_frame_muted: bool) {
        if !previous_frame_muted && !current_frame_muted {
            return;
        }
        if previous_frame_muted && current_frame_muted {
            self.mute();
            return;
        }
        if self.muted || self.num_channels == 0 {
            return;
        }

        let spc = self.samples_per_channel.min(self.data.len() / self.num_channels);
        let count = MUTE_FADE_FRAMES.min(spc);
        if count == 0 {
            return;
        }
        let mut inc = 1.0 / count as f32;
        let (start, start_g) = if current_frame_muted {
            inc = -inc;
            (spc - count, 1.0)
        } else {
            (0, 0.0)
        };

        for c in 0..self.num_channels {
            let mut g = start_g;
            for i in start..start + count {
                g += inc;
                let s = &mut self.data[i * self.num_channels + c];
                *s = (*s as f32 * g) as i16;
            }
        }
    }
}

const MUTE_FADE_FRAMES: usize = 128;

/// ChunkData is the planar payload of an AudioChunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkData {
    /// A chunk with no buffer, played as silence.
    Null,
    F32(Vec<Vec<f32>>),
    S16(Vec<Vec<i16>>),
}

/// AudioChunk is a run of planar audio as produced by a capture track.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub data: ChunkData,
    /// Frames per channel.
    pub duration: usize,
    pub volume: f32,
}

impl AudioChunk {
    pub fn null(duration: usize) -> Self {
        AudioChunk {
            data: ChunkData::Null,
            duration,
            volume: 1.0,
        }
    }

    pub fn from_s16(channels: Vec<Vec<i16>>) -> Self {
        let duration = channels.first().map(|c| c.len()).unwrap_or(0);
        AudioChunk {
            data: ChunkData::S16(channels),
            duration,
            volume: 1.0,
        }
    }

    pub fn from_f32(channels: Vec<Vec<f32>>) -> Self {
        let duration = channels.first().map(|c| c.len()).unwrap_or(0);
        AudioChunk {
            data: ChunkData::F32(channels),
            duration,
            volume: 1.0,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn channel_count(&self) -> usize {
        match &self.data {
            ChunkData::Null => 0,
            ChunkData::F32(c) => c.len(),
            ChunkData::S16(c) => c.len(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, ChunkData::Null)
    }

    /// Mixes the planes down (or up) to `out_channels` and interleaves them
    /// into 16-bit samples, applying the chunk volume.
    pub fn downmix_and_interleave(&self, out_channels: usize, out: &mut Vec<i16>) {
        out.clear();
        out.resize(self.duration * out_channels, 0);
        match &self.data {
            ChunkData::Null => {}
            ChunkData::F32(planes) => {
                downmix_planes(planes, self.duration, self.volume, out_channels, out, |s| s);
            }
            ChunkData::S16(planes) => downmix_planes(
                planes,
                self.duration,
                self.volume,
                out_channels,
                out,
                |s| s as f32 / 32768.0,
            ),
        }
    }
}

fn downmix_planes<T: Copy>(
    planes: &[Vec<T>],
    duration: usize,
    volume: f32,
    out_channels: usize,
    out: &mut [i16],
    to_f32: impl Fn(T) -> f32,
) {
    if planes.is_empty() {
        return;
    }
    for frame in 0..duration {
        for ch in 0..out_channels {
            let v = if planes.len() <= out_channels {
                // up-mix duplicates the last plane into missing channels
                let plane = &planes[ch.min(planes.len() - 1)];
                plane.get(frame).map(|s| to_f32(*s)).unwrap_or(0.0)
            } else if out_channels == 1 {
                let sum: f32 = planes
                    .iter()
                    .map(|p| p.get(frame).map(|s| to_f32(*s)).unwrap_or(0.0))
                    .sum();
                sum / planes.len() as f32
            } else {
                // keep the first two channels, fold the rest evenly into both
                let extra: f32 = planes[out_channels..]
                    .iter()
                    .map(|p| p.get(frame).map(|s| to_f32(*s)).unwrap_or(0.0))
                    .sum();
                let own = planes[ch].get(frame).map(|s| to_f32(*s)).unwrap_or(0.0);
                let folded = (planes.len() - out_channels) as f32 / out_channels as f32;
                (own + extra / out_channels as f32) / (1.0 + folded)
            };
            out[frame * out_channels + ch] = float_to_s16(v * volume);
        }
    }
}

pub(crate) fn float_to_s16(v: f32) -> i16 {
    let scaled = (v * 32768.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
