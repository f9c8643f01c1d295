use std::sync::Arc;

use parking_lot::Mutex;

use super::audio_converter::{AudioConfig, AudioConverter};
use super::audio_packetizer::AudioPacketizer;
use super::*;
use crate::task_queue::TaskQueue;

/// AudioFrameSink consumes 10 ms frames ready for encoding.
pub trait AudioFrameSink: Send + Sync {
    fn send_audio_frame(&self, frame: AudioFrame) -> Result<()>;
}

#[derive(Default)]
struct AudioProxyState {
    packetizer: Option<AudioPacketizer>,
    converter: Option<AudioConverter>,
    interleaved: Vec<i16>,
}

/// AudioProxy turns captured chunks into 10 ms frames at a sending rate on
/// its own queue, and hands them to the sink.
pub struct AudioProxy {
    sink: Arc<dyn AudioFrameSink>,
    queue: TaskQueue,
    state: Arc<Mutex<AudioProxyState>>,
}

impl AudioProxy {
    pub fn new(sink: Arc<dyn AudioFrameSink>) -> Self {
        AudioProxy {
            sink,
            queue: TaskQueue::new("audio-proxy"),
            state: Arc::new(Mutex::new(AudioProxyState::default())),
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Queues `chunk`, captured at `rate`, for processing. Disabled tracks
    /// still produce frames, filled with silence.
    pub fn queue_audio_chunk(&self, rate: u32, chunk: AudioChunk, enabled: bool) {
        if rate == 0 {
            log::warn!("audio chunk dropped: invalid sample rate 0");
            return;
        }
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let queue = self.queue.clone();
        if let Err(err) = self.queue.post(move || {
            debug_assert!(queue.is_current());
            let mut state = state.lock();
            state.process_audio_chunk(&*sink, rate, &chunk, enabled);
        }) {
            log::warn!("audio chunk dropped: {err}");
        }
    }

    pub async fn flush(&self) -> Result<()> {
        self.queue.flush().await
    }

    pub fn close(&self) {
        self.queue.close();
    }
}

impl AudioProxyState {
    fn process_audio_chunk(
        &mut self,
        sink: &dyn AudioFrameSink,
        rate: u32,
        chunk: &AudioChunk,
        enabled: bool,
    ) {
        let out_channels = if chunk.channel_count() == 1 { 1 } else { 2 };
        let sending_rate = appropriate_sending_rate(rate);

        // mono 16-bit at a sending rate is already in the layout the sink wants
        if enabled && out_channels == 1 && sending_rate == rate {
            if let ChunkData::S16(planes) = &chunk.data {
                self.packetize_and_send(
                    sink,
                    &planes[0],
                    sending_rate,
                    out_channels,
                    chunk.duration,
                );
                return;
            }
        }

        let mut interleaved = std::mem::take(&mut self.interleaved);
        if !enabled || chunk.is_null() {
            interleaved.clear();
            interleaved.resize(chunk.duration * out_channels, 0);
        } else {
            chunk.downmix_and_interleave(out_channels, &mut interleaved);
        }

        let input_config = AudioConfig::new(out_channels, rate);
        let output_config = AudioConfig::new(out_channels, sending_rate);
        let rebuild = match &self.converter {
            Some(c) => c.input_config() != input_config || c.output_config() != output_config,
            None => true,
        };
        if rebuild {
            self.converter = Some(AudioConverter::new(input_config, output_config));
        }

        let processed = match self.converter.as_mut() {
            Some(converter) => converter.process(&interleaved, chunk.duration),
            None => interleaved.clone(),
        };
        let frames = processed.len() / out_channels;
        self.packetize_and_send(sink, &processed, sending_rate, out_channels, frames);
        self.interleaved = interleaved;
    }

    fn packetize_and_send(
        &mut self,
        sink: &dyn AudioFrameSink,
        data: &[i16],
        rate: u32,
        channels: usize,
        frames: usize,
    ) {
        debug_assert_eq!(appropriate_sending_rate(rate), rate);
        debug_assert!(channels == 1 || channels == 2);

        let audio_10ms = samples_per_10ms(rate);
        let rebuild = match &self.packetizer {
            Some(p) => p.packet_size() != audio_10ms || p.channels() != channels,
            None => true,
        };
        if rebuild {
            // buffered audio at the old rate must not be sent as the new rate
            self.packetizer = Some(AudioPacketizer::new(audio_10ms, channels));
        }
        let packetizer = match self.packetizer.as_mut() {
            Some(p) => p,
            None => return,
        };

        packetizer.input(data, frames);
        while let Some(packet) = packetizer.output() {
            let frame = AudioFrame {
                data: packet,
                sample_rate_hz: rate,
                num_channels: channels,
                samples_per_channel: audio_10ms,
                ..Default::default()
            };
            if let Err(err) = sink.send_audio_frame(frame) {
                log::debug!("audio frame not sent: {err}");
            }
        }
    }
}
