use std::collections::VecDeque;

/// AudioPacketizer buffers interleaved audio and hands it back in packets of
/// exactly `packet_size` frames.
#[derive(Debug)]
pub struct AudioPacketizer {
    packet_size: usize,
    channels: usize,
    buffer: VecDeque<i16>,
}

impl AudioPacketizer {
    pub fn new(packet_size: usize, channels: usize) -> Self {
        AudioPacketizer {
            packet_size,
            channels,
            buffer: VecDeque::with_capacity(packet_size * channels * 2),
        }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Appends `frames` frames taken from the front of `data`.
    pub fn input(&mut self, data: &[i16], frames: usize) {
        let n = (frames * self.channels).min(data.len());
        self.buffer.extend(&data[..n]);
    }

    pub fn packets_available(&self) -> usize {
        let packet_len = self.packet_size * self.channels;
        if packet_len == 0 {
            return 0;
        }
        self.buffer.len() / packet_len
    }

    /// Frames buffered but not yet forming a full packet.
    pub fn frames_pending(&self) -> usize {
        self.buffer.len() / self.channels.max(1)
    }

    pub fn output(&mut self) -> Option<Vec<i16>> {
        if self.packets_available() == 0 {
            return None;
        }
        Some(self.buffer.drain(..self.packet_size * self.channels).collect())
    }
}
