use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

/// JitterBufferConfig sizes the receive-side reorder buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct JitterBufferConfig {
    /// Packets held back before playout starts, and before a hole is declared lost.
    pub depth: usize,
    /// Hard cap on buffered packets; the oldest is dropped beyond it.
    pub max_packets: usize,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        JitterBufferConfig {
            depth: 3,
            max_packets: 50,
        }
    }
}

/// JitterPacket is one buffered RTP payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitterPacket {
    pub sequence_number: u16,
    pub timestamp: u32,
    pub payload_type: u8,
    pub payload: Bytes,
}

/// JitterOutput is what a playout pull yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JitterOutput {
    Packet(JitterPacket),
    /// The packet with this sequence number never arrived in time.
    Lost { sequence_number: u16 },
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JitterBufferStats {
    pub packets_inserted: u64,
    pub packets_played: u64,
    pub packets_lost: u64,
    pub packets_duplicate: u64,
    pub packets_late: u64,
    pub packets_overflow: u64,
    pub depth: usize,
}

/// JitterBuffer reorders packets by extended sequence number and releases
/// them in order once enough are buffered.
#[derive(Debug, Default)]
pub struct JitterBuffer {
    config: JitterBufferConfig,
    packets: BTreeMap<u64, JitterPacket>,
    highest: Option<u64>,
    next: Option<u64>,
    playing: bool,
    stats: JitterBufferStats,
}

impl JitterBuffer {
    pub fn new(config: JitterBufferConfig) -> Self {
        JitterBuffer {
            config,
            ..Default::default()
        }
    }

    /// Unwraps a 16-bit sequence number against the highest seen so far.
    fn extend(&self, seq: u16) -> u64 {
        let highest = match self.highest {
            Some(h) => h,
            None => return (1u64 << 16) + seq as u64,
        };
        let cycle = highest & !0xFFFF;
        let candidates = [
            cycle.wrapping_sub(1 << 16) | seq as u64,
            cycle | seq as u64,
            (cycle + (1 << 16)) | seq as u64,
        ];
        candidates
            .into_iter()
            .min_by_key(|c| c.abs_diff(highest))
            .unwrap_or(cycle | seq as u64)
    }

    /// Buffers a packet. Returns false if it was a duplicate or arrived after
    /// its playout point.
    pub fn insert(&mut self, packet: JitterPacket) -> bool {
        let ext = self.extend(packet.sequence_number);

        if let (true, Some(next)) = (self.playing, self.next) {
            if ext < next {
                self.stats.packets_late += 1;
                return false;
            }
        }
        if self.packets.contains_key(&ext) {
            self.stats.packets_duplicate += 1;
            return false;
        }

        self.stats.packets_inserted += 1;
        self.packets.insert(ext, packet);
        self.highest = Some(self.highest.map_or(ext, |h| h.max(ext)));
        if self.next.is_none() || !self.playing {
            let first = self.packets.keys().next().copied();
            self.next = first;
        }

        while self.packets.len() > self.config.max_packets {
            if let Some((&oldest, _)) = self.packets.iter().next() {
                self.packets.remove(&oldest);
                self.stats.packets_overflow += 1;
                self.next = Some(oldest + 1);
            }
        }
        self.stats.depth = self.packets.len();
        true
    }

    /// Pulls the next packet in sequence order. Returns None while prefilling
    /// and on underrun.
    pub fn pop(&mut self) -> Option<JitterOutput> {
        if !self.playing {
            if self.packets.len() < self.config.depth.max(1) {
                return None;
            }
            self.playing = true;
        }

        let next = self.next?;
        if let Some(packet) = self.packets.remove(&next) {
            self.next = Some(next + 1);
            self.stats.packets_played += 1;
            self.stats.depth = self.packets.len();
            return Some(JitterOutput::Packet(packet));
        }

        if self.packets.is_empty() {
            return None;
        }
        // a hole: give the missing packet time to arrive while the buffer is shallow
        if self.packets.len() < self.config.depth {
            return None;
        }
        self.next = Some(next + 1);
        self.stats.packets_lost += 1;
        Some(JitterOutput::Lost {
            sequence_number: next as u16,
        })
    }

    /// Sequence numbers missing between the playout point and the newest packet.
    pub fn missing(&self) -> Vec<u16> {
        let (next, highest) = match (self.next, self.highest) {
            (Some(n), Some(h)) => (n, h),
            _ => return vec![],
        };
        (next..highest)
            .filter(|s| !self.packets.contains_key(s))
            .map(|s| s as u16)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn stats(&self) -> JitterBufferStats {
        self.stats.clone()
    }

    /// Drops everything and returns to prefill.
    pub fn flush(&mut self) {
        self.packets.clear();
        self.highest = None;
        self.next = None;
        self.playing = false;
        self.stats.depth = 0;
    }
}
