use std::time::Duration;

/// Per-packet overhead assumed until one is registered: IPv4, UDP, RTP and
/// SRTP headers.
pub const DEFAULT_PACKET_OVERHEAD_BYTES: usize = 72;

/// AudioBitrateAccountant estimates the send bitrate of encoded audio,
/// counting the transport overhead of every packet.
#[derive(Debug, Clone)]
pub struct AudioBitrateAccountant {
    next_frame_duration: Duration,
    packet_overhead: usize,
    rate_last_frame_bps: u32,
    report_rate_bps: Option<u32>,
}

impl Default for AudioBitrateAccountant {
    fn default() -> Self {
        AudioBitrateAccountant {
            next_frame_duration: Duration::ZERO,
            packet_overhead: DEFAULT_PACKET_OVERHEAD_BYTES,
            rate_last_frame_bps: 0,
            report_rate_bps: None,
        }
    }
}

impl AudioBitrateAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_packet_overhead(&mut self, packet_byte_overhead: usize) {
        self.packet_overhead = packet_byte_overhead;
    }

    pub fn reset(&mut self) {
        self.rate_last_frame_bps = 0;
        self.next_frame_duration = Duration::ZERO;
        self.report_rate_bps = None;
    }

    /// Accounts `frame_duration` of audio that produced `payload_size` bytes.
    /// A frame is complete once the size is non-zero.
    pub fn update_bps_estimate(&mut self, payload_size: usize, frame_duration: Duration) {
        self.next_frame_duration += frame_duration;
        if payload_size == 0 || self.next_frame_duration.is_zero() {
            return;
        }

        let bits = ((payload_size + self.packet_overhead) * 8) as f64;
        let rate_cur_frame = (bits / self.next_frame_duration.as_secs_f64()) as u32;

        // the upper envelope of the last two frames, frame sizes alternate under DTX
        self.report_rate_bps = Some(rate_cur_frame.max(self.rate_last_frame_bps));
        self.rate_last_frame_bps = rate_cur_frame;
        self.next_frame_duration = Duration::ZERO;
    }

    pub fn get_used_rate(&self) -> Option<u32> {
        self.report_rate_bps
    }
}
