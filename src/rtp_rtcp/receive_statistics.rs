use std::time::{Duration, SystemTime};

use rtp::packet::Packet;
use serde::Serialize;

use super::counters::RtpPacketCounter;

/// Snapshot of the statistics of one received stream.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct ReceiveStreamStats {
    pub ssrc: u32,
    pub counter: RtpPacketCounter,
    /// Cumulative number of packets lost, RFC 3550 A.3.
    pub packets_lost: i64,
    pub extended_highest_sequence_number: u32,
    /// Interarrival jitter in RTP timestamp units.
    pub jitter: u32,
    pub clock_rate: u32,
    pub last_packet_received: Option<SystemTime>,
}

impl ReceiveStreamStats {
    pub fn jitter_seconds(&self) -> f64 {
        if self.clock_rate == 0 {
            0.0
        } else {
            self.jitter as f64 / self.clock_rate as f64
        }
    }
}

/// StreamStatistician tracks RFC 3550 loss and jitter for one remote SSRC
/// and produces the reception report block about it.
pub(crate) struct StreamStatistician {
    ssrc: u32,
    clock_rate: f64,

    packets: Vec<u64>,
    started: bool,
    base_seq_num: u16,
    seq_num_cycles: u16,
    last_seq_num: u16,
    last_report_seq_num: u16,
    last_report_cycles: u16,
    last_rtp_time_rtp: u32,
    last_rtp_time_time: SystemTime,
    jitter: f64,
    last_sender_report: u32,
    last_sender_report_time: Option<SystemTime>,
    total_lost: u32,

    counter: RtpPacketCounter,
    last_packet_received: Option<SystemTime>,
}

impl StreamStatistician {
    pub(crate) fn new(ssrc: u32, clock_rate: u32) -> Self {
        StreamStatistician {
            ssrc,
            clock_rate: clock_rate as f64,
            packets: vec![0u64; 128],
            started: false,
            base_seq_num: 0,
            seq_num_cycles: 0,
            last_seq_num: 0,
            last_report_seq_num: 0,
            last_report_cycles: 0,
            last_rtp_time_rtp: 0,
            last_rtp_time_time: SystemTime::UNIX_EPOCH,
            jitter: 0.0,
            last_sender_report: 0,
            last_sender_report_time: None,
            total_lost: 0,
            counter: RtpPacketCounter::default(),
            last_packet_received: None,
        }
    }

    pub(crate) fn set_clock_rate(&mut self, clock_rate: u32) {
        self.clock_rate = clock_rate as f64;
    }

    fn bit(&self, seq: u16) -> (usize, u64) {
        let pos = (seq as usize) % (self.packets.len() * 64);
        (pos / 64, 1u64 << (pos % 64))
    }

    fn set_received(&mut self, seq: u16) {
        let (word, mask) = self.bit(seq);
        self.packets[word] |= mask;
    }

    fn del_received(&mut self, seq: u16) {
        let (word, mask) = self.bit(seq);
        self.packets[word] &= !mask;
    }

    fn get_received(&self, seq: u16) -> bool {
        let (word, mask) = self.bit(seq);
        self.packets[word] & mask != 0
    }

    fn extended(&self, cycles: u16, seq: u16) -> u32 {
        (cycles as u32) << 16 | seq as u32
    }

    pub(crate) fn process_rtp(&mut self, now: SystemTime, packet: &Packet) {
        let seq = packet.header.sequence_number;
        self.counter.add_packet(packet);
        self.last_packet_received = Some(now);

        if !self.started {
            self.started = true;
            self.set_received(seq);
            self.base_seq_num = seq;
            self.last_seq_num = seq;
            self.last_report_seq_num = seq.wrapping_sub(1);
            self.last_report_cycles = if seq == 0 { u16::MAX } else { 0 };
        } else {
            self.set_received(seq);

            let diff = seq.wrapping_sub(self.last_seq_num);
            if diff != 0 && diff < 0x8000 {
                if seq < self.last_seq_num {
                    self.seq_num_cycles = self.seq_num_cycles.wrapping_add(1);
                }

                // everything skipped over is missing until it shows up
                let mut i = self.last_seq_num.wrapping_add(1);
                while i != seq {
                    self.del_received(i);
                    i = i.wrapping_add(1);
                }

                self.last_seq_num = seq;
            }

            // https://tools.ietf.org/html/rfc3550#appendix-A.8
            let d = now
                .duration_since(self.last_rtp_time_time)
                .unwrap_or_else(|_| Duration::from_secs(0))
                .as_secs_f64()
                * self.clock_rate
                - (packet.header.timestamp as f64 - self.last_rtp_time_rtp as f64);
            self.jitter += (d.abs() - self.jitter) / 16.0;
        }

        self.last_rtp_time_rtp = packet.header.timestamp;
        self.last_rtp_time_time = now;
    }

    /// Remembers the middle 32 bits of the remote NTP time for LSR/DLSR.
    pub(crate) fn process_sender_report(
        &mut self,
        now: SystemTime,
        sr: &rtcp::sender_report::SenderReport,
    ) {
        self.last_sender_report = (sr.ntp_time >> 16) as u32;
        self.last_sender_report_time = Some(now);
    }

    pub(crate) fn has_received(&self) -> bool {
        self.started
    }

    pub(crate) fn generate_report(&mut self, now: SystemTime) -> rtcp::reception_report::ReceptionReport {
        let last_ext = self.extended(self.seq_num_cycles, self.last_seq_num);
        let last_report_ext = self.extended(self.last_report_cycles, self.last_report_seq_num);
        let total_since_report = last_ext.wrapping_sub(last_report_ext);

        let mut lost_since_report = 0u32;
        let mut i = self.last_report_seq_num.wrapping_add(1);
        let end = self.last_seq_num.wrapping_add(1);
        if total_since_report > 0 && total_since_report <= (self.packets.len() * 64) as u32 {
            while i != end {
                if !self.get_received(i) {
                    lost_since_report += 1;
                }
                i = i.wrapping_add(1);
            }
        }

        // 24 bit fields
        self.total_lost = (self.total_lost + lost_since_report).min(0xFFFFFF);
        let fraction_lost = if total_since_report == 0 {
            0
        } else {
            ((lost_since_report.min(0xFFFFFF) as u64 * 256) / total_since_report as u64).min(255)
                as u8
        };

        let delay = match self.last_sender_report_time {
            Some(t) => now
                .duration_since(t)
                .map(|d| (d.as_secs_f64() * 65536.0) as u32)
                .unwrap_or(0),
            None => 0,
        };

        self.last_report_seq_num = self.last_seq_num;
        self.last_report_cycles = self.seq_num_cycles;

        rtcp::reception_report::ReceptionReport {
            ssrc: self.ssrc,
            fraction_lost,
            total_lost: self.total_lost,
            last_sequence_number: last_ext,
            jitter: self.jitter as u32,
            last_sender_report: self.last_sender_report,
            delay,
        }
    }

    pub(crate) fn stats(&self) -> ReceiveStreamStats {
        let extended_highest_sequence_number = self.extended(self.seq_num_cycles, self.last_seq_num);
        let expected = if self.started {
            extended_highest_sequence_number as i64 - self.base_seq_num as i64 + 1
        } else {
            0
        };
        ReceiveStreamStats {
            ssrc: self.ssrc,
            counter: self.counter,
            packets_lost: (expected - self.counter.packets as i64).max(0),
            extended_highest_sequence_number,
            jitter: self.jitter as u32,
            clock_rate: self.clock_rate as u32,
            last_packet_received: self.last_packet_received,
        }
    }
}
