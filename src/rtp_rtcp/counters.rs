use std::time::{Duration, SystemTime};

use serde::Serialize;
use util::marshal::MarshalSize;

/// RtpPacketCounter accumulates the byte split of a set of RTP packets.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct RtpPacketCounter {
    pub header_bytes: u64,
    pub payload_bytes: u64,
    pub padding_bytes: u64,
    pub packets: u64,
}

impl RtpPacketCounter {
    pub fn add_packet(&mut self, packet: &rtp::packet::Packet) {
        self.header_bytes += packet.header.marshal_size() as u64;
        self.payload_bytes += packet.payload.len() as u64;
        self.padding_bytes += packet.padding_size as u64;
        self.packets += 1;
    }

    pub fn total_bytes(&self) -> u64 {
        self.header_bytes + self.payload_bytes + self.padding_bytes
    }
}

/// StreamDataCounters are the send counters of one RTP stream.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDataCounters {
    pub first_packet_time: Option<SystemTime>,
    /// Every packet put on the wire, retransmissions included.
    pub transmitted: RtpPacketCounter,
    pub retransmitted: RtpPacketCounter,
}

/// RtcpPacketTypeCounter counts NACK feedback received about our stream,
/// and sent about remote streams.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct RtcpPacketTypeCounter {
    pub nack_packets: u32,
    pub nack_requests: u32,
    /// Requests that named a packet no longer in the history.
    pub nack_requests_missed: u32,
    pub nack_packets_sent: u32,
}

/// ReportBlockData is a reception report about one of our streams, plus the
/// round trip time derived from it.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct ReportBlockData {
    /// SSRC of the endpoint that sent the report.
    pub sender_ssrc: u32,
    /// SSRC of the stream the report is about.
    pub source_ssrc: u32,
    pub fraction_lost_raw: u8,
    pub cumulative_lost: u32,
    pub extended_highest_sequence_number: u32,
    pub jitter: u32,
    pub report_block_time: Option<SystemTime>,
    pub last_rtt: Option<Duration>,
    pub sum_rtt: Duration,
    pub num_rtts: u32,
}

impl ReportBlockData {
    /// Loss fraction in [0, 1).
    pub fn fraction_lost(&self) -> f32 {
        self.fraction_lost_raw as f32 / 256.0
    }

    pub fn avg_rtt(&self) -> Option<Duration> {
        if self.num_rtts == 0 {
            None
        } else {
            Some(self.sum_rtt / self.num_rtts)
        }
    }

    pub(crate) fn set_report_block(
        &mut self,
        sender_ssrc: u32,
        block: &rtcp::reception_report::ReceptionReport,
        now: SystemTime,
    ) {
        self.sender_ssrc = sender_ssrc;
        self.source_ssrc = block.ssrc;
        self.fraction_lost_raw = block.fraction_lost;
        self.cumulative_lost = block.total_lost;
        self.extended_highest_sequence_number = block.last_sequence_number;
        self.jitter = block.jitter;
        self.report_block_time = Some(now);
    }

    pub(crate) fn add_rtt(&mut self, rtt: Duration) {
        self.last_rtt = Some(rtt);
        self.sum_rtt += rtt;
        self.num_rtts += 1;
    }
}
