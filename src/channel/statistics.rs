use std::time::{Duration, SystemTime};

use serde::Serialize;

pub use crate::rtp_rtcp::ReportBlockData;
use crate::rtp_rtcp::RtcpPacketTypeCounter;

/// CallSendStatistics summarises the send side of a channel.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct CallSendStatistics {
    pub rtt: Option<Duration>,
    pub payload_bytes_sent: u64,
    pub header_and_padding_bytes_sent: u64,
    pub retransmitted_bytes_sent: u64,
    pub packets_sent: u64,
    pub retransmitted_packets_sent: u64,
    pub nacks_received: u32,
    pub rtcp_packet_type_counts: RtcpPacketTypeCounter,
    pub report_block_datas: Vec<ReportBlockData>,
    /// Encoded bitrate including packet overhead, once a frame was encoded.
    pub used_rate_bps: Option<u32>,
}

/// CallReceiveStatistics summarises the receive side of a channel.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct CallReceiveStatistics {
    pub remote_ssrc: Option<u32>,
    pub packets_lost: i64,
    pub jitter_ms: u32,
    pub payload_bytes_received: u64,
    pub header_and_padding_bytes_received: u64,
    pub packets_received: u64,
    pub nacks_sent: u32,
    pub last_packet_received: Option<SystemTime>,
    pub round_trip_time: Option<Duration>,
    /// Packets the jitter buffer declared lost at playout.
    pub concealed_packets: u64,
    pub decrypt_failures: u64,
}

/// ContributingSourceStats reports one CSRC seen on an inbound stream.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributingSourceStats {
    /// `csrc_<inbound id>_<csrc>`.
    pub id: String,
    pub contributor_ssrc: u32,
    pub inbound_rtp_stream_id: String,
    pub timestamp: Option<SystemTime>,
}

/// Whether an RtpSource is the synchronisation source or a contributor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum RtpSourceType {
    Ssrc,
    Csrc,
}

/// RtpSource is one entry of `ChannelReceive::get_sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RtpSource {
    pub source_id: u32,
    pub source_type: RtpSourceType,
    pub timestamp: SystemTime,
    pub rtp_timestamp: u32,
    /// Audio level in -dBov.
    pub audio_level: Option<u8>,
}
