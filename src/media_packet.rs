#[cfg(test)]
mod media_packet_test;

use std::fmt;

use bytes::Bytes;

/// MediaPacketType tags the content of a MediaPacket.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MediaPacketType {
    #[default]
    Unclassified,
    Rtp,
    Rtcp,
    Srtp,
    Srtcp,
    Dtls,
}

const MEDIA_PACKET_TYPE_UNCLASSIFIED_STR: &str = "unclassified";
const MEDIA_PACKET_TYPE_RTP_STR: &str = "rtp";
const MEDIA_PACKET_TYPE_RTCP_STR: &str = "rtcp";
const MEDIA_PACKET_TYPE_SRTP_STR: &str = "srtp";
const MEDIA_PACKET_TYPE_SRTCP_STR: &str = "srtcp";
const MEDIA_PACKET_TYPE_DTLS_STR: &str = "dtls";

impl fmt::Display for MediaPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            MediaPacketType::Unclassified => MEDIA_PACKET_TYPE_UNCLASSIFIED_STR,
            MediaPacketType::Rtp => MEDIA_PACKET_TYPE_RTP_STR,
            MediaPacketType::Rtcp => MEDIA_PACKET_TYPE_RTCP_STR,
            MediaPacketType::Srtp => MEDIA_PACKET_TYPE_SRTP_STR,
            MediaPacketType::Srtcp => MEDIA_PACKET_TYPE_SRTCP_STR,
            MediaPacketType::Dtls => MEDIA_PACKET_TYPE_DTLS_STR,
        };
        write!(f, "{s}")
    }
}

impl MediaPacketType {
    /// Classifies a datagram by its leading bytes per RFC 7983. RTCP is told
    /// apart from RTP by the packet type in the second byte (RFC 5761).
    pub fn categorize(first_byte: u8, second_byte: Option<u8>) -> Self {
        match first_byte {
            20..=63 => MediaPacketType::Dtls,
            128..=191 => match second_byte {
                Some(192..=223) => MediaPacketType::Rtcp,
                _ => MediaPacketType::Rtp,
            },
            _ => MediaPacketType::Unclassified,
        }
    }

    pub fn is_rtcp(&self) -> bool {
        matches!(self, MediaPacketType::Rtcp | MediaPacketType::Srtcp)
    }
}

/// MediaPacket is a single datagram moving between the transport handler and a pipeline.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub typ: MediaPacketType,
    pub data: Bytes,
    /// m-line index the packet was sent for, stamped by the pipeline.
    pub sdp_level: Option<usize>,
    /// The protected form of the packet, kept only so it can be dumped.
    pub encrypted_data: Option<Bytes>,
}

impl MediaPacket {
    pub fn new(typ: MediaPacketType, data: Bytes) -> Self {
        MediaPacket {
            typ,
            data,
            ..Default::default()
        }
    }

    /// Builds a packet whose type is guessed from its first bytes.
    pub fn from_datagram(data: Bytes) -> Self {
        let typ = match data.first() {
            Some(&b) => MediaPacketType::categorize(b, data.get(1).copied()),
            None => MediaPacketType::Unclassified,
        };
        MediaPacket::new(typ, data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Moves the content out, leaving an empty unclassified packet behind.
    pub fn take(&mut self) -> MediaPacket {
        std::mem::take(self)
    }
}
