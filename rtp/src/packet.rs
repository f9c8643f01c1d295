
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;

/// Packet represents an RTP Packet
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
    /// Number of padding bytes appended on marshal, or stripped on unmarshal.
    pub padding_size: u8,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = "RTP PACKET:\n".to_string();

        out += format!("\tVersion: {}\n", self.header.version).as_str();
        out += format!("\tMarker: {}\n", self.header.marker).as_str();
        out += format!("\tPayload Type: {}\n", self.header.payload_type).as_str();
        out += format!("\tSequence Number: {}\n", self.header.sequence_number).as_str();
        out += format!("\tTimestamp: {}\n", self.header.timestamp).as_str();
        out += format!("\tSSRC: {} ({:x})\n", self.header.ssrc, self.header.ssrc).as_str();
        out += format!("\tPayload Length: {}\n", self.payload.len()).as_str();

        write!(f, "{out}")
    }
}

impl Unmarshal for Packet {
    /// Parses a full RTP packet. Trailing padding announced by the P bit is
    /// removed from the payload.
    fn unmarshal<B>(raw_packet: &mut B) -> std::result::Result<Self, util::Error>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw_packet)?;
        let payload_len = raw_packet.remaining();
        let mut payload = raw_packet.copy_to_bytes(payload_len);

        let padding_size = if header.padding {
            if payload_len == 0 {
                return Err(Error::ErrShortPacket.into());
            }
            let padding_size = payload[payload_len - 1];
            if padding_size == 0 || padding_size as usize > payload_len {
                return Err(Error::ErrInvalidPadding.into());
            }
            payload.truncate(payload_len - padding_size as usize);
            padding_size
        } else {
            0
        };

        Ok(Packet {
            header,
            payload,
            padding_size,
        })
    }
}

impl MarshalSize for Packet {
    fn marshal_size(&self) -> usize {
        let padding = if self.header.padding {
            self.padding_size as usize
        } else {
            0
        };
        self.header.marshal_size() + self.payload.len() + padding
    }
}

impl Marshal for Packet {
    fn marshal_to(&self, mut buf: &mut [u8]) -> std::result::Result<usize, util::Error> {
        if self.header.padding && self.padding_size == 0 {
            return Err(Error::ErrInvalidPadding.into());
        }
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::ErrBufferTooSmall.into());
        }

        let n = self.header.marshal_to(buf)?;
        buf = &mut buf[n..];
        buf.put(&*self.payload);

        let padding_len = if self.header.padding {
            let padding_len = self.padding_size as usize;
            for i in 0..padding_len {
                if i != padding_len - 1 {
                    buf.put_u8(0);
                } else {
                    buf.put_u8(self.padding_size);
                }
            }
            padding_len
        } else {
            0
        };

        Ok(n + self.payload.len() + padding_len)
    }
}
