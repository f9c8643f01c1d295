#[cfg(test)]
mod header_test;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::{Error, Result};
use crate::extension::extension_map::ExtensionMap;
use crate::extension::HeaderExtension;

pub const HEADER_LENGTH: usize = 4;
pub const VERSION_SHIFT: u8 = 6;
pub const VERSION_MASK: u8 = 0x3;
pub const PADDING_SHIFT: u8 = 5;
pub const PADDING_MASK: u8 = 0x1;
pub const EXTENSION_SHIFT: u8 = 4;
pub const EXTENSION_MASK: u8 = 0x1;
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;
pub const EXTENSION_PROFILE_TWO_BYTE: u16 = 0x1000;
pub const EXTENSION_ID_RESERVED: u8 = 0xF;
pub const ONE_BYTE_MAX_ID: u8 = 14;
pub const ONE_BYTE_MAX_PAYLOAD: usize = 16;
pub const TWO_BYTE_MAX_PAYLOAD: usize = 255;
pub const CC_MASK: u8 = 0xF;
pub const MARKER_SHIFT: u8 = 7;
pub const MARKER_MASK: u8 = 0x1;
pub const PT_MASK: u8 = 0x7F;
pub const CSRC_OFFSET: usize = 12;
pub const CSRC_LENGTH: usize = 4;
pub const MAX_CSRCS: usize = 15;
pub const RTP_VERSION: u8 = 2;

#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Extension {
    pub id: u8,
    pub payload: Bytes,
}

/// Header represents an RTP packet header.
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: u16,
    pub extensions: Vec<Extension>,
}

impl Unmarshal for Header {
    /// Parses an RTP header. Every read is bounds-checked against what remains
    /// in `raw_packet`, so truncated input is an error rather than a panic.
    fn unmarshal<B>(raw_packet: &mut B) -> std::result::Result<Self, util::Error>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < CSRC_OFFSET {
            return Err(Error::ErrHeaderSizeInsufficient.into());
        }
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|X|  CC   |M|     PT      |       sequence number         |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                           timestamp                           |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |           synchronization source (SSRC) identifier            |
         * +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
         * |            contributing source (CSRC) identifiers             |
         * |                             ....                              |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        let b0 = raw_packet.get_u8();
        let version = b0 >> VERSION_SHIFT & VERSION_MASK;
        if version != RTP_VERSION {
            return Err(Error::ErrInvalidVersion(version).into());
        }
        let padding = (b0 >> PADDING_SHIFT & PADDING_MASK) > 0;
        let extension = (b0 >> EXTENSION_SHIFT & EXTENSION_MASK) > 0;
        let cc = (b0 & CC_MASK) as usize;

        if raw_packet_len < CSRC_OFFSET + cc * CSRC_LENGTH {
            return Err(Error::ErrHeaderSizeInsufficient.into());
        }

        let b1 = raw_packet.get_u8();
        let marker = (b1 >> MARKER_SHIFT & MARKER_MASK) > 0;
        let payload_type = b1 & PT_MASK;

        let sequence_number = raw_packet.get_u16();
        let timestamp = raw_packet.get_u32();
        let ssrc = raw_packet.get_u32();

        let mut csrc = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrc.push(raw_packet.get_u32());
        }

        let (extension_profile, extensions) = if extension {
            if raw_packet.remaining() < 4 {
                return Err(Error::ErrHeaderSizeInsufficientForExtension.into());
            }
            let extension_profile = raw_packet.get_u16();
            let extension_length = raw_packet.get_u16() as usize * 4;
            if raw_packet.remaining() < extension_length {
                return Err(Error::ErrHeaderSizeInsufficientForExtension.into());
            }

            let block = raw_packet.copy_to_bytes(extension_length);
            let extensions = match extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => parse_one_byte_extensions(block)?,
                EXTENSION_PROFILE_TWO_BYTE => parse_two_byte_extensions(block)?,
                // RFC 3550 extension, kept opaque
                _ => vec![Extension {
                    id: 0,
                    payload: block,
                }],
            };

            (extension_profile, extensions)
        } else {
            (0, vec![])
        };

        Ok(Header {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_profile,
            extensions,
        })
    }
}

/// RFC 8285 one-byte elements: `ID(4) | L(4)` followed by L+1 bytes.
fn parse_one_byte_extensions(mut block: Bytes) -> Result<Vec<Extension>> {
    let mut extensions = vec![];
    while block.has_remaining() {
        let b = block.get_u8();
        let id = b >> 4;
        if id == 0 {
            // padding; a nonzero length nibble is ignored
            continue;
        }

        if id == EXTENSION_ID_RESERVED {
            // the rest of the block must be ignored
            break;
        }

        let len = ((b & 0x0F) + 1) as usize;
        if block.remaining() < len {
            return Err(Error::ErrHeaderSizeInsufficientForExtension);
        }
        extensions.push(Extension {
            id,
            payload: block.copy_to_bytes(len),
        });
    }
    Ok(extensions)
}

/// RFC 8285 two-byte elements: `ID(8) | L(8)` followed by L bytes.
fn parse_two_byte_extensions(mut block: Bytes) -> Result<Vec<Extension>> {
    let mut extensions = vec![];
    while block.has_remaining() {
        let id = block.get_u8();
        if id == 0x00 {
            // padding
            continue;
        }

        if !block.has_remaining() {
            return Err(Error::ErrHeaderSizeInsufficientForExtension);
        }
        let len = block.get_u8() as usize;
        if block.remaining() < len {
            return Err(Error::ErrHeaderSizeInsufficientForExtension);
        }
        extensions.push(Extension {
            id,
            payload: block.copy_to_bytes(len),
        });
    }
    Ok(extensions)
}

impl MarshalSize for Header {
    fn marshal_size(&self) -> usize {
        let mut head_size = CSRC_OFFSET + (self.csrc.len() * CSRC_LENGTH);
        if self.extension {
            head_size += 4 + (self.get_extension_payload_len() + 3) / 4 * 4;
        }
        head_size
    }
}

impl Marshal for Header {
    fn marshal_to(&self, mut buf: &mut [u8]) -> std::result::Result<usize, util::Error> {
        let remaining_before = buf.remaining_mut();
        if remaining_before < self.marshal_size() {
            return Err(Error::ErrBufferTooSmall.into());
        }
        if self.csrc.len() > MAX_CSRCS {
            return Err(Error::ErrHeaderSizeInsufficient.into());
        }

        // The first byte contains the version, padding bit, extension bit, and csrc size
        let mut b0 = (self.version << VERSION_SHIFT) | self.csrc.len() as u8;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        if self.extension {
            b0 |= 1 << EXTENSION_SHIFT;
        }
        buf.put_u8(b0);

        // The second byte contains the marker bit and payload type.
        let mut b1 = self.payload_type & PT_MASK;
        if self.marker {
            b1 |= 1 << MARKER_SHIFT;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.extension {
            buf.put_u16(self.extension_profile);

            let extension_payload_len = self.get_extension_payload_len();
            if self.extension_profile != EXTENSION_PROFILE_ONE_BYTE
                && self.extension_profile != EXTENSION_PROFILE_TWO_BYTE
                && extension_payload_len % 4 != 0
            {
                return Err(Error::HeaderExtensionPayloadNot32BitWords.into());
            }
            let extension_payload_size = (extension_payload_len + 3) / 4;
            buf.put_u16(extension_payload_size as u16);

            match self.extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    for extension in &self.extensions {
                        let len = extension.payload.len();
                        if len == 0 || len > ONE_BYTE_MAX_PAYLOAD {
                            return Err(Error::ErrRfc8285oneByteHeaderSize.into());
                        }
                        buf.put_u8((extension.id << 4) | (len as u8 - 1));
                        buf.put(&*extension.payload);
                    }
                }
                EXTENSION_PROFILE_TWO_BYTE => {
                    for extension in &self.extensions {
                        if extension.payload.len() > TWO_BYTE_MAX_PAYLOAD {
                            return Err(Error::ErrRfc8285twoByteHeaderSize.into());
                        }
                        buf.put_u8(extension.id);
                        buf.put_u8(extension.payload.len() as u8);
                        buf.put(&*extension.payload);
                    }
                }
                _ => {
                    if self.extensions.len() != 1 {
                        return Err(Error::ErrRfc3550headerIdrange.into());
                    }
                    if let Some(extension) = self.extensions.first() {
                        buf.put(&*extension.payload);
                    }
                }
            };

            for _ in extension_payload_len..extension_payload_size * 4 {
                buf.put_u8(0);
            }
        }

        Ok(remaining_before - buf.remaining_mut())
    }
}

impl Header {
    /// Length of the extension elements without the trailing word padding.
    pub fn get_extension_payload_len(&self) -> usize {
        let payload_len: usize = self
            .extensions
            .iter()
            .map(|extension| extension.payload.len())
            .sum();

        let profile_len = self.extensions.len()
            * match self.extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => 1,
                EXTENSION_PROFILE_TWO_BYTE => 2,
                _ => 0,
            };

        payload_len + profile_len
    }

    fn needs_two_byte(id: u8, len: usize) -> bool {
        id > ONE_BYTE_MAX_ID || len == 0 || len > ONE_BYTE_MAX_PAYLOAD
    }

    /// Sets an RTP header extension, choosing (or upgrading to) the two-byte
    /// profile when the id or payload does not fit the one-byte form.
    pub fn set_extension(&mut self, id: u8, payload: Bytes) -> Result<()> {
        let profile = if !self.extension || self.extension_profile == EXTENSION_PROFILE_ONE_BYTE
        {
            if Self::needs_two_byte(id, payload.len()) {
                EXTENSION_PROFILE_TWO_BYTE
            } else {
                EXTENSION_PROFILE_ONE_BYTE
            }
        } else {
            self.extension_profile
        };

        match profile {
            EXTENSION_PROFILE_ONE_BYTE => {
                if !(1..=ONE_BYTE_MAX_ID).contains(&id) {
                    return Err(Error::ErrRfc8285oneByteHeaderIdrange);
                }
                if payload.len() > ONE_BYTE_MAX_PAYLOAD {
                    return Err(Error::ErrRfc8285oneByteHeaderSize);
                }
            }
            EXTENSION_PROFILE_TWO_BYTE => {
                if id < 1 {
                    return Err(Error::ErrRfc8285twoByteHeaderIdrange);
                }
                if payload.len() > TWO_BYTE_MAX_PAYLOAD {
                    return Err(Error::ErrRfc8285twoByteHeaderSize);
                }
            }
            _ => {
                if id != 0 {
                    return Err(Error::ErrRfc3550headerIdrange);
                }
            }
        }

        if !self.extension {
            self.extension = true;
            self.extensions.clear();
        }
        self.extension_profile = profile;

        if let Some(extension) = self.extensions.iter_mut().find(|e| e.id == id) {
            extension.payload = payload;
        } else {
            self.extensions.push(Extension { id, payload });
        }
        Ok(())
    }

    /// returns an extension id array
    pub fn get_extension_ids(&self) -> Vec<u8> {
        if self.extension {
            self.extensions.iter().map(|e| e.id).collect()
        } else {
            vec![]
        }
    }

    /// returns an RTP header extension
    pub fn get_extension(&self, id: u8) -> Option<Bytes> {
        if self.extension {
            self.extensions
                .iter()
                .find(|extension| extension.id == id)
                .map(|extension| extension.payload.clone())
        } else {
            None
        }
    }

    /// Removes an RTP header extension. The extension bit is cleared once the
    /// last element is gone.
    pub fn del_extension(&mut self, id: u8) -> Result<()> {
        if !self.extension {
            return Err(Error::ErrHeaderExtensionsNotEnabled);
        }
        let index = self
            .extensions
            .iter()
            .position(|extension| extension.id == id)
            .ok_or(Error::ErrHeaderExtensionNotFound)?;
        self.extensions.remove(index);
        if self.extensions.is_empty() {
            self.extension = false;
            self.extension_profile = 0;
        }
        Ok(())
    }

    /// Reads a typed extension through the negotiated id map. Unregistered,
    /// absent or malformed values all read as `None`.
    pub fn get_extension_value<E: HeaderExtension>(&self, map: &ExtensionMap) -> Option<E> {
        let id = map.id(E::KIND)?;
        let payload = self.get_extension(id)?;
        E::parse(&payload).ok()
    }

    /// Writes a typed extension under its negotiated id.
    pub fn set_extension_value<E: HeaderExtension>(
        &mut self,
        map: &ExtensionMap,
        value: &E,
    ) -> Result<()> {
        let id = map
            .id(E::KIND)
            .ok_or(Error::ErrExtensionNotRegistered(E::URI))?;
        self.set_extension(id, value.to_bytes()?)
    }
}
