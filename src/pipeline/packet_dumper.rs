use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::event::MediaEventProducer;

/// PacketDumpType is the form a dumped packet was captured in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketDumpType {
    Rtp,
    Srtp,
    Rtcp,
    Srtcp,
}

impl fmt::Display for PacketDumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            PacketDumpType::Rtp => "rtp",
            PacketDumpType::Srtp => "srtp",
            PacketDumpType::Rtcp => "rtcp",
            PacketDumpType::Srtcp => "srtcp",
        };
        write!(f, "{s}")
    }
}

/// PacketDump is one captured packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketDump {
    pub level: usize,
    pub typ: PacketDumpType,
    pub sending: bool,
    pub data: Bytes,
}

type DumpKey = (usize, PacketDumpType, bool);

/// PacketDumper captures the packets of one peer connection for diagnostics.
/// Nothing is captured until a (level, type, direction) triple is enabled.
#[derive(Debug, Default)]
pub struct PacketDumper {
    pc_id: String,
    enabled: Mutex<HashSet<DumpKey>>,
    packet_dumped: MediaEventProducer<PacketDump>,
}

impl PacketDumper {
    pub fn new(pc_id: impl Into<String>) -> Self {
        PacketDumper {
            pc_id: pc_id.into(),
            ..Default::default()
        }
    }

    pub fn pc_id(&self) -> &str {
        &self.pc_id
    }

    pub fn enable(&self, level: usize, typ: PacketDumpType, sending: bool) {
        self.enabled.lock().insert((level, typ, sending));
    }

    pub fn disable(&self, level: usize, typ: PacketDumpType, sending: bool) {
        self.enabled.lock().remove(&(level, typ, sending));
    }

    pub fn should_dump(&self, level: usize, typ: PacketDumpType, sending: bool) -> bool {
        self.enabled.lock().contains(&(level, typ, sending))
    }

    pub fn packet_dumped(&self) -> &MediaEventProducer<PacketDump> {
        &self.packet_dumped
    }

    pub fn dump(&self, level: usize, typ: PacketDumpType, sending: bool, data: &Bytes) {
        if !self.should_dump(level, typ, sending) {
            return;
        }
        log::trace!(
            "{} dumping {} bytes of {typ} at level {level} sending={sending}",
            self.pc_id,
            data.len()
        );
        self.packet_dumped.notify(PacketDump {
            level,
            typ,
            sending,
            data: data.clone(),
        });
    }
}
