use rtp::packet::Packet;

const UINT16SIZE_HALF: u16 = 1 << 15;

/// PacketHistory keeps the most recent sent packets, indexed by sequence
/// number, so that NACKed packets can be retransmitted.
pub(crate) struct PacketHistory {
    packets: Vec<Option<Packet>>,
    size: u16,
    last_added: u16,
    started: bool,
}

impl PacketHistory {
    /// Holds at least `capacity` packets, rounded up to a power of two.
    pub(crate) fn new(capacity: u16) -> Self {
        let size = capacity.clamp(1, UINT16SIZE_HALF).next_power_of_two();
        PacketHistory {
            packets: vec![None; size as usize],
            size,
            last_added: 0,
            started: false,
        }
    }

    pub(crate) fn capacity(&self) -> u16 {
        self.size
    }

    pub(crate) fn add(&mut self, packet: &Packet) {
        let seq = packet.header.sequence_number;
        if !self.started {
            self.packets[(seq % self.size) as usize] = Some(packet.clone());
            self.last_added = seq;
            self.started = true;
            return;
        }

        let diff = seq.wrapping_sub(self.last_added);
        if diff == 0 {
            return;
        } else if diff < UINT16SIZE_HALF {
            // slots skipped over belong to packets from a full cycle ago
            let mut i = self.last_added.wrapping_add(1);
            while i != seq {
                self.packets[(i % self.size) as usize] = None;
                i = i.wrapping_add(1);
            }
        }

        self.packets[(seq % self.size) as usize] = Some(packet.clone());
        self.last_added = seq;
    }

    pub(crate) fn get(&self, seq: u16) -> Option<&Packet> {
        let diff = self.last_added.wrapping_sub(seq);
        if diff >= UINT16SIZE_HALF || diff >= self.size {
            return None;
        }

        self.packets[(seq % self.size) as usize]
            .as_ref()
            .filter(|p| p.header.sequence_number == seq)
    }
}
