#[cfg(test)]
mod sequence_test;

/// Sequencer generates sequential sequence numbers for building RTP packets
pub trait Sequencer {
    fn next_sequence_number(&mut self) -> u16;
    fn roll_over_count(&self) -> u64;
}

/// Returns a new sequencer starting from a random sequence number
pub fn new_random_sequencer() -> SequencerImpl {
    SequencerImpl {
        sequence_number: rand::random::<u16>(),
        roll_over_count: 0,
    }
}

/// Returns a new sequencer whose first number is `s`
pub fn new_fixed_sequencer(s: u16) -> SequencerImpl {
    SequencerImpl {
        sequence_number: s.wrapping_sub(1),
        roll_over_count: 0,
    }
}

#[derive(Debug, Clone)]
pub struct SequencerImpl {
    sequence_number: u16,
    roll_over_count: u64,
}

impl SequencerImpl {
    /// The number handed out by the last call to `next_sequence_number`.
    pub fn last_sequence_number(&self) -> u16 {
        self.sequence_number
    }
}

impl Sequencer for SequencerImpl {
    /// Increments and returns a new sequence number for building RTP packets
    fn next_sequence_number(&mut self) -> u16 {
        self.sequence_number = self.sequence_number.wrapping_add(1);
        if self.sequence_number == 0 {
            self.roll_over_count += 1;
        }
        self.sequence_number
    }

    /// The amount of times the 16bit sequence number has wrapped
    fn roll_over_count(&self) -> u64 {
        self.roll_over_count
    }
}
