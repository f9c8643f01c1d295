use super::*;

#[test]
fn test_sequencer_fixed_start() {
    let mut s = new_fixed_sequencer(10);
    assert_eq!(s.next_sequence_number(), 10);
    assert_eq!(s.next_sequence_number(), 11);
    assert_eq!(s.last_sequence_number(), 11);
    assert_eq!(s.roll_over_count(), 0);
}

#[test]
fn test_sequencer_roll_over() {
    let mut s = new_fixed_sequencer(u16::MAX);
    assert_eq!(s.next_sequence_number(), u16::MAX);
    assert_eq!(s.next_sequence_number(), 0);
    assert_eq!(s.roll_over_count(), 1);

    // the first number after the seed wraps from 0xFFFF
    let mut s = new_fixed_sequencer(0);
    assert_eq!(s.next_sequence_number(), 0);
    assert_eq!(s.roll_over_count(), 1);
}
