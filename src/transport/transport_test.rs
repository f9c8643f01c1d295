use super::*;

#[test]
fn test_transport_layer_state_string() {
    let tests = vec![
        ("none", TransportLayerState::None),
        ("connecting", TransportLayerState::Connecting),
        ("open", TransportLayerState::Open),
        ("closed", TransportLayerState::Closed),
        ("error", TransportLayerState::Error),
    ];

    for (raw, state) in tests {
        assert_eq!(TransportLayerState::from(raw), state);
        assert_eq!(state.to_string(), raw);
    }
    assert_eq!(TransportLayerState::from("bogus"), TransportLayerState::None);
}

#[test]
fn test_transport_layer_state_terminal() {
    assert!(!TransportLayerState::None.is_terminal());
    assert!(!TransportLayerState::Connecting.is_terminal());
    assert!(!TransportLayerState::Open.is_terminal());
    assert!(TransportLayerState::Closed.is_terminal());
    assert!(TransportLayerState::Error.is_terminal());
}

#[test]
fn test_transport_states_ready() {
    let all = [
        TransportLayerState::None,
        TransportLayerState::Connecting,
        TransportLayerState::Open,
        TransportLayerState::Closed,
        TransportLayerState::Error,
    ];

    for rtp in all {
        for rtcp in all {
            let states = TransportStates { rtp, rtcp };
            assert_eq!(
                states.is_ready(),
                rtp == TransportLayerState::Open && rtcp == TransportLayerState::Open,
                "rtp {rtp} rtcp {rtcp}"
            );
            assert_eq!(states.get(false), rtp);
            assert_eq!(states.get(true), rtcp);
        }
    }

    let mut states = TransportStates::default();
    states.set(true, TransportLayerState::Error);
    assert!(states.any_terminal());
    assert_eq!(states.rtp, TransportLayerState::None);
}
