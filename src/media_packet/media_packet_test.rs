use super::*;

#[test]
fn test_media_packet_categorize() {
    let tests = vec![
        (20u8, None, MediaPacketType::Dtls),
        (63, Some(0), MediaPacketType::Dtls),
        (0x80, Some(96), MediaPacketType::Rtp),
        (0x90, Some(0xe0), MediaPacketType::Rtp),
        (0x80, Some(200), MediaPacketType::Rtcp),
        (0x81, Some(201), MediaPacketType::Rtcp),
        (0x80, Some(223), MediaPacketType::Rtcp),
        (0x80, Some(224), MediaPacketType::Rtp),
        (0x80, None, MediaPacketType::Rtp),
        (0, Some(1), MediaPacketType::Unclassified),
        (64, None, MediaPacketType::Unclassified),
        (192, Some(200), MediaPacketType::Unclassified),
    ];

    for (first, second, expected) in tests {
        assert_eq!(
            MediaPacketType::categorize(first, second),
            expected,
            "categorize({first}, {second:?})"
        );
    }
}

#[test]
fn test_media_packet_take() {
    let mut packet = MediaPacket::from_datagram(Bytes::from_static(&[0x80, 0xc8, 0x00, 0x06]));
    assert_eq!(packet.typ, MediaPacketType::Rtcp);
    assert_eq!(packet.len(), 4);

    let taken = packet.take();
    assert_eq!(taken.typ, MediaPacketType::Rtcp);
    assert_eq!(taken.len(), 4);
    assert!(packet.is_empty());
    assert_eq!(packet.typ, MediaPacketType::Unclassified);

    // a second take yields nothing
    assert!(packet.take().is_empty());
}

#[test]
fn test_media_packet_type_string() {
    assert_eq!(MediaPacketType::Srtcp.to_string(), "srtcp");
    assert!(MediaPacketType::Srtcp.is_rtcp());
    assert!(!MediaPacketType::Rtp.is_rtcp());
}
