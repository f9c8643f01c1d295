use super::*;

const ABS_SEND_TIME_RESOLUTION: u128 = 4_000; // just under 1/2^18 s in ns

#[test]
fn test_ntp_conversion() -> Result<()> {
    // 1985-06-23T09:00:00Z
    let t = UNIX_EPOCH + Duration::from_secs(488_365_200);
    assert_eq!(unix2ntp(t), 0xa0c65b1000000000);
    assert_eq!(ntp2unix(0xa0c65b1000000000), t);

    let t = UNIX_EPOCH + Duration::new(1_553_711_970, 8_675_309);
    let back = ntp2unix(unix2ntp(t));
    let diff = t.duration_since(back).unwrap_or_default().as_nanos();
    assert!(diff <= 1, "round trip drifted by {diff}ns");

    Ok(())
}

#[test]
fn test_abs_send_time_extension_round_trip() -> Result<()> {
    let raw = [0x12, 0x34, 0x56];
    let ext = AbsSendTimeExtension::parse(&raw)?;
    assert_eq!(ext.timestamp, 0x123456);
    assert_eq!(&ext.to_bytes()?[..], &raw[..]);

    Ok(())
}

#[test]
fn test_abs_send_time_extension_wrong_size() {
    assert!(AbsSendTimeExtension::parse(&[]).is_err());
    assert!(AbsSendTimeExtension::parse(&[0x12, 0x34]).is_err());
    assert!(AbsSendTimeExtension::parse(&[0x12, 0x34, 0x56, 0x78]).is_err());
}

#[test]
fn test_abs_send_time_extension_estimate() -> Result<()> {
    let send = UNIX_EPOCH + Duration::new(1_553_711_970, 500_000_000);
    let receive = send + Duration::from_millis(250);

    let ext = AbsSendTimeExtension::new(send);
    let estimated = ext.estimate(receive);

    let diff = if estimated > send {
        estimated.duration_since(send).unwrap_or_default()
    } else {
        send.duration_since(estimated).unwrap_or_default()
    };
    assert!(
        diff.as_nanos() < ABS_SEND_TIME_RESOLUTION,
        "estimate off by {diff:?}"
    );

    Ok(())
}
