use std::time::{Duration, UNIX_EPOCH};

use super::*;

#[test]
fn test_abs_capture_time_without_offset() -> Result<()> {
    let ext = AbsoluteCaptureTimeExtension {
        timestamp: 0x0102030405060708,
        estimated_capture_clock_offset: None,
    };
    let raw = ext.to_bytes()?;
    assert_eq!(&raw[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(AbsoluteCaptureTimeExtension::parse(&raw)?, ext);

    Ok(())
}

#[test]
fn test_abs_capture_time_with_offset() -> Result<()> {
    let ext = AbsoluteCaptureTimeExtension {
        timestamp: 0x0102030405060708,
        estimated_capture_clock_offset: Some(-1),
    };
    let raw = ext.to_bytes()?;
    assert_eq!(raw.len(), ABS_CAPTURE_TIME_EXTENSION_SIZE);
    assert_eq!(&raw[8..], &[0xFF; 8]);
    assert_eq!(AbsoluteCaptureTimeExtension::parse(&raw)?, ext);

    Ok(())
}

#[test]
fn test_abs_capture_time_wrong_size() {
    for len in [0usize, 7, 9, 15, 17] {
        let data = vec![0u8; len];
        assert_eq!(
            AbsoluteCaptureTimeExtension::parse(&data),
            Err(Error::ErrExtensionValueSize(len))
        );
    }
}

#[test]
fn test_abs_capture_time_system_time() {
    let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let ext = AbsoluteCaptureTimeExtension::new(t);
    assert_eq!(ext.capture_time(), t);
}
