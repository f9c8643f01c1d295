use super::*;

#[test]
fn test_video_frame_tracking_id() -> Result<()> {
    let raw = [0xAB, 0xCD];
    let ext = VideoFrameTrackingIdExtension::parse(&raw)?;
    assert_eq!(ext.tracking_id, 0xABCD);
    assert_eq!(&ext.to_bytes()?[..], &raw[..]);

    assert!(VideoFrameTrackingIdExtension::parse(&raw[..1]).is_err());
    assert!(VideoFrameTrackingIdExtension::parse(&[0, 0, 0]).is_err());

    Ok(())
}
