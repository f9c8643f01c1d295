use super::*;

#[test]
fn test_video_content_type_values() -> Result<()> {
    assert_eq!(
        VideoContentTypeExtension::parse(&[0])?,
        VideoContentTypeExtension::Unspecified
    );
    assert_eq!(
        VideoContentTypeExtension::parse(&[1])?,
        VideoContentTypeExtension::Screenshare
    );
    // legacy bits are masked
    assert_eq!(
        VideoContentTypeExtension::parse(&[0x3F])?,
        VideoContentTypeExtension::Screenshare
    );

    let mut dst = [0xFFu8; 1];
    VideoContentTypeExtension::Screenshare.write(&mut dst)?;
    assert_eq!(dst, [1]);

    Ok(())
}

#[test]
fn test_video_content_type_invalid() {
    assert_eq!(
        VideoContentTypeExtension::parse(&[64]),
        Err(Error::InvalidVideoContentType(64))
    );
    assert!(VideoContentTypeExtension::parse(&[]).is_err());
    assert!(VideoContentTypeExtension::parse(&[0, 0]).is_err());
}
