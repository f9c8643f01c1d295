use super::*;

#[test]
fn test_csrc_audio_level_round_trip() -> Result<()> {
    let raw = [0x0A, 0x7F, 0x00];
    let ext = CsrcAudioLevelExtension::parse(&raw)?;
    assert_eq!(ext.levels, vec![10, 127, 0]);
    assert_eq!(ext.value_size(), 3);
    assert_eq!(&ext.to_bytes()?[..], &raw[..]);

    Ok(())
}

#[test]
fn test_csrc_audio_level_masks_high_bit() -> Result<()> {
    let ext = CsrcAudioLevelExtension::parse(&[0x8A])?;
    assert_eq!(ext.levels, vec![10]);

    Ok(())
}

#[test]
fn test_csrc_audio_level_bounds() -> Result<()> {
    assert!(CsrcAudioLevelExtension::parse(&[]).is_err());
    assert!(CsrcAudioLevelExtension::parse(&[0u8; 16]).is_err());
    assert!(CsrcAudioLevelExtension::parse(&[0u8; 15]).is_ok());

    let empty = CsrcAudioLevelExtension::default();
    assert_eq!(empty.write(&mut []), Err(Error::CsrcAudioLevelCount));

    Ok(())
}
