use super::*;

#[test]
fn test_audio_level_extension_wrong_size() -> Result<()> {
    assert_eq!(
        AudioLevelExtension::parse(&[]),
        Err(Error::ErrExtensionValueSize(0))
    );
    assert_eq!(
        AudioLevelExtension::parse(&[0x88, 0x00]),
        Err(Error::ErrExtensionValueSize(2))
    );

    Ok(())
}

#[test]
fn test_audio_level_extension_voice_true() -> Result<()> {
    let raw = [0x88];
    let a1 = AudioLevelExtension::parse(&raw)?;
    let a2 = AudioLevelExtension {
        level: 8,
        voice: true,
    };
    assert_eq!(a1, a2);

    let mut dst = [0u8; AUDIO_LEVEL_EXTENSION_SIZE];
    a2.write(&mut dst)?;
    assert_eq!(raw, dst);

    Ok(())
}

#[test]
fn test_audio_level_extension_voice_false() -> Result<()> {
    let raw = [0x8];
    let a1 = AudioLevelExtension::parse(&raw)?;
    let a2 = AudioLevelExtension {
        level: 8,
        voice: false,
    };
    assert_eq!(a1, a2);
    assert_eq!(&a2.to_bytes()?[..], &raw[..]);

    Ok(())
}

#[test]
fn test_audio_level_extension_voice_activity_42() -> Result<()> {
    let a = AudioLevelExtension {
        level: 42,
        voice: true,
    };
    let mut dst = [0u8; 1];
    a.write(&mut dst)?;
    assert_eq!(dst, [0xAA]);
    assert_eq!(AudioLevelExtension::parse(&dst)?, a);

    Ok(())
}

#[test]
fn test_audio_level_extension_level_overflow() -> Result<()> {
    let a = AudioLevelExtension {
        level: 128,
        voice: false,
    };

    let mut dst = [0u8; 1];
    let result = a.write(&mut dst);
    assert_eq!(result, Err(Error::AudioLevelOverflow));

    Ok(())
}
