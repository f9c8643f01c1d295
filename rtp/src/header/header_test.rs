use bytes::Bytes;

use super::*;
use crate::extension::audio_level_extension::AudioLevelExtension;
use crate::extension::ExtensionKind;

fn base_header() -> Header {
    Header {
        version: 2,
        marker: true,
        payload_type: 96,
        sequence_number: 27023,
        timestamp: 3653407706,
        ssrc: 476325762,
        ..Default::default()
    }
}

#[test]
fn test_header_rfc3550_extension() -> Result<()> {
    let raw = Bytes::from_static(&[
        0x90, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0x00, 0x01, 0x00,
        0x01, 0xFF, 0xFF, 0xFF, 0xFF,
    ]);
    let header = Header::unmarshal(&mut raw.clone())?;

    let expected = Header {
        extension: true,
        extension_profile: 1,
        extensions: vec![Extension {
            id: 0,
            payload: Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF]),
        }],
        ..base_header()
    };
    assert_eq!(header, expected);
    assert_eq!(header.marshal_size(), raw.len());
    assert_eq!(header.marshal()?, raw);

    Ok(())
}

#[test]
fn test_header_one_byte_extension() -> Result<()> {
    let raw = Bytes::from_static(&[
        0x90, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0xBE, 0xDE, 0x00,
        0x01, 0x50, 0xAA, 0x00, 0x00,
    ]);
    let header = Header::unmarshal(&mut raw.clone())?;

    assert_eq!(header.extension_profile, EXTENSION_PROFILE_ONE_BYTE);
    assert_eq!(header.get_extension_ids(), vec![5]);
    assert_eq!(header.get_extension(5), Some(Bytes::from_static(&[0xAA])));

    // the element is padded back to a full word
    assert_eq!(header.marshal()?, raw);

    Ok(())
}

#[test]
fn test_header_two_byte_extension() -> Result<()> {
    let raw = Bytes::from_static(&[
        0x90, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0x10, 0x00, 0x00,
        0x02, 0x00, 0x01, 0x00, 0x02, 0x02, 0xAA, 0xBB, 0x00,
    ]);
    let header = Header::unmarshal(&mut raw.clone())?;

    assert_eq!(header.extension_profile, EXTENSION_PROFILE_TWO_BYTE);
    // leading padding byte is skipped, a zero length element is kept
    assert_eq!(header.get_extension(1), Some(Bytes::new()));
    assert_eq!(header.get_extension(2), Some(Bytes::from_static(&[0xAA, 0xBB])));

    let reparsed = Header::unmarshal(&mut header.marshal()?)?;
    assert_eq!(reparsed, header);

    Ok(())
}

#[test]
fn test_header_truncated_extension_element() -> Result<()> {
    // id 5 announces 4 bytes but only 3 remain in the block
    let raw = Bytes::from_static(&[
        0x90, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0xBE, 0xDE, 0x00,
        0x01, 0x53, 0xAA, 0x00, 0x00,
    ]);
    let result = Header::unmarshal(&mut raw.clone());
    let err = result.err().ok_or(Error::Other("expected an error".to_owned()))?;
    assert_eq!(Error::ErrHeaderSizeInsufficientForExtension, err);

    // the block length itself overruns the packet
    let raw = Bytes::from_static(&[
        0x90, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0xBE, 0xDE, 0x00,
        0x02, 0x50, 0xAA, 0x00, 0x00,
    ]);
    assert!(Header::unmarshal(&mut raw.clone()).is_err());

    // no room for the extension header
    let raw = Bytes::from_static(&[
        0x90, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0xBE,
    ]);
    assert!(Header::unmarshal(&mut raw.clone()).is_err());

    Ok(())
}

#[test]
fn test_header_reserved_id_stops_parsing() -> Result<()> {
    let raw = Bytes::from_static(&[
        0x90, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0xBE, 0xDE, 0x00,
        0x01, 0x10, 0xAA, 0xF0, 0xBB,
    ]);
    let header = Header::unmarshal(&mut raw.clone())?;
    assert_eq!(header.get_extension_ids(), vec![1]);

    Ok(())
}

#[test]
fn test_header_id_zero_is_padding() -> Result<()> {
    // 0x05 is id 0 with a length nibble, and must be skipped as one byte
    let raw = Bytes::from_static(&[
        0x90, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0xBE, 0xDE, 0x00,
        0x02, 0x05, 0x10, 0xAA, 0x21, 0xBB, 0xCC, 0x00, 0x00,
    ]);
    let header = Header::unmarshal(&mut raw.clone())?;
    assert_eq!(header.get_extension_ids(), vec![1, 2]);
    assert_eq!(header.get_extension(1), Some(Bytes::from_static(&[0xAA])));
    assert_eq!(header.get_extension(2), Some(Bytes::from_static(&[0xBB, 0xCC])));

    Ok(())
}

#[test]
fn test_header_size_errors() -> Result<()> {
    let raw = Bytes::from_static(&[0x80, 0xe0, 0x69, 0x8f]);
    let err = Header::unmarshal(&mut raw.clone())
        .err()
        .ok_or(Error::Other("expected an error".to_owned()))?;
    assert_eq!(Error::ErrHeaderSizeInsufficient, err);

    // two CSRCs announced, none present
    let raw = Bytes::from_static(&[
        0x82, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82,
    ]);
    assert!(Header::unmarshal(&mut raw.clone()).is_err());

    let raw = Bytes::from_static(&[
        0x40, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82,
    ]);
    let err = Header::unmarshal(&mut raw.clone())
        .err()
        .ok_or(Error::Other("expected an error".to_owned()))?;
    assert_eq!(Error::ErrInvalidVersion(1), err);

    Ok(())
}

#[test]
fn test_header_csrc_round_trip() -> Result<()> {
    let header = Header {
        csrc: vec![0x11223344, 0x55667788],
        ..base_header()
    };
    let raw = header.marshal()?;
    assert_eq!(raw[0] & CC_MASK, 2);
    assert_eq!(raw.len(), CSRC_OFFSET + 2 * CSRC_LENGTH);
    assert_eq!(Header::unmarshal(&mut raw.clone())?, header);

    Ok(())
}

#[test]
fn test_header_set_extension_upgrades_profile() -> Result<()> {
    let mut header = base_header();
    header.set_extension(1, Bytes::from_static(&[0xAA]))?;
    assert_eq!(header.extension_profile, EXTENSION_PROFILE_ONE_BYTE);

    header.set_extension(20, Bytes::from_static(&[0xBB, 0xCC]))?;
    assert_eq!(header.extension_profile, EXTENSION_PROFILE_TWO_BYTE);

    // replacing keeps a single element per id
    header.set_extension(1, Bytes::from_static(&[0xDD]))?;
    assert_eq!(header.get_extension_ids(), vec![1, 20]);

    let reparsed = Header::unmarshal(&mut header.marshal()?)?;
    assert_eq!(reparsed.get_extension(1), Some(Bytes::from_static(&[0xDD])));
    assert_eq!(
        reparsed.get_extension(20),
        Some(Bytes::from_static(&[0xBB, 0xCC]))
    );

    let mut header = base_header();
    header.set_extension(2, Bytes::from(vec![0u8; 17]))?;
    assert_eq!(header.extension_profile, EXTENSION_PROFILE_TWO_BYTE);

    Ok(())
}

#[test]
fn test_header_set_extension_errors() -> Result<()> {
    let mut header = base_header();
    assert_eq!(
        header.set_extension(0, Bytes::from_static(&[0xAA])),
        Err(Error::ErrRfc8285oneByteHeaderIdrange)
    );
    // a rejected element leaves the header untouched
    assert!(!header.extension);

    let mut header = base_header();
    header.set_extension(1, Bytes::from_static(&[0xAA]))?;
    assert_eq!(
        header.set_extension(2, Bytes::from(vec![0u8; 256])),
        Err(Error::ErrRfc8285twoByteHeaderSize)
    );
    assert_eq!(header.extension_profile, EXTENSION_PROFILE_ONE_BYTE);

    Ok(())
}

#[test]
fn test_header_del_extension() -> Result<()> {
    let mut header = base_header();
    assert_eq!(
        header.del_extension(1),
        Err(Error::ErrHeaderExtensionsNotEnabled)
    );

    header.set_extension(1, Bytes::from_static(&[0xAA]))?;
    header.set_extension(2, Bytes::from_static(&[0xBB]))?;
    assert_eq!(header.del_extension(3), Err(Error::ErrHeaderExtensionNotFound));

    header.del_extension(1)?;
    assert_eq!(header.get_extension(1), None);
    header.del_extension(2)?;
    assert!(!header.extension);
    assert_eq!(header.marshal_size(), CSRC_OFFSET);

    Ok(())
}

#[test]
fn test_header_typed_extension_values() -> Result<()> {
    let mut map = ExtensionMap::new();
    map.register(ExtensionKind::AudioLevel, 1)?;

    let mut header = base_header();
    let level = AudioLevelExtension {
        level: 42,
        voice: true,
    };
    header.set_extension_value(&map, &level)?;
    assert_eq!(header.get_extension(1), Some(Bytes::from_static(&[0xAA])));

    let reparsed = Header::unmarshal(&mut header.marshal()?)?;
    assert_eq!(
        reparsed.get_extension_value::<AudioLevelExtension>(&map),
        Some(level)
    );

    // unregistered kinds read as absent and refuse to write
    let empty = ExtensionMap::new();
    assert_eq!(reparsed.get_extension_value::<AudioLevelExtension>(&empty), None);
    assert!(header.set_extension_value(&empty, &level).is_err());

    Ok(())
}
