use super::*;

fn bt2020_pq() -> ColorSpaceExtension {
    ColorSpaceExtension {
        primaries: 9,
        transfer: 16,
        matrix: 9,
        range: ColorRange::Limited,
        chroma_siting_horizontal: ChromaSiting::Collocated,
        chroma_siting_vertical: ChromaSiting::Half,
        hdr_metadata: None,
    }
}

#[test]
fn test_color_space_without_hdr() -> Result<()> {
    let cs = bt2020_pq();
    let raw = cs.to_bytes()?;
    assert_eq!(&raw[..], &[9, 16, 9, 0b0001_0110]);
    assert_eq!(ColorSpaceExtension::parse(&raw)?, cs);

    Ok(())
}

#[test]
fn test_color_space_with_hdr() -> Result<()> {
    let mut cs = bt2020_pq();
    cs.hdr_metadata = Some(HdrMetadata {
        mastering_metadata: HdrMasteringMetadata {
            primary_r: Chromaticity { x: 0.708, y: 0.292 },
            primary_g: Chromaticity { x: 0.17, y: 0.797 },
            primary_b: Chromaticity { x: 0.131, y: 0.046 },
            white_point: Chromaticity {
                x: 0.3127,
                y: 0.329,
            },
            luminance_max: 1000.0,
            luminance_min: 0.005,
        },
        max_content_light_level: 1000,
        max_frame_average_light_level: 400,
    });

    let raw = cs.to_bytes()?;
    assert_eq!(raw.len(), COLOR_SPACE_EXTENSION_SIZE);

    let parsed = ColorSpaceExtension::parse(&raw)?;
    let hdr = parsed.hdr_metadata.unwrap_or_default();
    assert_eq!(hdr.max_content_light_level, 1000);
    assert_eq!(hdr.max_frame_average_light_level, 400);
    assert_eq!(hdr.mastering_metadata.luminance_max, 1000.0);
    assert!((hdr.mastering_metadata.luminance_min - 0.005).abs() < 1e-4);
    assert!((hdr.mastering_metadata.white_point.x - 0.3127).abs() < 1e-4);

    // the parsed values are exactly representable, so a second pass is stable
    assert_eq!(parsed.to_bytes()?, raw);

    Ok(())
}

#[test]
fn test_color_space_presence_from_length() -> Result<()> {
    let mut raw = vec![1u8, 1, 1, 0];
    raw.extend_from_slice(&[0u8; 24]);
    let parsed = ColorSpaceExtension::parse(&raw)?;
    assert!(parsed.hdr_metadata.is_some());

    let parsed = ColorSpaceExtension::parse(&raw[..4])?;
    assert!(parsed.hdr_metadata.is_none());

    Ok(())
}

#[test]
fn test_color_space_invalid_values() {
    assert_eq!(
        ColorSpaceExtension::parse(&[3, 1, 1, 0]),
        Err(Error::InvalidColorSpace("primaries", 3))
    );
    assert_eq!(
        ColorSpaceExtension::parse(&[1, 3, 1, 0]),
        Err(Error::InvalidColorSpace("transfer", 3))
    );
    assert_eq!(
        ColorSpaceExtension::parse(&[1, 1, 3, 0]),
        Err(Error::InvalidColorSpace("matrix", 3))
    );
    assert_eq!(
        ColorSpaceExtension::parse(&[1, 1, 1, 0b0000_0011]),
        Err(Error::InvalidColorSpace("chroma siting", 3))
    );
    assert!(ColorSpaceExtension::parse(&[1, 1, 1]).is_err());
    assert!(ColorSpaceExtension::parse(&[0u8; 27]).is_err());
}

#[test]
fn test_color_space_invalid_hdr() {
    let mut raw = vec![1u8, 1, 1, 0];
    raw.extend_from_slice(&[0u8; 24]);
    // luminance_min of 6.0 cd/m^2 is out of range
    raw[6..8].copy_from_slice(&60000u16.to_be_bytes());
    assert_eq!(
        ColorSpaceExtension::parse(&raw),
        Err(Error::InvalidHdrMetadata)
    );
}
