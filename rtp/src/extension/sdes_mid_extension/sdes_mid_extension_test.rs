use super::*;

#[test]
fn test_mid_extension_round_trip() -> Result<()> {
    let ext = MidExtension {
        mid: "audio0".to_owned(),
    };
    let raw = ext.to_bytes()?;
    assert_eq!(&raw[..], b"audio0");
    assert_eq!(MidExtension::parse(&raw)?, ext);

    Ok(())
}

#[test]
fn test_mid_extension_nul_terminated() -> Result<()> {
    let ext = MidExtension::parse(b"a1\0\0")?;
    assert_eq!(ext.mid, "a1");

    Ok(())
}

#[test]
fn test_mid_extension_invalid() {
    assert!(MidExtension::parse(&[]).is_err());
    assert!(MidExtension::parse(&[0, b'a']).is_err());
    assert!(MidExtension::parse(&[b'a'; 17]).is_err());
    assert!(MidExtension::default().to_bytes().is_err());
}
