#[cfg(test)]
mod color_space_extension_test;

use serde::{Deserialize, Serialize};

use super::{read_u16, ExtensionKind, HeaderExtension, COLOR_SPACE_URI};
use crate::error::{Error, Result};

pub const COLOR_SPACE_EXTENSION_SIZE: usize = 28;
pub const COLOR_SPACE_EXTENSION_SIZE_WITHOUT_HDR: usize = 4;

const CHROMATICITY_DENOMINATOR: f32 = 50000.0;
const LUMINANCE_MAX_DENOMINATOR: f32 = 1.0;
const LUMINANCE_MIN_DENOMINATOR: f32 = 10000.0;

const MAX_LUMINANCE_MAX: f32 = 20000.0;
const MAX_LUMINANCE_MIN: f32 = 5.0;
const MAX_LIGHT_LEVEL: u16 = 20000;

/// Quantization range of the pixel values.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub enum ColorRange {
    #[default]
    Invalid = 0,
    Limited = 1,
    Full = 2,
    Derived = 3,
}

#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub enum ChromaSiting {
    #[default]
    Unspecified = 0,
    Collocated = 1,
    Half = 2,
}

#[derive(Default, PartialEq, Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Chromaticity {
    pub x: f32,
    pub y: f32,
}

#[derive(Default, PartialEq, Debug, Copy, Clone, Serialize, Deserialize)]
pub struct HdrMasteringMetadata {
    pub primary_r: Chromaticity,
    pub primary_g: Chromaticity,
    pub primary_b: Chromaticity,
    pub white_point: Chromaticity,
    /// cd/m^2
    pub luminance_max: f32,
    /// cd/m^2
    pub luminance_min: f32,
}

#[derive(Default, PartialEq, Debug, Copy, Clone, Serialize, Deserialize)]
pub struct HdrMetadata {
    pub mastering_metadata: HdrMasteringMetadata,
    pub max_content_light_level: u16,
    pub max_frame_average_light_level: u16,
}

impl Chromaticity {
    fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

impl HdrMetadata {
    pub fn validate(&self) -> Result<()> {
        let m = &self.mastering_metadata;
        let valid = (0.0..=MAX_LUMINANCE_MAX).contains(&m.luminance_max)
            && (0.0..=MAX_LUMINANCE_MIN).contains(&m.luminance_min)
            && m.primary_r.is_valid()
            && m.primary_g.is_valid()
            && m.primary_b.is_valid()
            && m.white_point.is_valid()
            && self.max_content_light_level <= MAX_LIGHT_LEVEL
            && self.max_frame_average_light_level <= MAX_LIGHT_LEVEL;
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidHdrMetadata)
        }
    }
}

/// Color space description (H.273 code points) with optional HDR mastering
/// metadata. The HDR suffix is present iff the value is 28 bytes long.
/// ```text
///    0                   1                   2                   3
///    0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |      ID       |   length=28   |   primaries   |   transfer    |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |    matrix     |range+chr.sit. |         luminance_max         |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |         luminance_min         |  primary_r.x, .y, primary_g.. |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |  ... primary_b, white point   |    max_content_light_level    |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   | max_frame_average_light_level |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ColorSpaceExtension {
    pub primaries: u8,
    pub transfer: u8,
    pub matrix: u8,
    pub range: ColorRange,
    pub chroma_siting_horizontal: ChromaSiting,
    pub chroma_siting_vertical: ChromaSiting,
    pub hdr_metadata: Option<HdrMetadata>,
}

impl Default for ColorSpaceExtension {
    fn default() -> Self {
        // unspecified primaries, transfer and matrix
        ColorSpaceExtension {
            primaries: 2,
            transfer: 2,
            matrix: 2,
            range: ColorRange::Invalid,
            chroma_siting_horizontal: ChromaSiting::Unspecified,
            chroma_siting_vertical: ChromaSiting::Unspecified,
            hdr_metadata: None,
        }
    }
}

fn valid_primaries(v: u8) -> bool {
    matches!(v, 1 | 2 | 4..=12 | 22)
}

fn valid_transfer(v: u8) -> bool {
    matches!(v, 1 | 2 | 4..=18)
}

fn valid_matrix(v: u8) -> bool {
    matches!(v, 0 | 1 | 2 | 4..=14)
}

fn range_from_u8(v: u8) -> Result<ColorRange> {
    match v {
        0 => Ok(ColorRange::Invalid),
        1 => Ok(ColorRange::Limited),
        2 => Ok(ColorRange::Full),
        3 => Ok(ColorRange::Derived),
        _ => Err(Error::InvalidColorSpace("range", v)),
    }
}

fn chroma_siting_from_u8(v: u8) -> Result<ChromaSiting> {
    match v {
        0 => Ok(ChromaSiting::Unspecified),
        1 => Ok(ChromaSiting::Collocated),
        2 => Ok(ChromaSiting::Half),
        _ => Err(Error::InvalidColorSpace("chroma siting", v)),
    }
}

fn parse_scaled(data: &[u8], offset: usize, denominator: f32) -> f32 {
    read_u16(data, offset) as f32 / denominator
}

fn write_scaled(data: &mut [u8], offset: usize, value: f32, denominator: f32) {
    let scaled = (value * denominator).round() as u16;
    data[offset..offset + 2].copy_from_slice(&scaled.to_be_bytes());
}

fn parse_chromaticity(data: &[u8], offset: usize) -> Chromaticity {
    Chromaticity {
        x: parse_scaled(data, offset, CHROMATICITY_DENOMINATOR),
        y: parse_scaled(data, offset + 2, CHROMATICITY_DENOMINATOR),
    }
}

fn write_chromaticity(data: &mut [u8], offset: usize, c: &Chromaticity) {
    write_scaled(data, offset, c.x, CHROMATICITY_DENOMINATOR);
    write_scaled(data, offset + 2, c.y, CHROMATICITY_DENOMINATOR);
}

impl ColorSpaceExtension {
    fn parse_hdr_metadata(data: &[u8]) -> HdrMetadata {
        HdrMetadata {
            mastering_metadata: HdrMasteringMetadata {
                luminance_max: parse_scaled(data, 0, LUMINANCE_MAX_DENOMINATOR),
                luminance_min: parse_scaled(data, 2, LUMINANCE_MIN_DENOMINATOR),
                primary_r: parse_chromaticity(data, 4),
                primary_g: parse_chromaticity(data, 8),
                primary_b: parse_chromaticity(data, 12),
                white_point: parse_chromaticity(data, 16),
            },
            max_content_light_level: read_u16(data, 20),
            max_frame_average_light_level: read_u16(data, 22),
        }
    }

    fn write_hdr_metadata(data: &mut [u8], hdr: &HdrMetadata) {
        let m = &hdr.mastering_metadata;
        write_scaled(data, 0, m.luminance_max, LUMINANCE_MAX_DENOMINATOR);
        write_scaled(data, 2, m.luminance_min, LUMINANCE_MIN_DENOMINATOR);
        write_chromaticity(data, 4, &m.primary_r);
        write_chromaticity(data, 8, &m.primary_g);
        write_chromaticity(data, 12, &m.primary_b);
        write_chromaticity(data, 16, &m.white_point);
        data[20..22].copy_from_slice(&hdr.max_content_light_level.to_be_bytes());
        data[22..24].copy_from_slice(&hdr.max_frame_average_light_level.to_be_bytes());
    }

    pub fn validate(&self) -> Result<()> {
        if !valid_primaries(self.primaries) {
            return Err(Error::InvalidColorSpace("primaries", self.primaries));
        }
        if !valid_transfer(self.transfer) {
            return Err(Error::InvalidColorSpace("transfer", self.transfer));
        }
        if !valid_matrix(self.matrix) {
            return Err(Error::InvalidColorSpace("matrix", self.matrix));
        }
        if let Some(hdr) = &self.hdr_metadata {
            hdr.validate()?;
        }
        Ok(())
    }
}

impl HeaderExtension for ColorSpaceExtension {
    const URI: &'static str = COLOR_SPACE_URI;
    const KIND: ExtensionKind = ExtensionKind::ColorSpace;

    fn value_size(&self) -> usize {
        if self.hdr_metadata.is_some() {
            COLOR_SPACE_EXTENSION_SIZE
        } else {
            COLOR_SPACE_EXTENSION_SIZE_WITHOUT_HDR
        }
    }

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != COLOR_SPACE_EXTENSION_SIZE
            && data.len() != COLOR_SPACE_EXTENSION_SIZE_WITHOUT_HDR
        {
            return Err(Error::ErrExtensionValueSize(data.len()));
        }

        let range_and_chroma_siting = data[3];
        let hdr_metadata = if data.len() == COLOR_SPACE_EXTENSION_SIZE {
            Some(Self::parse_hdr_metadata(
                &data[COLOR_SPACE_EXTENSION_SIZE_WITHOUT_HDR..],
            ))
        } else {
            None
        };

        let color_space = ColorSpaceExtension {
            primaries: data[0],
            transfer: data[1],
            matrix: data[2],
            range: range_from_u8((range_and_chroma_siting >> 4) & 0x03)?,
            chroma_siting_horizontal: chroma_siting_from_u8((range_and_chroma_siting >> 2) & 0x03)?,
            chroma_siting_vertical: chroma_siting_from_u8(range_and_chroma_siting & 0x03)?,
            hdr_metadata,
        };
        color_space.validate()?;
        Ok(color_space)
    }

    fn write(&self, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.value_size());
        self.validate()?;

        data[0] = self.primaries;
        data[1] = self.transfer;
        data[2] = self.matrix;
        data[3] = (self.range as u8) << 4
            | (self.chroma_siting_horizontal as u8) << 2
            | self.chroma_siting_vertical as u8;

        if let Some(hdr) = &self.hdr_metadata {
            Self::write_hdr_metadata(&mut data[COLOR_SPACE_EXTENSION_SIZE_WITHOUT_HDR..], hdr);
        }
        Ok(())
    }
}
