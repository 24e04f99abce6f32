//! Mapping between raster cell types and TIFF sample layouts.

use std::fmt;

use tiff::decoder::DecodingResult;
use tiff::encoder::colortype::{self, ColorType};

use crate::error::{Error, Result};
use crate::raster::RasterElement;

/// Cell types that can be written as a single-band GeoTIFF.
pub trait GraySample: RasterElement {
    /// Single-sample colour type with `Inner = Self`
    type Color: ColorType<Inner = Self>;
}

impl GraySample for u8 {
    type Color = colortype::Gray8;
}

impl GraySample for u16 {
    type Color = colortype::Gray16;
}

impl GraySample for f32 {
    type Color = colortype::Gray32Float;
}

impl GraySample for f64 {
    type Color = colortype::Gray64Float;
}

/// Four float32 samples per pixel; used for stacked reflectance bands.
pub type Float32x4 = colortype::RGBA32Float;

/// Number of interleaved samples a colour type carries.
pub fn samples_of<C: ColorType>() -> usize {
    C::BITS_PER_SAMPLE.len()
}

/// Numeric type of the samples stored in a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleKind {
    /// Derive from the SampleFormat and BitsPerSample tags.
    pub fn from_tags(sample_format: u32, bits: u32) -> Result<Self> {
        let kind = match (sample_format, bits) {
            (1, 8) => SampleKind::U8,
            (1, 16) => SampleKind::U16,
            (1, 32) => SampleKind::U32,
            (2, 8) => SampleKind::I8,
            (2, 16) => SampleKind::I16,
            (2, 32) => SampleKind::I32,
            (3, 32) => SampleKind::F32,
            (3, 64) => SampleKind::F64,
            _ => {
                return Err(Error::UnsupportedDataType(format!(
                    "sample format {} with {} bits",
                    sample_format, bits
                )))
            }
        };
        Ok(kind)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleKind::F32 | SampleKind::F64)
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleKind::U8 => "uint8",
            SampleKind::U16 => "uint16",
            SampleKind::U32 => "uint32",
            SampleKind::I8 => "int8",
            SampleKind::I16 => "int16",
            SampleKind::I32 => "int32",
            SampleKind::F32 => "float32",
            SampleKind::F64 => "float64",
        };
        f.write_str(name)
    }
}

/// Widen a decoded chunk to f64 samples.
pub(crate) fn decoded_to_f64(decoded: DecodingResult) -> Result<Vec<f64>> {
    fn widen<S: Copy + Into<f64>>(buf: Vec<S>) -> Vec<f64> {
        buf.into_iter().map(Into::into).collect()
    }

    let samples = match decoded {
        DecodingResult::U8(buf) => widen(buf),
        DecodingResult::U16(buf) => widen(buf),
        DecodingResult::U32(buf) => widen(buf),
        DecodingResult::I8(buf) => widen(buf),
        DecodingResult::I16(buf) => widen(buf),
        DecodingResult::I32(buf) => widen(buf),
        DecodingResult::F32(buf) => widen(buf),
        DecodingResult::F64(buf) => buf,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(Error::UnsupportedDataType(
                "64-bit integer TIFF samples".to_string(),
            ))
        }
    };
    Ok(samples)
}
