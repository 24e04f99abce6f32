//! Whole-raster GeoTIFF convenience functions built on the windowed reader
//! and the strip writer.

use std::path::Path;

use tiff::encoder::{TiffEncoder, TiffValue};

use crate::error::Result;
use crate::io::{GeoTiffReader, GraySample, OutputFile, StripSink};
use crate::raster::{Raster, RasterElement, Window};

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Rows per strip
    pub rows_per_strip: usize,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            rows_per_strip: 256,
        }
    }
}

/// Read one band of a GeoTIFF file into a Raster (band 0 by default).
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let mut reader = GeoTiffReader::open(path)?;
    reader.read_band(band.unwrap_or(0))
}

/// Write a Raster to a single-band GeoTIFF file.
///
/// The file only appears at `path` once fully written.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: GraySample,
    [T]: TiffValue,
    P: AsRef<Path>,
{
    let options = options.unwrap_or_default();
    let geometry = raster.geometry();
    let nodata = raster.nodata().and_then(|v| v.to_f64());

    let mut output = OutputFile::create(path)?;
    {
        let mut encoder = TiffEncoder::new(output.file_mut())?;
        let mut sink =
            StripSink::<_, T::Color>::new(&mut encoder, &geometry, nodata, options.rows_per_strip)?;
        sink.write_band_window(&Window::full(raster.rows(), raster.cols()), raster.view())?;
        sink.finish()?;
    }
    output.commit()?;
    Ok(())
}
