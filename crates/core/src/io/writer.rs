//! Strip-streamed GeoTIFF writing.

use std::collections::BTreeMap;
use std::io::{Seek, Write};

use ndarray::{ArrayView2, ArrayView3, Axis};
use num_traits::Zero;
use tiff::encoder::colortype::ColorType;
use tiff::encoder::{ImageEncoder, TiffEncoder, TiffKindStandard, TiffValue};

use crate::error::{Error, Result};
use crate::io::geokeys;
use crate::io::sample::samples_of;
use crate::raster::{GridGeometry, RasterElement, Window};

/// A strip being assembled from whole-window writes.
struct PendingStrip<T> {
    data: Vec<T>,
    written: Vec<bool>,
    remaining: usize,
}

/// Streams whole-window writes into a striped GeoTIFF.
///
/// Windows may arrive in any order, but each strip is encoded as soon as all
/// of its cells are written, and strips are emitted top to bottom. With
/// windows produced row-major from a block layout whose height equals the
/// strip height, at most one strip is buffered at a time.
///
/// ```ignore
/// let mut output = OutputFile::create("classes.tif")?;
/// {
///     let mut encoder = TiffEncoder::new(output.file_mut())?;
///     let mut sink = StripSink::<_, Gray8>::new(&mut encoder, &geometry, Some(0.0), 256)?;
///     for window in BlockWindows::new(rows, cols, 256, cols) {
///         sink.write_band_window(&window, block.view())?;
///     }
///     sink.finish()?;
/// }
/// output.commit()?;
/// ```
pub struct StripSink<'a, W, C>
where
    W: Write + Seek,
    C: ColorType,
{
    image: ImageEncoder<'a, W, C, TiffKindStandard>,
    rows: usize,
    cols: usize,
    bands: usize,
    rows_per_strip: usize,
    next_strip: usize,
    pending: BTreeMap<usize, PendingStrip<C::Inner>>,
}

impl<'a, W, C> StripSink<'a, W, C>
where
    W: Write + Seek,
    C: ColorType,
    C::Inner: RasterElement,
    [C::Inner]: TiffValue,
{
    /// Start a new image in `encoder` with the georeferencing of `geometry`.
    pub fn new(
        encoder: &'a mut TiffEncoder<W>,
        geometry: &GridGeometry,
        nodata: Option<f64>,
        rows_per_strip: usize,
    ) -> Result<Self> {
        let (rows, cols) = geometry.shape();
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let rows_per_strip = rows_per_strip.clamp(1, rows);

        let mut image = encoder.new_image::<C>(cols as u32, rows as u32)?;
        image.rows_per_strip(rows_per_strip as u32)?;
        geokeys::write_geo_tags(image.encoder(), geometry, nodata)?;

        Ok(Self {
            image,
            rows,
            cols,
            bands: samples_of::<C>(),
            rows_per_strip,
            next_strip: 0,
            pending: BTreeMap::new(),
        })
    }

    pub fn rows_per_strip(&self) -> usize {
        self.rows_per_strip
    }

    fn strip_count(&self) -> usize {
        self.rows.div_ceil(self.rows_per_strip)
    }

    fn strip_window(&self, strip: usize) -> Window {
        let row_off = strip * self.rows_per_strip;
        Window::new(row_off, 0, self.rows_per_strip.min(self.rows - row_off), self.cols)
    }

    /// Write a (bands, rows, cols) block at `window`.
    pub fn write_window(&mut self, window: &Window, block: ArrayView3<'_, C::Inner>) -> Result<()> {
        if !window.fits_in(self.rows, self.cols) || window.is_empty() {
            return Err(Error::IndexOutOfBounds {
                row: window.row_end(),
                col: window.col_end(),
                rows: self.rows,
                cols: self.cols,
            });
        }
        if block.dim() != (self.bands, window.rows, window.cols) {
            let (b, r, c) = block.dim();
            return Err(Error::geometry(
                "strip write",
                format!(
                    "block {}x{}x{} vs window {}x{}x{}",
                    b, r, c, self.bands, window.rows, window.cols
                ),
            ));
        }

        let first = window.row_off / self.rows_per_strip;
        let last = (window.row_end() - 1) / self.rows_per_strip;
        for strip in first..=last {
            if strip < self.next_strip {
                return Err(Error::Other(format!(
                    "window at row {} targets strip {} which is already written",
                    window.row_off, strip
                )));
            }
            let strip_window = self.strip_window(strip);
            let overlap = match strip_window.intersection(window) {
                Some(o) => o,
                None => continue,
            };
            let (bands, cols) = (self.bands, self.cols);
            let pending = self.pending.entry(strip).or_insert_with(|| PendingStrip {
                data: vec![<C::Inner as Zero>::zero(); strip_window.len() * bands],
                written: vec![false; strip_window.len()],
                remaining: strip_window.len(),
            });

            for r in overlap.row_off..overlap.row_end() {
                for c in overlap.col_off..overlap.col_end() {
                    let cell = (r - strip_window.row_off) * cols + c;
                    if pending.written[cell] {
                        return Err(Error::Other(format!(
                            "cell ({}, {}) written twice",
                            r, c
                        )));
                    }
                    pending.written[cell] = true;
                    pending.remaining -= 1;
                    for b in 0..bands {
                        pending.data[cell * bands + b] =
                            block[[b, r - window.row_off, c - window.col_off]];
                    }
                }
            }
        }

        self.flush_complete()
    }

    /// Write a single-band block at `window`.
    pub fn write_band_window(
        &mut self,
        window: &Window,
        block: ArrayView2<'_, C::Inner>,
    ) -> Result<()> {
        self.write_window(window, block.insert_axis(Axis(0)))
    }

    fn flush_complete(&mut self) -> Result<()> {
        while let Some(strip) = self.pending.get(&self.next_strip) {
            if strip.remaining > 0 {
                break;
            }
            if let Some(strip) = self.pending.remove(&self.next_strip) {
                self.image.write_strip(&strip.data)?;
            }
            self.next_strip += 1;
        }
        Ok(())
    }

    /// Finish the image; every cell must have been written.
    pub fn finish(self) -> Result<()> {
        if self.next_strip != self.strip_count() {
            return Err(Error::Other(format!(
                "image incomplete: {} of {} strips written",
                self.next_strip,
                self.strip_count()
            )));
        }
        self.image.finish()?;
        Ok(())
    }
}
