//! Windowed GeoTIFF reading.
//!
//! Windows are assembled from the strips or tiles that overlap them, so a
//! scene is never decoded as a whole. Decoded chunks are kept in a small LRU
//! cache because consecutive windows that are not aligned with the file's
//! layout share chunks along their edges.

use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use ndarray::{Array2, Array3};
use tiff::decoder::Decoder;
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::geokeys::{self, GeoMeta};
use crate::io::sample::{self, SampleKind};
use crate::raster::{BlockWindows, GridGeometry, Raster, RasterElement, Window};

/// How the image data of a TIFF file is chunked on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLayout {
    /// Full-width strips of `rows` rows
    Striped { rows: usize },
    /// Tiles of `rows` x `cols`
    Tiled { rows: usize, cols: usize },
}

/// A GeoTIFF opened for windowed reads.
pub struct GeoTiffReader {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    geometry: GridGeometry,
    bands: usize,
    nodata: Option<f64>,
    sample_kind: SampleKind,
    layout: ChunkLayout,
    chunks_across: usize,
    cache: LruCache<u32, Vec<f64>>,
}

impl GeoTiffReader {
    /// Open a GeoTIFF and read its directory and georeferencing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        let (width, height) = decoder.dimensions()?;
        let (rows, cols) = (height as usize, width as usize);
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let bands = match decoder.find_tag(Tag::SamplesPerPixel)? {
            Some(v) => v.into_u32()? as usize,
            None => 1,
        };

        if let Some(planar) = decoder.find_tag(Tag::PlanarConfiguration)? {
            if planar.into_u32()? != 1 {
                return Err(Error::UnsupportedDataType(format!(
                    "{}: planar (band-sequential) sample layout",
                    path.display()
                )));
            }
        }

        let bits = match decoder.find_tag(Tag::BitsPerSample)? {
            Some(v) => v.into_u32_vec()?.first().copied().unwrap_or(1),
            None => 1,
        };
        let format = match decoder.find_tag(Tag::SampleFormat)? {
            Some(v) => v.into_u32_vec()?.first().copied().unwrap_or(1),
            None => 1,
        };
        let sample_kind = SampleKind::from_tags(format, bits)?;

        let (chunk_w, chunk_h) = decoder.chunk_dimensions();
        let layout = if decoder.find_tag(Tag::TileWidth)?.is_some() {
            ChunkLayout::Tiled {
                rows: chunk_h as usize,
                cols: chunk_w as usize,
            }
        } else {
            ChunkLayout::Striped {
                rows: (chunk_h as usize).min(rows),
            }
        };
        let chunks_across = match layout {
            ChunkLayout::Striped { .. } => 1,
            ChunkLayout::Tiled { cols: tile_cols, .. } => cols.div_ceil(tile_cols.max(1)),
        };

        let GeoMeta {
            transform,
            crs,
            nodata,
        } = geokeys::read_geo_meta(&mut decoder)?;

        let capacity = NonZeroUsize::new(2 * chunks_across).unwrap_or(NonZeroUsize::MIN);

        debug!(
            path = %path.display(),
            rows,
            cols,
            bands,
            kind = %sample_kind,
            ?layout,
            "opened GeoTIFF"
        );

        Ok(Self {
            path,
            decoder,
            geometry: GridGeometry::new(rows, cols, transform, crs),
            bands,
            nodata,
            sample_kind,
            layout,
            chunks_across,
            cache: LruCache::new(capacity),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn rows(&self) -> usize {
        self.geometry.rows
    }

    pub fn cols(&self) -> usize {
        self.geometry.cols
    }

    /// Number of bands (samples per pixel)
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Nodata value from the GDAL_NODATA tag
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn sample_kind(&self) -> SampleKind {
        self.sample_kind
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    /// Native block shape (rows, cols): a strip or a tile
    pub fn block_shape(&self) -> (usize, usize) {
        match self.layout {
            ChunkLayout::Striped { rows } => (rows, self.cols()),
            ChunkLayout::Tiled { rows, cols } => (rows, cols),
        }
    }

    /// Windows of the file's native block layout, in row-major order
    pub fn block_windows(&self) -> BlockWindows {
        let (block_rows, block_cols) = self.block_shape();
        BlockWindows::new(self.rows(), self.cols(), block_rows, block_cols)
    }

    /// Read all bands inside `window` as a (bands, rows, cols) array.
    pub fn read_window<T: RasterElement>(&mut self, window: &Window) -> Result<Array3<T>> {
        if !window.fits_in(self.rows(), self.cols()) || window.is_empty() {
            return Err(Error::IndexOutOfBounds {
                row: window.row_end(),
                col: window.col_end(),
                rows: self.rows(),
                cols: self.cols(),
            });
        }

        let mut out = Array3::<T>::zeros((self.bands, window.rows, window.cols));
        let (chunk_rows, chunk_cols) = self.block_shape();
        let bands = self.bands;

        let first_chunk_row = window.row_off / chunk_rows;
        let last_chunk_row = (window.row_end() - 1) / chunk_rows;
        let first_chunk_col = window.col_off / chunk_cols;
        let last_chunk_col = (window.col_end() - 1) / chunk_cols;

        for chunk_row in first_chunk_row..=last_chunk_row {
            for chunk_col in first_chunk_col..=last_chunk_col {
                let chunk_window = Window::new(
                    chunk_row * chunk_rows,
                    chunk_col * chunk_cols,
                    chunk_rows.min(self.rows() - chunk_row * chunk_rows),
                    chunk_cols.min(self.cols() - chunk_col * chunk_cols),
                );
                let overlap = match chunk_window.intersection(window) {
                    Some(o) => o,
                    None => continue,
                };

                let index = (chunk_row * self.chunks_across + chunk_col) as u32;
                let stride = chunk_window.cols;
                let data = self.chunk(index, &chunk_window)?;

                for r in overlap.row_off..overlap.row_end() {
                    let src_row = (r - chunk_window.row_off) * stride;
                    let dst_row = r - window.row_off;
                    for c in overlap.col_off..overlap.col_end() {
                        let src = (src_row + c - chunk_window.col_off) * bands;
                        let dst_col = c - window.col_off;
                        for b in 0..bands {
                            out[[b, dst_row, dst_col]] = T::from_f64(data[src + b]);
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Read one band inside `window`.
    pub fn read_band_window<T: RasterElement>(
        &mut self,
        band: usize,
        window: &Window,
    ) -> Result<Array2<T>> {
        self.check_band(band)?;
        let block = self.read_window::<T>(window)?;
        Ok(block.index_axis_move(ndarray::Axis(0), band))
    }

    /// Read a whole band into memory.
    pub fn read_band<T: RasterElement>(&mut self, band: usize) -> Result<Raster<T>> {
        let window = Window::full(self.rows(), self.cols());
        let data = self.read_band_window::<T>(band, &window)?;

        let mut raster = Raster::from_array(data);
        raster.set_transform(self.geometry.transform);
        raster.set_crs(self.geometry.crs.clone());
        raster.set_nodata(self.nodata.and_then(num_traits::cast));
        Ok(raster)
    }

    fn check_band(&self, band: usize) -> Result<()> {
        if band < self.bands {
            Ok(())
        } else {
            Err(Error::InvalidParameter {
                name: "band",
                value: band.to_string(),
                reason: format!("{} has {} band(s)", self.path.display(), self.bands),
            })
        }
    }

    /// Decoded samples of one chunk, row-major with a row stride of `chunk_window.cols`.
    fn chunk(&mut self, index: u32, chunk_window: &Window) -> Result<&Vec<f64>> {
        if !self.cache.contains(&index) {
            let decoded = self.decoder.read_chunk(index)?;
            let samples = sample::decoded_to_f64(decoded)?;
            let samples = self.crop_padding(samples, chunk_window)?;
            self.cache.put(index, samples);
        }
        self.cache
            .get(&index)
            .ok_or_else(|| Error::Other(format!("chunk {} evicted while in use", index)))
    }

    /// Tiles on the right and bottom edges may be stored padded to the full
    /// tile size; drop the padding so the stride equals the data width.
    fn crop_padding(&self, samples: Vec<f64>, chunk_window: &Window) -> Result<Vec<f64>> {
        let bands = self.bands;
        let expected = chunk_window.len() * bands;
        if samples.len() == expected {
            return Ok(samples);
        }

        let (full_rows, full_cols) = self.block_shape();
        if samples.len() < full_cols * chunk_window.rows.min(full_rows) * bands {
            return Err(Error::Tiff(format!(
                "{}: chunk holds {} samples, expected {}",
                self.path.display(),
                samples.len(),
                expected
            )));
        }

        let mut cropped = Vec::with_capacity(expected);
        for r in 0..chunk_window.rows {
            let start = r * full_cols * bands;
            cropped.extend_from_slice(&samples[start..start + chunk_window.cols * bands]);
        }
        Ok(cropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{write_geotiff, GeoTiffOptions};
    use crate::raster::GeoTransform;
    use crate::CRS;

    fn sample_raster() -> Raster<u16> {
        let data: Vec<u16> = (0..30 * 20).map(|i| i as u16).collect();
        let mut raster = Raster::from_vec(data, 30, 20).unwrap();
        raster.set_transform(GeoTransform::new(500_000.0, 2_000_000.0, 30.0, -30.0));
        raster.set_crs(Some(CRS::utm_north(44)));
        raster.set_nodata(Some(0));
        raster
    }

    #[test]
    fn reads_geometry_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.tif");
        write_geotiff(&sample_raster(), &path, Some(GeoTiffOptions { rows_per_strip: 8 })).unwrap();

        let reader = GeoTiffReader::open(&path).unwrap();
        assert_eq!(reader.geometry().shape(), (30, 20));
        assert_eq!(reader.bands(), 1);
        assert_eq!(reader.nodata(), Some(0.0));
        assert_eq!(reader.sample_kind(), SampleKind::U16);
        assert_eq!(reader.layout(), ChunkLayout::Striped { rows: 8 });
        assert_eq!(reader.geometry().crs, Some(CRS::from_epsg(32644)));
        assert!(reader
            .geometry()
            .transform
            .approx_eq(&GeoTransform::new(500_000.0, 2_000_000.0, 30.0, -30.0), 1e-9));
        assert_eq!(reader.block_windows().block_count(), 4);
    }

    #[test]
    fn window_spanning_strips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.tif");
        let raster = sample_raster();
        write_geotiff(&raster, &path, Some(GeoTiffOptions { rows_per_strip: 8 })).unwrap();

        let mut reader = GeoTiffReader::open(&path).unwrap();
        let window = Window::new(6, 3, 12, 5);
        let block = reader.read_band_window::<u16>(0, &window).unwrap();
        assert_eq!(block, raster.window(&window).unwrap());

        let all = reader.read_band::<u16>(0).unwrap();
        assert_eq!(all.data(), raster.data());
        assert_eq!(all.nodata(), Some(0));
    }

    #[test]
    fn rejects_out_of_range_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.tif");
        write_geotiff(&sample_raster(), &path, None).unwrap();

        let mut reader = GeoTiffReader::open(&path).unwrap();
        assert!(reader.read_window::<u16>(&Window::new(25, 0, 10, 5)).is_err());
        assert!(reader.read_band_window::<u16>(1, &Window::new(0, 0, 1, 1)).is_err());
    }
}
