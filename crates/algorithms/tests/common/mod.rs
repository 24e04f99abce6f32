//! Synthetic GeoTIFF fixtures shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, ArrayView2};

use covershift_algorithms::classification::Classifier;
use covershift_core::io::{write_geotiff, Float32x4, OutputFile, StripSink, TiffEncoder};
use covershift_core::raster::{GeoTransform, GridGeometry, Raster};
use covershift_core::{Result, CRS};

pub const ORIGIN_X: f64 = 600_000.0;
pub const ORIGIN_Y: f64 = 1_800_000.0;
pub const PIXEL: f64 = 30.0;

pub fn utm_geometry(rows: usize, cols: usize) -> GridGeometry {
    GridGeometry::new(
        rows,
        cols,
        GeoTransform::new(ORIGIN_X, ORIGIN_Y, PIXEL, -PIXEL),
        Some(CRS::utm_north(44)),
    )
}

/// Same grid shifted by whole pixels
pub fn shifted_geometry(rows: usize, cols: usize, row_off: isize, col_off: isize) -> GridGeometry {
    GridGeometry::new(
        rows,
        cols,
        GeoTransform::new(
            ORIGIN_X + col_off as f64 * PIXEL,
            ORIGIN_Y - row_off as f64 * PIXEL,
            PIXEL,
            -PIXEL,
        ),
        Some(CRS::utm_north(44)),
    )
}

/// Write a 4-band float stack as a striped GeoTIFF (NaN nodata).
pub fn write_stack(path: &Path, data: &Array3<f32>, geometry: &GridGeometry, rows_per_strip: usize) {
    let mut out = OutputFile::create(path).unwrap();
    {
        let mut encoder = TiffEncoder::new(out.file_mut()).unwrap();
        let mut sink =
            StripSink::<_, Float32x4>::new(&mut encoder, geometry, Some(f64::NAN), rows_per_strip)
                .unwrap();
        let (_, rows, cols) = data.dim();
        sink.write_window(&covershift_core::Window::full(rows, cols), data.view())
            .unwrap();
        sink.finish().unwrap();
    }
    out.commit().unwrap();
}

/// Write a band-interleaved float32 stack as a tiled GeoTIFF.
///
/// The encoder in use only writes strips, so the file is laid out by hand:
/// header, padded tiles, out-of-line tag values, then the directory.
pub fn write_tiled_stack(path: &Path, data: &Array3<f32>, geometry: &GridGeometry, tile: usize) {
    let (bands, rows, cols) = data.dim();
    let tiles_down = rows.div_ceil(tile);
    let tiles_across = cols.div_ceil(tile);

    let mut buf: Vec<u8> = Vec::new();
    buf.extend_from_slice(b"II");
    buf.extend_from_slice(&42u16.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());

    let mut offsets = Vec::new();
    let mut counts = Vec::new();
    for tr in 0..tiles_down {
        for tc in 0..tiles_across {
            offsets.push(buf.len() as u32);
            for r in 0..tile {
                for c in 0..tile {
                    let (row, col) = (tr * tile + r, tc * tile + c);
                    for b in 0..bands {
                        let v = if row < rows && col < cols {
                            data[[b, row, col]]
                        } else {
                            0.0
                        };
                        buf.extend_from_slice(&v.to_le_bytes());
                    }
                }
            }
            counts.push((tile * tile * bands * 4) as u32);
        }
    }

    let shorts = |v: &[u16]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();
    let longs = |v: &[u32]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();
    let doubles = |v: &[f64]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();

    let gt = geometry.transform;
    let photometric = if bands == 1 { 1u16 } else { 2 };
    let mut entries: Vec<(u16, u16, u32, Vec<u8>)> = vec![
        (256, 4, 1, longs(&[cols as u32])),
        (257, 4, 1, longs(&[rows as u32])),
        (258, 3, bands as u32, shorts(&vec![32; bands])),
        (259, 3, 1, shorts(&[1])),
        (262, 3, 1, shorts(&[photometric])),
        (277, 3, 1, shorts(&[bands as u16])),
        (284, 3, 1, shorts(&[1])),
        (322, 4, 1, longs(&[tile as u32])),
        (323, 4, 1, longs(&[tile as u32])),
        (324, 4, offsets.len() as u32, longs(&offsets)),
        (325, 4, counts.len() as u32, longs(&counts)),
        (339, 3, bands as u32, shorts(&vec![3; bands])),
        (33550, 12, 3, doubles(&[gt.pixel_width, -gt.pixel_height, 0.0])),
        (33922, 12, 6, doubles(&[0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0])),
    ];
    if let Some(epsg) = geometry.crs.as_ref().and_then(|c| c.epsg()) {
        // ModelType projected, RasterType area, ProjectedCRS
        let keys = [1u16, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, epsg as u16];
        entries.push((34735, 3, keys.len() as u32, shorts(&keys)));
    }
    entries.sort_by_key(|e| e.0);

    let mut fields = Vec::new();
    for (tag, typ, count, bytes) in &entries {
        let value = if bytes.len() <= 4 {
            let mut inline = bytes.clone();
            inline.resize(4, 0);
            inline
        } else {
            if buf.len() % 2 == 1 {
                buf.push(0);
            }
            let offset = buf.len() as u32;
            buf.extend_from_slice(bytes);
            offset.to_le_bytes().to_vec()
        };
        fields.push((*tag, *typ, *count, value));
    }

    if buf.len() % 2 == 1 {
        buf.push(0);
    }
    let ifd = buf.len() as u32;
    buf[4..8].copy_from_slice(&ifd.to_le_bytes());
    buf.extend_from_slice(&(fields.len() as u16).to_le_bytes());
    for (tag, typ, count, value) in fields {
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&typ.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(&value);
    }
    buf.extend_from_slice(&0u32.to_le_bytes());

    std::fs::write(path, buf).unwrap();
}

/// A deterministic 4-band stack with a smooth NDVI gradient.
pub fn gradient_stack(rows: usize, cols: usize) -> Array3<f32> {
    Array3::from_shape_fn((4, rows, cols), |(b, r, c)| {
        let t = (r * cols + c) as f32 / (rows * cols) as f32;
        match b {
            0 => 0.05 + 0.1 * t,
            1 => 0.08 + 0.05 * t,
            2 => 0.30 - 0.25 * t,
            _ => 0.10 + 0.50 * t,
        }
    })
}

/// Write a single-band u16 raster on `geometry`.
pub fn write_u16(path: &Path, data: Array2<u16>, geometry: &GridGeometry, nodata: Option<u16>) {
    let mut raster = Raster::from_array(data);
    raster.set_transform(geometry.transform);
    raster.set_crs(geometry.crs.clone());
    raster.set_nodata(nodata);
    write_geotiff(&raster, path, None).unwrap();
}

/// Write a Landsat-like scene directory: four reflectance bands and a QA band.
pub fn write_scene(
    period_dir: &Path,
    name: &str,
    bands: [Array2<u16>; 4],
    qa: Array2<u16>,
    geometry: &GridGeometry,
) -> PathBuf {
    let dir = period_dir.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for (band, keyword) in bands.into_iter().zip(["B2", "B3", "B4", "B5"]) {
        write_u16(
            &dir.join(format!("{}_SR_{}.TIF", name, keyword)),
            band,
            geometry,
            Some(0),
        );
    }
    write_u16(&dir.join(format!("{}_QA_PIXEL.TIF", name)), qa, geometry, Some(1));
    dir
}

/// Five-class model driven by the derived NDVI feature.
///
/// The NDVI range [-1, 1] is cut into five buckets; the bucket's label gets
/// probability 0.6 and every other label 0.1.
pub struct NdviBuckets;

impl NdviBuckets {
    pub fn bucket(ndvi: f32) -> usize {
        (((ndvi + 1.0) / 2.0 * 5.0).floor() as isize).clamp(0, 4) as usize
    }
}

impl Classifier for NdviBuckets {
    fn label_order(&self) -> &[u8] {
        &[1, 2, 3, 4, 5]
    }

    fn n_features(&self) -> usize {
        5
    }

    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let mut out = Array2::from_elem((features.nrows(), 5), 0.1f32);
        for (i, row) in features.rows().into_iter().enumerate() {
            out[[i, Self::bucket(row[4])]] = 0.6;
        }
        Ok(out)
    }
}

/// Fails on any block containing a pixel with band 0 above `threshold`.
pub struct FailsAbove(pub f32);

impl Classifier for FailsAbove {
    fn label_order(&self) -> &[u8] {
        &[1, 2]
    }

    fn n_features(&self) -> usize {
        5
    }

    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if features.column(0).iter().any(|&v| v > self.0) {
            return Err(covershift_core::Error::Classifier("model failure".into()));
        }
        Ok(Array2::from_elem((features.nrows(), 2), 0.5))
    }
}

/// Row-major values of a raster view
pub fn values<T: Copy>(view: ArrayView2<'_, T>) -> Vec<T> {
    view.iter().copied().collect()
}
