//! Normalized difference indices
//!
//! The pipeline uses one derived feature, NDVI, computed with an additive
//! epsilon in the denominator instead of a zero check so that every valid
//! pixel gets a finite value.

use ndarray::Array2;
use crate::maybe_rayon::*;
use covershift_core::raster::Raster;
use covershift_core::{Error, Result};

/// Default denominator stabiliser
pub const DEFAULT_EPSILON: f32 = 1e-6;

/// `(a - b) / (a + b + epsilon)` for a single pixel.
#[inline]
pub fn normalized_difference_value(a: f32, b: f32, epsilon: f32) -> f32 {
    (a - b) / (a + b + epsilon)
}

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b + epsilon)`
///
/// Pixels where either band is nodata are set to NaN.
pub fn normalized_difference(
    band_a: &Raster<f32>,
    band_b: &Raster<f32>,
    epsilon: f32,
) -> Result<Raster<f32>> {
    band_a
        .geometry()
        .ensure_aligned(&band_b.geometry(), "normalized difference")?;

    let (rows, cols) = band_a.shape();
    let a_view = band_a.view();
    let b_view = band_b.view();

    let data: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f32::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let a = a_view[[row, col]];
                let b = b_view[[row, col]];
                if band_a.is_nodata(a) || band_b.is_nodata(b) {
                    continue;
                }
                *out = normalized_difference_value(a, b, epsilon);
            }
            row_data
        })
        .collect();

    let mut output = band_a.with_same_meta::<f32>(Some(f32::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red + epsilon)`
pub fn ndvi(nir: &Raster<f32>, red: &Raster<f32>, epsilon: f32) -> Result<Raster<f32>> {
    normalized_difference(nir, red, epsilon)
}
