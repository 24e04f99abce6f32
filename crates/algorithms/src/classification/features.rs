//! Per-pixel validity and feature extraction for a multi-band block

use ndarray::{Array2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use covershift_core::{Error, Result};

use crate::imagery::{normalized_difference_value, DEFAULT_EPSILON};

/// Which bands feed the derived vegetation feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Zero-based near-infrared band
    pub nir_band: usize,
    /// Zero-based red band
    pub red_band: usize,
    pub epsilon: f32,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            nir_band: 3,
            red_band: 2,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl FeatureParams {
    /// Features per pixel for a block of `bands` bands
    pub fn n_features(&self, bands: usize) -> usize {
        bands + 1
    }

    pub fn validate(&self, bands: usize) -> Result<()> {
        for (name, band) in [("nir_band", self.nir_band), ("red_band", self.red_band)] {
            if band >= bands {
                return Err(Error::InvalidParameter {
                    name,
                    value: band.to_string(),
                    reason: format!("input has {} bands", bands),
                });
            }
        }
        Ok(())
    }
}

/// Validity of each pixel of a `(bands, rows, cols)` block.
///
/// A pixel is valid when no band is NaN and, if `nodata` is set, band 0
/// differs from it.
pub fn valid_mask(block: ArrayView3<'_, f32>, nodata: Option<f32>) -> Array2<bool> {
    let (_, rows, cols) = block.dim();
    let mut mask = Array2::from_elem((rows, cols), true);
    for band in block.axis_iter(Axis(0)) {
        ndarray::Zip::from(&mut mask).and(&band).for_each(|m, &v| {
            if v.is_nan() {
                *m = false;
            }
        });
    }
    if let Some(nd) = nodata.filter(|v| !v.is_nan()) {
        ndarray::Zip::from(&mut mask)
            .and(&block.index_axis(Axis(0), 0))
            .for_each(|m, &v| {
                if v == nd {
                    *m = false;
                }
            });
    }
    mask
}

/// Feature matrix of the valid pixels, in row-major mask order.
///
/// Columns are the raw bands followed by the normalized difference of the
/// NIR and red bands.
pub fn feature_matrix(
    block: ArrayView3<'_, f32>,
    mask: &Array2<bool>,
    params: &FeatureParams,
) -> Array2<f32> {
    let bands = block.len_of(Axis(0));
    let n = mask.iter().filter(|&&m| m).count();
    let mut out = Array2::<f32>::zeros((n, params.n_features(bands)));
    let mut i = 0;
    for ((r, c), _) in mask.indexed_iter().filter(|(_, &m)| m) {
        let mut row = out.row_mut(i);
        for b in 0..bands {
            row[b] = block[[b, r, c]];
        }
        row[bands] = normalized_difference_value(
            block[[params.nir_band, r, c]],
            block[[params.red_band, r, c]],
            params.epsilon,
        );
        i += 1;
    }
    out
}
