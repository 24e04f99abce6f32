//! Per-pixel transitions between two classification periods
//!
//! A transition code packs the two class codes as `from * 10 + to`, so only
//! classes 1 to 9 can be encoded. Code 0 marks pixels that are invalid in
//! either period.

use ndarray::Array2;

use crate::maybe_rayon::*;
use covershift_core::raster::Raster;
use covershift_core::{Error, Result};

/// Largest class code that fits in a transition code
pub const MAX_TRANSITION_CLASS: u8 = 9;

/// Pack a class pair into a transition code.
pub fn encode_transition(from: u8, to: u8) -> Result<u8> {
    for (name, class) in [("from", from), ("to", to)] {
        if class > MAX_TRANSITION_CLASS {
            return Err(Error::InvalidParameter {
                name,
                value: class.to_string(),
                reason: format!("class codes above {} cannot be encoded", MAX_TRANSITION_CLASS),
            });
        }
    }
    Ok(from * 10 + to)
}

/// Unpack a transition code; `None` for 0 and codes not made of two classes.
pub fn decode_transition(code: u8) -> Option<(u8, u8)> {
    let (from, to) = (code / 10, code % 10);
    if (1..=MAX_TRANSITION_CLASS).contains(&from) && (1..=MAX_TRANSITION_CLASS).contains(&to) {
        Some((from, to))
    } else {
        None
    }
}

/// Fail if any class in `raster` cannot be transition-encoded.
pub(crate) fn ensure_encodable(raster: &Raster<u8>, which: &'static str) -> Result<()> {
    match raster.data().iter().find(|&&c| c > MAX_TRANSITION_CLASS) {
        Some(&c) => Err(Error::InvalidParameter {
            name: which,
            value: c.to_string(),
            reason: format!("class codes above {} cannot be encoded", MAX_TRANSITION_CLASS),
        }),
        None => Ok(()),
    }
}

/// Transition code per pixel, 0 where either period is unclassified.
pub fn transition_map(t1: &Raster<u8>, t2: &Raster<u8>) -> Result<Raster<u8>> {
    t1.geometry().ensure_aligned(&t2.geometry(), "transition map")?;
    ensure_encodable(t1, "t1")?;
    ensure_encodable(t2, "t2")?;

    let (rows, cols) = t1.shape();
    let a = t1.view();
    let b = t2.view();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let (from, to) = (a[[row, col]], b[[row, col]]);
                if from > 0 && to > 0 {
                    *out = from * 10 + to;
                }
            }
            row_data
        })
        .collect();

    let mut output = t1.with_same_meta::<u8>(Some(0));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Joint confidence per pixel: the product of both confidences where both
/// are positive, else 0.
pub fn transition_probability(c1: &Raster<f32>, c2: &Raster<f32>) -> Result<Raster<f32>> {
    c1.geometry().ensure_aligned(&c2.geometry(), "transition probability")?;

    let (rows, cols) = c1.shape();
    let a = c1.view();
    let b = c2.view();

    let data: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0f32; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let (p, q) = (a[[row, col]], b[[row, col]]);
                if p > 0.0 && q > 0.0 {
                    *out = p * q;
                }
            }
            row_data
        })
        .collect();

    let mut output = c1.with_same_meta::<f32>(Some(0.0));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}
