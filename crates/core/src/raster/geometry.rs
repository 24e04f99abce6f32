//! Grid geometry: the part of a raster's identity that must agree before
//! two rasters can be combined pixel by pixel.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GeoTransform;

/// Tolerance, in pixels, for comparing transforms of aligned rasters.
const TRANSFORM_TOLERANCE: f64 = 1e-6;

/// Shape, affine transform and CRS of a raster grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
}

impl GridGeometry {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform, crs: Option<CRS>) -> Self {
        Self {
            rows,
            cols,
            transform,
            crs,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Fail with [`Error::GeometryMismatch`] unless `other` describes the same grid.
    ///
    /// Two missing CRSs are considered equal; a missing CRS never matches a present one.
    pub fn ensure_aligned(&self, other: &GridGeometry, context: &str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::geometry(
                context,
                format!(
                    "shape {}x{} vs {}x{}",
                    self.rows, self.cols, other.rows, other.cols
                ),
            ));
        }
        if !self.transform.approx_eq(&other.transform, TRANSFORM_TOLERANCE) {
            return Err(Error::geometry(
                context,
                format!(
                    "transform {:?} vs {:?}",
                    self.transform.to_gdal(),
                    other.transform.to_gdal()
                ),
            ));
        }
        match (&self.crs, &other.crs) {
            (None, None) => Ok(()),
            (Some(a), Some(b)) if a.is_equivalent(b) => Ok(()),
            (a, b) => Err(Error::geometry(
                context,
                format!("CRS {} vs {}", describe(a), describe(b)),
            )),
        }
    }

    /// Check that every geometry in `others` matches `self`.
    pub fn ensure_all_aligned<'a, I>(&self, others: I, context: &str) -> Result<()>
    where
        I: IntoIterator<Item = &'a GridGeometry>,
    {
        others
            .into_iter()
            .try_for_each(|g| self.ensure_aligned(g, context))
    }
}

fn describe(crs: &Option<CRS>) -> String {
    crs.as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}
