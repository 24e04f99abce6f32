//! # covershift core
//!
//! Core types, traits and I/O for the covershift land-cover change pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic in-memory raster grid
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling
//! - `GridGeometry`: alignment identity used to reject mismatched rasters
//! - `Window`: block windows for out-of-core processing
//! - Block-wise GeoTIFF reading and strip-streamed GeoTIFF writing

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{BlockWindows, GeoTransform, GridGeometry, Raster, RasterElement, Window};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{BlockWindows, GeoTransform, GridGeometry, Raster, RasterElement, Window};
}
