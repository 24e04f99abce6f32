//! Raster data structures and operations

mod element;
mod geometry;
mod geotransform;
mod grid;
mod window;

pub use element::RasterElement;
pub use geometry::GridGeometry;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use window::{BlockWindows, Window};
