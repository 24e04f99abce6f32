//! GeoTIFF input and output
//!
//! Scenes are read window by window through [`GeoTiffReader`] and products
//! are streamed strip by strip through [`StripSink`] into an [`OutputFile`].

mod geokeys;
mod native;
mod output;
mod reader;
mod sample;
mod writer;

pub use geokeys::GeoMeta;
pub use native::{read_geotiff, write_geotiff, GeoTiffOptions};
pub use output::OutputFile;
pub use reader::{ChunkLayout, GeoTiffReader};
pub use sample::{samples_of, Float32x4, GraySample, SampleKind};
pub use writer::StripSink;

pub use tiff::encoder::colortype::{ColorType, Gray16, Gray32Float, Gray8};
pub use tiff::encoder::TiffEncoder;
