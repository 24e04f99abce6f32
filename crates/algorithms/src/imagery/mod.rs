//! Scene preparation for classification
//!
//! - Cloud masking: QA-bit driven invalidation of reflectance bands
//! - Mosaicking: first-valid-wins merge of a period's masked scenes
//! - Normalized difference: NDVI and the generic two-band index

mod cloud_mask;
mod indices;
mod mosaic;

pub use cloud_mask::{
    scene_dirs, validate_scene, CloudMaskParams, CloudMasker, MaskReport, QaBitLayout,
    SceneFiles, SceneValidation, SensorLayout,
};
pub use indices::{ndvi, normalized_difference, normalized_difference_value, DEFAULT_EPSILON};
pub use mosaic::{masked_scenes, MosaicParams, MosaicReport, SceneMosaicker, ScenePriority};
