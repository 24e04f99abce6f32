//! # covershift algorithms
//!
//! Stages of the land-cover change pipeline.
//!
//! ## Stages
//!
//! - **imagery**: cloud masking of scenes, mosaicking of masked scenes, NDVI
//! - **classification**: classifier contract, random forest, windowed classification
//! - **change**: transition map and probability, transition statistics, class summary

pub mod change;
pub mod classification;
pub mod imagery;
pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::change::{
        decode_transition, encode_transition, transition_map, transition_probability,
        ChangeAnalyzer, ChangeParams, ClassScheme, PeriodMaps,
    };
    pub use crate::classification::{
        Classifier, ClassifyParams, FeatureParams, RandomForest, WindowedClassifier,
    };
    pub use crate::imagery::{
        ndvi, CloudMaskParams, CloudMasker, MosaicParams, SceneMosaicker, ScenePriority,
    };
    pub use covershift_core::prelude::*;
}
