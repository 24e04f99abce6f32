//! Pixel classification with a pretrained model
//!
//! - **Classifier**: the model contract, probabilities per label
//! - **RandomForest**: JSON decision-forest artifact
//! - **Features**: validity mask and per-pixel feature matrix
//! - **WindowedClassifier**: block-streamed classification of a mosaic

mod features;
mod forest;
mod model;
mod windowed;

pub use features::{feature_matrix, valid_mask, FeatureParams};
pub use forest::{Node, RandomForest, Tree};
pub use model::{Classifier, Prediction};
pub use windowed::{classify_block, ClassifiedBlock, ClassifyParams, ClassifyReport, WindowedClassifier};
