//! Classifier contract
//!
//! A classifier maps a feature matrix (one row per pixel) to a probability
//! matrix (one column per label). The label behind each column is exposed
//! explicitly through [`Classifier::label_order`].

use ndarray::{Array2, ArrayView2};
use covershift_core::{Error, Result};

/// A pretrained, immutable pixel classifier.
pub trait Classifier: Send + Sync {
    /// Labels in probability-column order. Never contains 0.
    fn label_order(&self) -> &[u8];

    /// Number of features expected per row
    fn n_features(&self) -> usize;

    /// Class probabilities, shape `(features.nrows(), label_order().len())`.
    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>>;

    /// Most probable label per row with its probability.
    ///
    /// Ties resolve to the first maximum in label order.
    fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Prediction> {
        if features.ncols() != self.n_features() {
            return Err(Error::Classifier(format!(
                "expected {} features, got {}",
                self.n_features(),
                features.ncols()
            )));
        }
        let labels = self.label_order();
        if labels.is_empty() {
            return Err(Error::Classifier("model has no labels".into()));
        }
        if labels.contains(&0) {
            return Err(Error::Classifier("label 0 is reserved for nodata".into()));
        }

        let proba = self.predict_proba(features)?;
        if proba.dim() != (features.nrows(), labels.len()) {
            return Err(Error::Classifier(format!(
                "probability matrix is {}x{}, expected {}x{}",
                proba.nrows(),
                proba.ncols(),
                features.nrows(),
                labels.len()
            )));
        }

        let mut prediction = Prediction::with_capacity(proba.nrows());
        for row in proba.rows() {
            let (mut best, mut best_p) = (0usize, f32::NEG_INFINITY);
            for (i, &p) in row.iter().enumerate() {
                if p.is_nan() {
                    return Err(Error::Classifier("NaN probability".into()));
                }
                if p > best_p {
                    best = i;
                    best_p = p;
                }
            }
            prediction.labels.push(labels[best]);
            prediction.probabilities.push(best_p);
        }
        Ok(prediction)
    }
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn label_order(&self) -> &[u8] {
        (**self).label_order()
    }

    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        (**self).predict_proba(features)
    }
}

/// Per-row predicted label and its probability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    pub labels: Vec<u8>,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    fn with_capacity(n: usize) -> Self {
        Self {
            labels: Vec::with_capacity(n),
            probabilities: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
