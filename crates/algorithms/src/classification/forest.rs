//! Random forest classifier loaded from a JSON artifact
//!
//! ```json
//! {
//!   "classes": [1, 2, 3, 4, 5],
//!   "n_features": 5,
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 4, "threshold": 0.3, "left": 1, "right": 2 },
//!         { "value": [0, 3, 1, 0, 0] },
//!         { "value": [5, 0, 1, 0, 0] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! A split sends a row left when `x[feature] <= threshold`. Leaf values are
//! class weights, normalised to probabilities at load time.

use std::path::Path;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::info;

use covershift_core::{Error, Result};

use super::model::Classifier;

/// One node of a decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f32>,
    },
}

/// A decision tree stored as a flat node list rooted at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn leaf_for(&self, x: ArrayView1<'_, f32>) -> &[f32] {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => i = if x[*feature] <= *threshold { *left } else { *right },
                Node::Leaf { value } => return value,
            }
        }
    }

    fn validate(&mut self, index: usize, n_classes: usize, n_features: usize) -> Result<()> {
        let bad = |reason: String| Error::Classifier(format!("tree {}: {}", index, reason));
        if self.nodes.is_empty() {
            return Err(bad("no nodes".into()));
        }
        let n = self.nodes.len();
        for (i, node) in self.nodes.iter_mut().enumerate() {
            match node {
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(bad(format!("node {} uses feature {}", i, feature)));
                    }
                    // children after parent: traversal always terminates
                    for child in [*left, *right] {
                        if child <= i || child >= n {
                            return Err(bad(format!("node {} has child {}", i, child)));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(bad(format!(
                            "leaf {} has {} values for {} classes",
                            i,
                            value.len(),
                            n_classes
                        )));
                    }
                    if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                        return Err(bad(format!("leaf {} has invalid weights", i)));
                    }
                    let sum: f32 = value.iter().sum();
                    if sum <= 0.0 {
                        return Err(bad(format!("leaf {} has zero weight", i)));
                    }
                    value.iter_mut().for_each(|v| *v /= sum);
                }
            }
        }
        Ok(())
    }
}

/// Random forest of decision trees; probability is the mean leaf distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    classes: Vec<u8>,
    n_features: usize,
    trees: Vec<Tree>,
}

impl RandomForest {
    /// Build and validate a forest from its parts.
    pub fn new(classes: Vec<u8>, n_features: usize, trees: Vec<Tree>) -> Result<Self> {
        let mut forest = Self {
            classes,
            n_features,
            trees,
        };
        forest.validate()?;
        Ok(forest)
    }

    /// Load a forest artifact from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            return Err(Error::missing_in_dir(name, dir));
        }
        let text = std::fs::read_to_string(path)?;
        let forest = Self::from_json_str(&text)?;
        info!(
            trees = forest.trees.len(),
            classes = ?forest.classes,
            "loaded classifier from {}",
            path.display()
        );
        Ok(forest)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let mut forest: Self = serde_json::from_str(text)
            .map_err(|e| Error::Classifier(format!("invalid model artifact: {}", e)))?;
        forest.validate()?;
        Ok(forest)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn validate(&mut self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(Error::Classifier("model has no classes".into()));
        }
        if self.classes.contains(&0) {
            return Err(Error::Classifier("class label 0 is reserved for nodata".into()));
        }
        if self.trees.is_empty() {
            return Err(Error::Classifier("model has no trees".into()));
        }
        let (k, f) = (self.classes.len(), self.n_features);
        for (i, tree) in self.trees.iter_mut().enumerate() {
            tree.validate(i, k, f)?;
        }
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn label_order(&self) -> &[u8] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if features.ncols() != self.n_features {
            return Err(Error::Classifier(format!(
                "expected {} features, got {}",
                self.n_features,
                features.ncols()
            )));
        }
        let k = self.classes.len();
        let scale = 1.0 / self.trees.len() as f32;
        let mut out = Array2::<f32>::zeros((features.nrows(), k));
        for (x, mut acc) in features.rows().into_iter().zip(out.rows_mut()) {
            for tree in &self.trees {
                for (a, &p) in acc.iter_mut().zip(tree.leaf_for(x)) {
                    *a += p;
                }
            }
            acc.mapv_inplace(|v| v * scale);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    const STUMP: &str = r#"{
        "classes": [1, 2],
        "n_features": 1,
        "trees": [
            { "nodes": [
                { "feature": 0, "threshold": 0.5, "left": 1, "right": 2 },
                { "value": [3.0, 1.0] },
                { "value": [0.0, 2.0] }
            ] },
            { "nodes": [ { "value": [1.0, 1.0] } ] }
        ]
    }"#;

    #[test]
    fn mean_of_normalised_leaves() {
        let rf = RandomForest::from_json_str(STUMP).unwrap();
        let p = rf.predict_proba(array![[0.2f32], [0.9]].view()).unwrap();
        assert_relative_eq!(p[[0, 0]], (0.75 + 0.5) / 2.0);
        assert_relative_eq!(p[[0, 1]], (0.25 + 0.5) / 2.0);
        assert_relative_eq!(p[[1, 0]], 0.25);
        assert_relative_eq!(p[[1, 1]], 0.75);

        let pred = rf.predict(array![[0.2f32], [0.9]].view()).unwrap();
        assert_eq!(pred.labels, vec![1, 2]);
    }

    #[test]
    fn threshold_is_inclusive_on_the_left() {
        let rf = RandomForest::from_json_str(STUMP).unwrap();
        let pred = rf.predict(array![[0.5f32]].view()).unwrap();
        assert_eq!(pred.labels, vec![1]);
    }

    #[test]
    fn backward_child_rejected() {
        let json = r#"{"classes":[1],"n_features":1,"trees":[{"nodes":[
            {"feature":0,"threshold":0.0,"left":0,"right":1},{"value":[1.0]}]}]}"#;
        assert!(matches!(RandomForest::from_json_str(json), Err(Error::Classifier(_))));
    }

    #[test]
    fn feature_out_of_range_rejected() {
        let json = r#"{"classes":[1],"n_features":1,"trees":[{"nodes":[
            {"feature":3,"threshold":0.0,"left":1,"right":2},{"value":[1.0]},{"value":[1.0]}]}]}"#;
        assert!(RandomForest::from_json_str(json).is_err());
    }

    #[test]
    fn leaf_width_and_zero_label_rejected() {
        let wide = r#"{"classes":[1,2],"n_features":1,"trees":[{"nodes":[{"value":[1.0]}]}]}"#;
        assert!(RandomForest::from_json_str(wide).is_err());
        let zero = r#"{"classes":[0,2],"n_features":1,"trees":[{"nodes":[{"value":[1.0,1.0]}]}]}"#;
        assert!(RandomForest::from_json_str(zero).is_err());
        let empty = r#"{"classes":[1],"n_features":1,"trees":[{"nodes":[{"value":[0.0]}]}]}"#;
        assert!(RandomForest::from_json_str(empty).is_err());
    }

    #[test]
    fn missing_artifact_lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.json"), "{}").unwrap();
        match RandomForest::load(dir.path().join("model.json")) {
            Err(Error::MissingInput { item, available, .. }) => {
                assert_eq!(item, "model.json");
                assert_eq!(available, vec!["other.json".to_string()]);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
