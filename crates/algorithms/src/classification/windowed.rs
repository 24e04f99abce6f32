//! Out-of-core classification of a mosaic
//!
//! The input is read in its native block layout (strips or tiles). Blocks
//! are read sequentially, classified in batches by an [`Executor`], and
//! written in block order to a classification raster (u8, nodata 0) and a
//! confidence raster (f32, nodata 0). Peak memory is one batch of blocks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView3, Zip};
use serde::Serialize;
use tracing::{debug, info};

use covershift_core::io::{GeoTiffReader, Gray32Float, Gray8, OutputFile, StripSink, TiffEncoder};
use covershift_core::{Error, Result};
use covershift_parallel::{
    default_batch_size, Batches, CancelToken, Executor, ParallelStrategy, ProcessingMode,
};

use super::features::{feature_matrix, valid_mask, FeatureParams};
use super::model::Classifier;

/// Parameters for [`WindowedClassifier`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassifyParams {
    pub features: FeatureParams,
    pub mode: ProcessingMode,
    /// Blocks per batch; defaults to four per worker thread
    pub batch_size: Option<usize>,
}

/// Classes and confidence of one block, zero where the input is invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedBlock {
    pub classes: Array2<u8>,
    pub confidence: Array2<f32>,
    pub valid: usize,
}

/// Summary of a classification run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifyReport {
    pub blocks: usize,
    pub empty_blocks: usize,
    pub valid_pixels: u64,
    pub class_counts: BTreeMap<u8, u64>,
    pub classes_path: PathBuf,
    pub confidence_path: PathBuf,
}

impl ClassifyReport {
    fn add(&mut self, block: &ClassifiedBlock) {
        self.blocks += 1;
        if block.valid == 0 {
            self.empty_blocks += 1;
            return;
        }
        self.valid_pixels += block.valid as u64;
        for &c in block.classes.iter().filter(|&&c| c != 0) {
            *self.class_counts.entry(c).or_insert(0) += 1;
        }
    }
}

/// Classify one `(bands, rows, cols)` block.
pub fn classify_block<C: Classifier + ?Sized>(
    classifier: &C,
    block: ArrayView3<'_, f32>,
    nodata: Option<f32>,
    params: &FeatureParams,
) -> Result<ClassifiedBlock> {
    let (_, rows, cols) = block.dim();
    let mask = valid_mask(block, nodata);
    let valid = mask.iter().filter(|&&m| m).count();

    let mut classes = Array2::<u8>::zeros((rows, cols));
    let mut confidence = Array2::<f32>::zeros((rows, cols));
    if valid == 0 {
        return Ok(ClassifiedBlock {
            classes,
            confidence,
            valid,
        });
    }

    let features = feature_matrix(block, &mask, params);
    let prediction = classifier.predict(features.view())?;
    if prediction.len() != valid {
        return Err(Error::Classifier(format!(
            "{} predictions for {} pixels",
            prediction.len(),
            valid
        )));
    }

    let mut next = prediction.labels.iter().zip(&prediction.probabilities);
    Zip::from(&mask)
        .and(&mut classes)
        .and(&mut confidence)
        .for_each(|&m, class, conf| {
            if m {
                if let Some((&label, &p)) = next.next() {
                    *class = label;
                    *conf = p;
                }
            }
        });

    Ok(ClassifiedBlock {
        classes,
        confidence,
        valid,
    })
}

type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Streams a mosaic through a classifier block by block.
pub struct WindowedClassifier<C> {
    classifier: C,
    params: ClassifyParams,
    cancel: CancelToken,
    progress: Option<ProgressFn>,
}

impl<C: Classifier> WindowedClassifier<C> {
    pub fn new(classifier: C, params: ClassifyParams) -> Self {
        Self {
            classifier,
            params,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    /// Use `token` to stop the run between batches.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Called after each batch with (blocks done, total blocks).
    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Classify `input` into `classes_path` and `confidence_path`.
    ///
    /// Both outputs are committed only when every block succeeded.
    pub fn classify(
        &self,
        input: &Path,
        classes_path: &Path,
        confidence_path: &Path,
    ) -> Result<ClassifyReport> {
        let mut reader = GeoTiffReader::open(input)?;
        let bands = reader.bands();
        let features = &self.params.features;
        features.validate(bands)?;
        if self.classifier.n_features() != features.n_features(bands) {
            return Err(Error::Classifier(format!(
                "model expects {} features, {}-band input gives {}",
                self.classifier.n_features(),
                bands,
                features.n_features(bands)
            )));
        }

        let executor = Executor::new(self.params.mode)?;
        let batch_size = self
            .params
            .batch_size
            .unwrap_or_else(|| default_batch_size(executor.threads()));
        let geometry = reader.geometry().clone();
        let nodata = reader.nodata().map(|v| v as f32);
        let (block_rows, block_cols) = reader.block_shape();
        let total = reader.block_windows().block_count();

        info!(
            input = %input.display(),
            rows = geometry.rows,
            cols = geometry.cols,
            block_rows,
            block_cols,
            blocks = total,
            mode = ?executor.mode(),
            threads = executor.threads(),
            "classifying"
        );

        let mut report = ClassifyReport::default();
        let mut classes_out = OutputFile::create(classes_path)?;
        let mut confidence_out = OutputFile::create(confidence_path)?;
        {
            let mut classes_enc = TiffEncoder::new(classes_out.file_mut())?;
            let mut confidence_enc = TiffEncoder::new(confidence_out.file_mut())?;
            let mut classes =
                StripSink::<_, Gray8>::new(&mut classes_enc, &geometry, Some(0.0), block_rows)?;
            let mut confidence = StripSink::<_, Gray32Float>::new(
                &mut confidence_enc,
                &geometry,
                Some(0.0),
                block_rows,
            )?;

            for batch in Batches::new(reader.block_windows(), batch_size) {
                self.cancel.check()?;

                let mut blocks = Vec::with_capacity(batch.len());
                for window in batch {
                    let data = reader.read_window::<f32>(&window)?;
                    blocks.push((window, data));
                }

                let results = executor.try_map(blocks, |(w, block)| {
                    classify_block(&self.classifier, block.view(), nodata, features)
                        .map(|out| (w, out))
                })?;

                for (window, out) in &results {
                    classes.write_band_window(window, out.classes.view())?;
                    confidence.write_band_window(window, out.confidence.view())?;
                    report.add(out);
                }
                debug!(done = report.blocks, total, "batch classified");
                if let Some(progress) = &self.progress {
                    progress(report.blocks, total);
                }
            }

            classes.finish()?;
            confidence.finish()?;
        }

        self.cancel.check()?;
        let mut paths = OutputFile::commit_all(vec![classes_out, confidence_out])?.into_iter();
        if let (Some(classes), Some(confidence)) = (paths.next(), paths.next()) {
            report.classes_path = classes;
            report.confidence_path = confidence;
        }

        info!(
            valid = report.valid_pixels,
            empty_blocks = report.empty_blocks,
            "classification written to {}",
            report.classes_path.display()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::model::tests::Fixed;
    use ndarray::Array3;

    #[test]
    fn invalid_pixels_get_zero() {
        let mut block = Array3::from_elem((4, 2, 2), 0.2f32);
        block[[1, 0, 1]] = f32::NAN;
        let clf = Fixed {
            labels: vec![1, 2, 3, 4, 5],
            row: vec![0.1, 0.6, 0.1, 0.1, 0.1],
            n_features: 5,
        };
        let out = classify_block(&clf, block.view(), None, &FeatureParams::default()).unwrap();
        assert_eq!(out.valid, 3);
        assert_eq!(out.classes, ndarray::array![[2, 0], [2, 2]]);
        assert_eq!(out.confidence[[0, 1]], 0.0);
        assert_eq!(out.confidence[[1, 1]], 0.6);
    }

    #[test]
    fn empty_block_skips_classifier() {
        struct Panics;
        impl Classifier for Panics {
            fn label_order(&self) -> &[u8] {
                &[1]
            }
            fn n_features(&self) -> usize {
                5
            }
            fn predict_proba(&self, _: ndarray::ArrayView2<'_, f32>) -> Result<Array2<f32>> {
                panic!("classifier called for an empty block")
            }
        }
        let block = Array3::from_elem((4, 3, 3), f32::NAN);
        let out = classify_block(&Panics, block.view(), None, &FeatureParams::default()).unwrap();
        assert_eq!(out.valid, 0);
        assert!(out.classes.iter().all(|&c| c == 0));
    }

    #[test]
    fn report_counts_classes() {
        let mut report = ClassifyReport::default();
        report.add(&ClassifiedBlock {
            classes: ndarray::array![[1, 0], [3, 1]],
            confidence: Array2::zeros((2, 2)),
            valid: 3,
        });
        report.add(&ClassifiedBlock {
            classes: Array2::zeros((2, 2)),
            confidence: Array2::zeros((2, 2)),
            valid: 0,
        });
        assert_eq!(report.blocks, 2);
        assert_eq!(report.empty_blocks, 1);
        assert_eq!(report.valid_pixels, 3);
        assert_eq!(report.class_counts.get(&1), Some(&2));
        assert_eq!(report.class_counts.get(&3), Some(&1));
    }
}
