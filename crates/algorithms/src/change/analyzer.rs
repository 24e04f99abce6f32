//! Two-period change analysis

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::maybe_rayon::join;
use covershift_core::io::{read_geotiff, write_geotiff};
use covershift_core::raster::Raster;
use covershift_core::{Error, Result};

use super::classes::ClassScheme;
use super::report::{write_summary_json, write_transition_csv, write_transition_json};
use super::statistics::{
    class_summary, pixel_area_sq_km, transition_statistics, ClassSummary, TransitionStatistics,
};
use super::transition::{transition_map, transition_probability};

/// Parameters for [`ChangeAnalyzer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeParams {
    pub classes: ClassScheme,
    /// Pixel size in metres used for areas
    pub resolution_m: f64,
}

impl Default for ChangeParams {
    fn default() -> Self {
        Self {
            classes: ClassScheme::default(),
            resolution_m: 30.0,
        }
    }
}

/// Classification and confidence of one period
#[derive(Debug, Clone)]
pub struct PeriodMaps {
    pub label: String,
    pub classes: Raster<u8>,
    pub confidence: Raster<f32>,
}

impl PeriodMaps {
    /// Read a period's classification and confidence rasters.
    pub fn load(label: impl Into<String>, classes: &Path, confidence: &Path) -> Result<Self> {
        Ok(Self {
            label: label.into(),
            classes: read_geotiff(classes, None)?,
            confidence: read_geotiff(confidence, None)?,
        })
    }
}

/// Everything change analysis derives from two periods
#[derive(Debug, Clone)]
pub struct ChangeProducts {
    pub t1_label: String,
    pub t2_label: String,
    pub change_map: Raster<u8>,
    pub probability: Raster<f32>,
    pub transitions: TransitionStatistics,
    pub summary: Vec<ClassSummary>,
}

/// Where [`ChangeAnalyzer::write`] placed each product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeOutputs {
    pub change_map: PathBuf,
    pub probability: PathBuf,
    pub matrix_csv: PathBuf,
    pub matrix_json: PathBuf,
    pub summary_json: PathBuf,
}

/// Compares two classified periods.
#[derive(Debug, Clone)]
pub struct ChangeAnalyzer {
    params: ChangeParams,
}

impl ChangeAnalyzer {
    pub fn new(params: ChangeParams) -> Result<Self> {
        params.classes.validate()?;
        if !(params.resolution_m.is_finite() && params.resolution_m > 0.0) {
            return Err(Error::InvalidParameter {
                name: "resolution_m",
                value: params.resolution_m.to_string(),
                reason: "must be a positive number of metres".into(),
            });
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &ChangeParams {
        &self.params
    }

    /// Compute the transition map, transition probability, transition
    /// statistics and class summary concurrently.
    pub fn analyze(&self, t1: &PeriodMaps, t2: &PeriodMaps) -> Result<ChangeProducts> {
        let reference = t1.classes.geometry();
        reference.ensure_all_aligned(
            [
                &t1.confidence.geometry(),
                &t2.classes.geometry(),
                &t2.confidence.geometry(),
            ],
            "change analysis",
        )?;

        let scheme = &self.params.classes;
        let pixel_area = pixel_area_sq_km(self.params.resolution_m);
        info!(
            t1 = %t1.label,
            t2 = %t2.label,
            rows = reference.rows,
            cols = reference.cols,
            pixel_area_sq_km = pixel_area,
            "analyzing change"
        );

        let ((change_map, probability), (transitions, summary)) = join(
            || {
                join(
                    || transition_map(&t1.classes, &t2.classes),
                    || transition_probability(&t1.confidence, &t2.confidence),
                )
            },
            || {
                join(
                    || transition_statistics(&t1.classes, &t2.classes, scheme, pixel_area),
                    || class_summary(&t1.classes, &t2.classes, scheme, pixel_area),
                )
            },
        );

        Ok(ChangeProducts {
            t1_label: t1.label.clone(),
            t2_label: t2.label.clone(),
            change_map: change_map?,
            probability: probability?,
            transitions: transitions?,
            summary: summary?,
        })
    }

    /// Write rasters to `change_dir` and tables to `stats_dir`.
    pub fn write(
        &self,
        products: &ChangeProducts,
        change_dir: &Path,
        stats_dir: &Path,
    ) -> Result<ChangeOutputs> {
        let scheme = &self.params.classes;
        let change_map = change_dir.join("change_map.tif");
        let probability = change_dir.join("transition_probability.tif");
        write_geotiff(&products.change_map, &change_map, None)?;
        write_geotiff(&products.probability, &probability, None)?;

        let outputs = ChangeOutputs {
            change_map,
            probability,
            matrix_csv: write_transition_csv(
                &products.transitions,
                scheme,
                &stats_dir.join("transition_matrix.csv"),
            )?,
            matrix_json: write_transition_json(
                &products.transitions,
                scheme,
                &stats_dir.join("transition_matrix.json"),
            )?,
            summary_json: write_summary_json(
                &products.summary,
                &products.t1_label,
                &products.t2_label,
                &stats_dir.join("summary_stats.json"),
            )?,
        };
        info!(
            "change products written to {} and {}",
            change_dir.display(),
            stats_dir.display()
        );
        Ok(outputs)
    }
}
