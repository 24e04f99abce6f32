//! Pipeline configuration file

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use covershift_algorithms::change::ChangeParams;
use covershift_algorithms::classification::FeatureParams;
use covershift_algorithms::imagery::{CloudMaskParams, MosaicParams, QaBitLayout, SensorLayout};

/// Input and output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Holds one directory of scene directories per period
    pub raw_dir: PathBuf,
    /// Root of every product
    pub processed_dir: PathBuf,
    /// Random forest artifact
    pub model: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            model: PathBuf::from("models/random_forest.json"),
        }
    }
}

/// The two periods compared by change analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodsConfig {
    pub t1: String,
    pub t2: String,
}

impl Default for PeriodsConfig {
    fn default() -> Self {
        Self {
            t1: "2018".to_string(),
            t2: "2023".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    #[serde(flatten)]
    pub features: FeatureParams,
    /// Blocks per batch
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub periods: PeriodsConfig,
    pub sensor: SensorLayout,
    pub qa: QaBitLayout,
    pub mosaic: MosaicParams,
    pub classify: ClassifyConfig,
    pub change: ChangeParams,
}

impl PipelineConfig {
    pub fn cloud_mask(&self) -> CloudMaskParams {
        CloudMaskParams {
            qa: self.qa,
            sensor: self.sensor.clone(),
        }
    }
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;

    toml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))
}

/// Load `path` if given and present, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) if p.exists() => load_toml_config(p),
        Some(p) => {
            debug!("config {} not found, using defaults", p.display());
            Ok(PipelineConfig::default())
        }
        None => Ok(PipelineConfig::default()),
    }
}
