//! Pipeline stages over the on-disk directory layout

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use covershift_algorithms::change::{ChangeAnalyzer, PeriodMaps};
use covershift_algorithms::classification::{
    ClassifyParams, ClassifyReport, RandomForest, WindowedClassifier,
};
use covershift_algorithms::imagery::{
    masked_scenes, scene_dirs, validate_scene, CloudMasker, MosaicReport, SceneMosaicker,
    SceneValidation,
};
use covershift_parallel::ProcessingMode;

use crate::config::PipelineConfig;

/// Where each product of a period lives.
#[derive(Debug, Clone)]
pub struct Layout {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

impl Layout {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            raw_dir: config.paths.raw_dir.clone(),
            processed_dir: config.paths.processed_dir.clone(),
        }
    }

    pub fn scenes(&self, period: &str) -> PathBuf {
        self.raw_dir.join(period)
    }

    pub fn masked_dir(&self, period: &str) -> PathBuf {
        self.processed_dir.join(period).join("cloud_masked")
    }

    pub fn mosaic(&self, period: &str) -> PathBuf {
        self.processed_dir
            .join(period)
            .join(format!("mosaic_{}.tif", period))
    }

    pub fn classes(&self, period: &str) -> PathBuf {
        self.processed_dir
            .join("predictions")
            .join(format!("lulc_{}.tif", period))
    }

    pub fn confidence(&self, period: &str) -> PathBuf {
        self.processed_dir
            .join("predictions")
            .join(format!("confidence_{}.tif", period))
    }

    pub fn change_dir(&self) -> PathBuf {
        self.processed_dir.join("change")
    }

    pub fn stats_dir(&self) -> PathBuf {
        self.processed_dir.join("stats")
    }
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn block_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} blocks ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(msg.to_string());
    pb
}

fn done(name: &str, path: &Path, start: Instant) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", start.elapsed());
}

/// Runs stages with one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    layout: Layout,
    mode: ProcessingMode,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, mode: ProcessingMode) -> Self {
        let layout = Layout::new(&config);
        Self {
            config,
            layout,
            mode,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Check every scene of `period` for its band and quality files.
    pub fn validate(&self, period: &str) -> Result<Vec<SceneValidation>> {
        let dir = self.layout.scenes(period);
        let scenes = scene_dirs(&dir).with_context(|| format!("Failed to list period {}", period))?;
        scenes
            .iter()
            .map(|scene| {
                validate_scene(scene, &self.config.sensor)
                    .with_context(|| format!("Failed to inspect {}", scene.display()))
            })
            .collect()
    }

    pub fn mask(&self, period: &str) -> Result<()> {
        let start = Instant::now();
        let masker = CloudMasker::new(self.config.cloud_mask()).context("Invalid masking parameters")?;
        let out_dir = self.layout.masked_dir(period);
        let pb = spinner(&format!("Masking scenes of {}...", period));
        let results = masker
            .mask_period(&self.layout.scenes(period), &out_dir)
            .with_context(|| format!("Failed to mask period {}", period));
        pb.finish_and_clear();

        for (path, report) in results? {
            info!(
                scene = %report.scene,
                cloud = report.cloud,
                shadow = report.cloud_shadow,
                cirrus = report.cirrus,
                footprint = report.footprint,
                "masked {} of {} pixels",
                report.masked,
                report.pixels
            );
            done("Masked scene", &path, start);
        }
        Ok(())
    }

    pub fn mosaic(&self, period: &str) -> Result<MosaicReport> {
        let start = Instant::now();
        let scenes = masked_scenes(&self.layout.masked_dir(period))
            .with_context(|| format!("No masked scenes for {}", period))?;
        let output = self.layout.mosaic(period);

        let pb = spinner(&format!("Mosaicking {} scenes...", scenes.len()));
        let report = SceneMosaicker::new(self.config.mosaic)
            .mosaic(&scenes, &output)
            .with_context(|| format!("Failed to mosaic period {}", period));
        pb.finish_and_clear();
        let report = report?;

        for (scene, filled) in report.scene_order.iter().zip(&report.filled) {
            info!("{}: {} pixels", scene.display(), filled);
        }
        done("Mosaic", &output, start);
        Ok(report)
    }

    pub fn classify(&self, period: &str, input: Option<&Path>) -> Result<ClassifyReport> {
        let start = Instant::now();
        let input = input
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.mosaic(period));
        let model = RandomForest::load(&self.config.paths.model).context("Failed to load classifier")?;

        let params = ClassifyParams {
            features: self.config.classify.features,
            mode: self.mode,
            batch_size: self.config.classify.batch_size,
        };
        let pb = block_bar(&format!("Classifying {}", period));
        let progress = pb.clone();
        let classifier = WindowedClassifier::new(model, params).with_progress(move |done, total| {
            progress.set_length(total as u64);
            progress.set_position(done as u64);
        });

        let report = classifier
            .classify(&input, &self.layout.classes(period), &self.layout.confidence(period))
            .with_context(|| format!("Failed to classify {}", input.display()));
        pb.finish_and_clear();
        let report = report?;

        for (class, count) in &report.class_counts {
            info!("class {}: {} pixels", class, count);
        }
        done("Classification", &report.classes_path, start);
        Ok(report)
    }

    pub fn change(&self) -> Result<()> {
        let start = Instant::now();
        let periods = &self.config.periods;
        let analyzer =
            ChangeAnalyzer::new(self.config.change.clone()).context("Invalid change parameters")?;

        let load = |label: &str| {
            PeriodMaps::load(label, &self.layout.classes(label), &self.layout.confidence(label))
                .with_context(|| format!("Failed to read predictions for {}", label))
        };
        let t1 = load(&periods.t1)?;
        let t2 = load(&periods.t2)?;

        let pb = spinner("Analyzing change...");
        let outputs = analyzer
            .analyze(&t1, &t2)
            .and_then(|products| {
                analyzer.write(&products, &self.layout.change_dir(), &self.layout.stats_dir())
            })
            .context("Failed to analyze change");
        pb.finish_and_clear();
        let outputs = outputs?;

        done("Change map", &outputs.change_map, start);
        println!("Statistics saved to: {}", self.layout.stats_dir().display());
        Ok(())
    }

    /// Every stage for both periods
    pub fn run_all(&self) -> Result<()> {
        let periods = [self.config.periods.t1.clone(), self.config.periods.t2.clone()];
        for period in &periods {
            info!(period = %period, "processing period");
            self.mask(period)?;
            self.mosaic(period)?;
            self.classify(period, None)?;
        }
        self.change()
    }
}
