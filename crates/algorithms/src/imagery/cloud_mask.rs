//! Cloud, shadow and footprint masking of multispectral scenes
//!
//! A scene is a directory holding one GeoTIFF per reflectance band plus a
//! quality bitmask band. Pixels flagged as cloud, cloud shadow or cirrus in
//! the bitmask, and pixels where every band is zero (outside the scene
//! footprint), are set to NaN in all bands. The masked bands are written as
//! one four-band float32 GeoTIFF per scene.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayView2, ArrayViewMut3, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use covershift_core::io::{Float32x4, GeoTiffReader, OutputFile, StripSink, TiffEncoder};
use covershift_core::{Error, Result, CRS};

/// Bit positions of the contamination flags in the quality band.
///
/// Defaults follow the Landsat Collection 2 `QA_PIXEL` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaBitLayout {
    pub cirrus_bit: u8,
    pub cloud_bit: u8,
    pub cloud_shadow_bit: u8,
}

impl Default for QaBitLayout {
    fn default() -> Self {
        Self {
            cirrus_bit: 2,
            cloud_bit: 3,
            cloud_shadow_bit: 4,
        }
    }
}

impl QaBitLayout {
    #[inline]
    fn flag(qa: u16, bit: u8) -> bool {
        (qa >> bit) & 1 == 1
    }

    #[inline]
    pub fn is_cloud(&self, qa: u16) -> bool {
        Self::flag(qa, self.cloud_bit)
    }

    #[inline]
    pub fn is_cloud_shadow(&self, qa: u16) -> bool {
        Self::flag(qa, self.cloud_shadow_bit)
    }

    #[inline]
    pub fn is_cirrus(&self, qa: u16) -> bool {
        Self::flag(qa, self.cirrus_bit)
    }

    /// Any of the three flags is set
    #[inline]
    pub fn is_contaminated(&self, qa: u16) -> bool {
        self.is_cloud(qa) || self.is_cloud_shadow(qa) || self.is_cirrus(qa)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, bit) in [
            ("cirrus_bit", self.cirrus_bit),
            ("cloud_bit", self.cloud_bit),
            ("cloud_shadow_bit", self.cloud_shadow_bit),
        ] {
            if bit >= 16 {
                return Err(Error::InvalidParameter {
                    name: "qa",
                    value: format!("{}={}", name, bit),
                    reason: "bit positions must be below 16".into(),
                });
            }
        }
        Ok(())
    }
}

/// File naming of a scene: one keyword per reflectance band, one for the
/// quality band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorLayout {
    /// Keywords for blue, green, red and near-infrared, in output band order
    pub band_keywords: Vec<String>,
    pub qa_keyword: String,
}

impl Default for SensorLayout {
    fn default() -> Self {
        Self {
            band_keywords: ["B2", "B3", "B4", "B5"].iter().map(|s| s.to_string()).collect(),
            qa_keyword: "QA_PIXEL".to_string(),
        }
    }
}

impl SensorLayout {
    /// All keywords, bands first
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.band_keywords
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.qa_keyword.as_str()))
    }
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("tif"))
}

fn missing_dir(dir: &Path) -> Error {
    Error::missing_in_dir(scene_name(dir), dir.parent().unwrap_or(dir))
}

/// Sorted GeoTIFF files directly inside `dir`.
fn list_tiffs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|_| missing_dir(dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_tiff(p))
        .collect();
    files.sort();
    Ok(files)
}

/// First file whose name contains `keyword`, ignoring case.
fn find_by_keyword(files: &[PathBuf], keyword: &str) -> Option<PathBuf> {
    let keyword = keyword.to_ascii_uppercase();
    files
        .iter()
        .find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_ascii_uppercase().contains(&keyword))
                .unwrap_or(false)
        })
        .cloned()
}

/// Resolved input files of one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneFiles {
    pub dir: PathBuf,
    pub bands: Vec<PathBuf>,
    pub qa: PathBuf,
}

impl SceneFiles {
    /// Locate every band and the quality file of the scene in `dir`.
    ///
    /// Fails with [`Error::MissingInput`] naming the first absent item.
    pub fn discover(dir: impl AsRef<Path>, layout: &SensorLayout) -> Result<Self> {
        let dir = dir.as_ref();
        let files = list_tiffs(dir)?;
        let find = |keyword: &str| {
            find_by_keyword(&files, keyword)
                .ok_or_else(|| Error::missing_in_dir(format!("band {}", keyword), dir))
        };

        let bands = layout
            .band_keywords
            .iter()
            .map(|k| find(k))
            .collect::<Result<Vec<_>>>()?;
        let qa = find(&layout.qa_keyword)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            bands,
            qa,
        })
    }

    /// Scene identifier: the directory name
    pub fn name(&self) -> String {
        scene_name(&self.dir)
    }
}

fn scene_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Scene subdirectories of a period directory, sorted by name.
pub fn scene_dirs(period_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(period_dir)
        .map_err(|_| missing_dir(period_dir))?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    if dirs.is_empty() {
        return Err(Error::EmptyDataset(format!(
            "no scene directories in {}",
            period_dir.display()
        )));
    }
    Ok(dirs)
}

/// Per-pixel counts from masking one scene.
///
/// The cloud, shadow and cirrus counts are independent: a pixel with several
/// flags set is counted under each of them, but only once in `masked`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaskReport {
    pub scene: String,
    pub pixels: u64,
    pub cloud: u64,
    pub cloud_shadow: u64,
    pub cirrus: u64,
    pub footprint: u64,
    pub masked: u64,
}

impl MaskReport {
    /// Pixels that kept their values
    pub fn valid(&self) -> u64 {
        self.pixels - self.masked
    }

    fn add(&mut self, other: &MaskReport) {
        self.pixels += other.pixels;
        self.cloud += other.cloud;
        self.cloud_shadow += other.cloud_shadow;
        self.cirrus += other.cirrus;
        self.footprint += other.footprint;
        self.masked += other.masked;
    }
}

/// Parameters for [`CloudMasker`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudMaskParams {
    pub qa: QaBitLayout,
    pub sensor: SensorLayout,
}

/// Applies quality-band and footprint masks to scenes.
#[derive(Debug, Clone, Default)]
pub struct CloudMasker {
    params: CloudMaskParams,
}

impl CloudMasker {
    pub fn new(params: CloudMaskParams) -> Result<Self> {
        params.qa.validate()?;
        if params.sensor.band_keywords.len() != 4 {
            return Err(Error::InvalidParameter {
                name: "sensor.band_keywords",
                value: format!("{:?}", params.sensor.band_keywords),
                reason: "exactly four reflectance bands are supported".into(),
            });
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &CloudMaskParams {
        &self.params
    }

    /// Mask one (bands, rows, cols) block in place using its quality block.
    pub fn mask_block(&self, mut bands: ArrayViewMut3<'_, f32>, qa: ArrayView2<'_, u16>) -> MaskReport {
        let layout = &self.params.qa;
        let mut report = MaskReport::default();

        for ((row, col), &q) in qa.indexed_iter() {
            report.pixels += 1;
            let mut pixel = bands.slice_mut(ndarray::s![.., row, col]);

            let cloud = layout.is_cloud(q);
            let shadow = layout.is_cloud_shadow(q);
            let cirrus = layout.is_cirrus(q);
            let outside = pixel.iter().all(|&v| v == 0.0);

            report.cloud += cloud as u64;
            report.cloud_shadow += shadow as u64;
            report.cirrus += cirrus as u64;
            report.footprint += outside as u64;

            if cloud || shadow || cirrus || outside {
                report.masked += 1;
                pixel.fill(f32::NAN);
            }
        }

        report
    }

    /// Mask one scene and write the stacked result to `output`.
    pub fn mask_scene(&self, files: &SceneFiles, output: &Path) -> Result<MaskReport> {
        let mut bands = files
            .bands
            .iter()
            .map(GeoTiffReader::open)
            .collect::<Result<Vec<_>>>()?;
        let mut qa = GeoTiffReader::open(&files.qa)?;

        let geometry = bands[0].geometry().clone();
        let context = format!("scene {}", files.name());
        geometry.ensure_all_aligned(bands.iter().skip(1).map(|r| r.geometry()), &context)?;
        geometry.ensure_aligned(qa.geometry(), &context)?;

        let windows: Vec<_> = bands[0].block_windows().collect();
        let (block_rows, _) = bands[0].block_shape();
        debug!(scene = %files.name(), blocks = windows.len(), "masking scene");

        let mut report = MaskReport {
            scene: files.name(),
            ..Default::default()
        };

        let mut out = OutputFile::create(output)?;
        {
            let mut encoder = TiffEncoder::new(out.file_mut())?;
            let mut sink =
                StripSink::<_, Float32x4>::new(&mut encoder, &geometry, Some(f64::NAN), block_rows)?;

            for window in &windows {
                let mut block = Array3::<f32>::zeros((bands.len(), window.rows, window.cols));
                for (b, reader) in bands.iter_mut().enumerate() {
                    let band = reader.read_band_window::<f32>(0, window)?;
                    block.index_axis_mut(Axis(0), b).assign(&band);
                }
                let qa_block = qa.read_band_window::<u16>(0, window)?;

                let counts = self.mask_block(block.view_mut(), qa_block.view());
                report.add(&counts);

                sink.write_window(window, block.view())?;
            }
            sink.finish()?;
        }
        out.commit()?;

        info!(
            scene = %report.scene,
            masked = report.masked,
            valid = report.valid(),
            "scene masked"
        );
        Ok(report)
    }

    /// Mask every scene of a period into `output_dir/<scene>_masked.tif`.
    ///
    /// All scenes are resolved before any is processed, so a missing band
    /// fails the period without writing anything.
    pub fn mask_period(&self, period_dir: &Path, output_dir: &Path) -> Result<Vec<(PathBuf, MaskReport)>> {
        let scenes = scene_dirs(period_dir)?
            .iter()
            .map(|dir| SceneFiles::discover(dir, &self.params.sensor))
            .collect::<Result<Vec<_>>>()?;

        info!(period = %period_dir.display(), scenes = scenes.len(), "masking period");

        scenes
            .iter()
            .map(|files| {
                let output = output_dir.join(format!("{}_masked.tif", files.name()));
                self.mask_scene(files, &output).map(|r| (output, r))
            })
            .collect()
    }
}

/// Result of checking one scene directory for its required files.
#[derive(Debug, Clone)]
pub struct SceneValidation {
    pub scene: String,
    pub dir: PathBuf,
    /// (keyword, matching file) for every band and the quality band
    pub files: Vec<(String, Option<PathBuf>)>,
    pub crs: Option<CRS>,
    /// Pixel size (x, y) of the first band found
    pub resolution: Option<(f64, f64)>,
}

impl SceneValidation {
    pub fn is_complete(&self) -> bool {
        self.files.iter().all(|(_, f)| f.is_some())
    }

    /// Keywords with no matching file
    pub fn missing(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|(_, f)| f.is_none())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn ensure_complete(&self) -> Result<()> {
        match self.missing().first() {
            Some(keyword) => Err(Error::missing_in_dir(format!("band {}", keyword), &self.dir)),
            None => Ok(()),
        }
    }
}

/// Inspect a scene directory without reading pixel data.
pub fn validate_scene(dir: &Path, layout: &SensorLayout) -> Result<SceneValidation> {
    let files = list_tiffs(dir)?;
    let found: Vec<(String, Option<PathBuf>)> = layout
        .keywords()
        .map(|k| (k.to_string(), find_by_keyword(&files, k)))
        .collect();

    let (crs, resolution) = match found.iter().find_map(|(_, f)| f.as_ref()) {
        Some(path) => {
            let reader = GeoTiffReader::open(path)?;
            let gt = reader.geometry().transform;
            (
                reader.geometry().crs.clone(),
                Some((gt.pixel_width.abs(), gt.pixel_height.abs())),
            )
        }
        None => (None, None),
    };

    Ok(SceneValidation {
        scene: scene_name(dir),
        dir: dir.to_path_buf(),
        files: found,
        crs,
        resolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn qa_bits() {
        let layout = QaBitLayout::default();
        assert!(layout.is_cirrus(1 << 2));
        assert!(layout.is_cloud(1 << 3));
        assert!(layout.is_cloud_shadow(1 << 4));
        assert!(!layout.is_contaminated(0b0000_0011));
        assert!(!layout.is_contaminated(1 << 6));
        // Landsat C2 clear-land value
        assert!(!layout.is_contaminated(21824));
        // Landsat C2 high-confidence cloud
        assert!(layout.is_contaminated(22280));
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let files = vec![
            PathBuf::from("/s/lc08_sr_b2.tif"),
            PathBuf::from("/s/LC08_QA_PIXEL.TIF"),
        ];
        assert_eq!(find_by_keyword(&files, "B2"), Some(files[0].clone()));
        assert_eq!(find_by_keyword(&files, "qa_pixel"), Some(files[1].clone()));
        assert_eq!(find_by_keyword(&files, "B5"), None);
    }

    #[test]
    fn mask_block_flags_and_footprint() {
        let masker = CloudMasker::default();
        let mut block = Array3::<f32>::from_elem((4, 2, 2), 100.0);
        block.slice_mut(ndarray::s![.., 1, 1]).fill(0.0);
        let qa: Array2<u16> = array![[0, 1 << 3], [(1 << 4) | (1 << 2), 0]];

        let report = masker.mask_block(block.view_mut(), qa.view());

        assert_eq!(report.pixels, 4);
        assert_eq!(report.cloud, 1);
        assert_eq!(report.cloud_shadow, 1);
        assert_eq!(report.cirrus, 1);
        assert_eq!(report.footprint, 1);
        assert_eq!(report.masked, 3);
        assert_eq!(report.valid(), 1);

        assert!(block.slice(ndarray::s![.., 0, 0]).iter().all(|&v| v == 100.0));
        for (r, c) in [(0, 1), (1, 0), (1, 1)] {
            assert!(block.slice(ndarray::s![.., r, c]).iter().all(|v| v.is_nan()));
        }
    }

    #[test]
    fn partial_zero_is_not_footprint() {
        let masker = CloudMasker::default();
        let mut block = Array3::<f32>::zeros((4, 1, 1));
        block[[3, 0, 0]] = 12.0;
        let qa = Array2::<u16>::zeros((1, 1));
        let report = masker.mask_block(block.view_mut(), qa.view());
        assert_eq!(report.masked, 0);
    }

    #[test]
    fn missing_band_lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["X_SR_B2.TIF", "X_SR_B3.TIF", "X_SR_B5.TIF", "X_QA_PIXEL.TIF"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let err = SceneFiles::discover(dir.path(), &SensorLayout::default()).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::MissingInput { .. }));
        assert!(msg.contains("band B4"), "{}", msg);
        assert!(msg.contains("X_SR_B2.TIF"), "{}", msg);
    }

    #[test]
    fn empty_period_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(scene_dirs(dir.path()), Err(Error::EmptyDataset(_))));
    }

    #[test]
    fn rejects_wrong_band_count() {
        let params = CloudMaskParams {
            sensor: SensorLayout {
                band_keywords: vec!["B4".into(), "B5".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(CloudMasker::new(params).is_err());
    }
}
