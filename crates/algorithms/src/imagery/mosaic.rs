//! First-valid-wins mosaicking of masked scenes
//!
//! Scenes are placed on the union of their extents. Each output pixel takes
//! all of its bands from the first scene, in priority order, that is valid
//! there; later scenes never overwrite a claimed pixel. Scenes must share
//! CRS, band count, pixel size and grid phase so that no resampling is
//! needed.

use std::path::{Path, PathBuf};

use ndarray::{s, Array2, Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use covershift_core::io::{
    ColorType, Float32x4, GeoTiffReader, Gray32Float, OutputFile, StripSink, TiffEncoder,
};
use covershift_core::raster::{BlockWindows, GeoTransform, GridGeometry, Window};
use covershift_core::{Error, Result};

/// Tolerance, in pixels, for grid alignment between scenes
const PHASE_TOLERANCE: f64 = 1e-6;

/// Order in which overlapping scenes claim pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenePriority {
    /// The order scenes are given in
    #[default]
    InputOrder,
    /// Scenes with fewer invalid pixels first; ties keep input order
    FewestMasked,
}

/// Parameters for [`SceneMosaicker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MosaicParams {
    pub priority: ScenePriority,
    /// Output strip height
    pub block_rows: usize,
}

impl Default for MosaicParams {
    fn default() -> Self {
        Self {
            priority: ScenePriority::InputOrder,
            block_rows: 256,
        }
    }
}

/// Summary of a mosaic run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MosaicReport {
    pub rows: usize,
    pub cols: usize,
    pub bands: usize,
    /// Scenes in the order they claimed pixels
    pub scene_order: Vec<PathBuf>,
    /// Pixels taken from each scene, aligned with `scene_order`
    pub filled: Vec<u64>,
    /// Output pixels no scene could fill
    pub empty: u64,
}

/// A scene placed on the output grid.
struct PlacedScene {
    reader: GeoTiffReader,
    /// Extent in output pixel coordinates
    extent: Window,
    nodata: Option<f32>,
}

impl PlacedScene {
    fn is_valid(&self, block: &ArrayView3<'_, f32>, row: usize, col: usize) -> bool {
        block
            .slice(s![.., row, col])
            .iter()
            .all(|&v| !v.is_nan() && self.nodata.map_or(true, |nd| v != nd))
    }
}

/// Merges masked scenes into one raster.
#[derive(Debug, Clone, Default)]
pub struct SceneMosaicker {
    params: MosaicParams,
}

impl SceneMosaicker {
    pub fn new(params: MosaicParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MosaicParams {
        &self.params
    }

    /// Mosaic `scenes` into `output`.
    pub fn mosaic(&self, scenes: &[PathBuf], output: &Path) -> Result<MosaicReport> {
        if scenes.is_empty() {
            return Err(Error::EmptyDataset("no scenes to mosaic".into()));
        }

        let readers = scenes
            .iter()
            .map(GeoTiffReader::open)
            .collect::<Result<Vec<_>>>()?;
        let (geometry, mut placed) = place_scenes(readers)?;
        let bands = placed[0].reader.bands();

        let order = self.priority_order(&mut placed)?;
        let mut ordered: Vec<PlacedScene> = Vec::with_capacity(placed.len());
        let mut slots: Vec<Option<PlacedScene>> = placed.into_iter().map(Some).collect();
        for &i in &order {
            if let Some(scene) = slots[i].take() {
                ordered.push(scene);
            }
        }

        info!(
            scenes = ordered.len(),
            rows = geometry.rows,
            cols = geometry.cols,
            bands,
            priority = ?self.params.priority,
            "mosaicking"
        );

        let filled = match bands {
            1 => self.merge::<Gray32Float>(&geometry, &mut ordered, output)?,
            4 => self.merge::<Float32x4>(&geometry, &mut ordered, output)?,
            n => {
                return Err(Error::UnsupportedDataType(format!(
                    "mosaic of {}-band scenes (1 or 4 supported)",
                    n
                )))
            }
        };

        let total = (geometry.rows * geometry.cols) as u64;
        let report = MosaicReport {
            rows: geometry.rows,
            cols: geometry.cols,
            bands,
            scene_order: ordered.iter().map(|p| p.reader.path().to_path_buf()).collect(),
            empty: total - filled.iter().sum::<u64>(),
            filled,
        };
        info!(empty = report.empty, "mosaic written to {}", output.display());
        Ok(report)
    }

    /// Indices of `placed` in claiming order.
    fn priority_order(&self, placed: &mut [PlacedScene]) -> Result<Vec<usize>> {
        let mut order: Vec<usize> = (0..placed.len()).collect();
        if self.params.priority == ScenePriority::FewestMasked {
            let invalid = placed
                .iter_mut()
                .map(|p| count_invalid(p, self.params.block_rows))
                .collect::<Result<Vec<u64>>>()?;
            debug!(?invalid, "invalid pixels per scene");
            // stable: ties keep input order
            order.sort_by_key(|&i| invalid[i]);
        }
        Ok(order)
    }

    fn merge<C>(
        &self,
        geometry: &GridGeometry,
        scenes: &mut [PlacedScene],
        output: &Path,
    ) -> Result<Vec<u64>>
    where
        C: ColorType<Inner = f32>,
    {
        let bands = scenes[0].reader.bands();
        let mut filled = vec![0u64; scenes.len()];
        let block_rows = self.params.block_rows.max(1);

        let mut out = OutputFile::create(output)?;
        {
            let mut encoder = TiffEncoder::new(out.file_mut())?;
            let mut sink = StripSink::<_, C>::new(&mut encoder, geometry, Some(f64::NAN), block_rows)?;

            for strip in BlockWindows::new(geometry.rows, geometry.cols, block_rows, geometry.cols) {
                let mut block = Array3::<f32>::from_elem((bands, strip.rows, strip.cols), f32::NAN);
                let mut claimed = Array2::<bool>::from_elem((strip.rows, strip.cols), false);
                let mut unclaimed = strip.len();

                for (i, scene) in scenes.iter_mut().enumerate() {
                    if unclaimed == 0 {
                        break;
                    }
                    let overlap = match scene.extent.intersection(&strip) {
                        Some(o) => o,
                        None => continue,
                    };
                    let local = Window::new(
                        overlap.row_off - scene.extent.row_off,
                        overlap.col_off - scene.extent.col_off,
                        overlap.rows,
                        overlap.cols,
                    );
                    let data = scene.reader.read_window::<f32>(&local)?;
                    let view = data.view();

                    for r in 0..overlap.rows {
                        let out_r = overlap.row_off - strip.row_off + r;
                        for c in 0..overlap.cols {
                            let out_c = overlap.col_off - strip.col_off + c;
                            if claimed[[out_r, out_c]] || !scene.is_valid(&view, r, c) {
                                continue;
                            }
                            block
                                .slice_mut(s![.., out_r, out_c])
                                .assign(&view.slice(s![.., r, c]));
                            claimed[[out_r, out_c]] = true;
                            unclaimed -= 1;
                            filled[i] += 1;
                        }
                    }
                }

                sink.write_window(&strip, block.view())?;
            }
            sink.finish()?;
        }
        out.commit()?;
        Ok(filled)
    }
}

/// Check that scenes can be merged without resampling and compute the union grid.
fn place_scenes(readers: Vec<GeoTiffReader>) -> Result<(GridGeometry, Vec<PlacedScene>)> {
    let first = readers[0].geometry().clone();
    let gt0 = first.transform;
    if !gt0.is_north_up() {
        return Err(Error::geometry(
            "mosaic",
            format!("{} is not north-up", readers[0].path().display()),
        ));
    }
    let (pw, ph) = (gt0.pixel_width, gt0.pixel_height);
    let bands = readers[0].bands();

    let mut min_x = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;

    for reader in &readers {
        let g = reader.geometry();
        let name = reader.path().display();
        let gt = g.transform;

        if reader.bands() != bands {
            return Err(Error::geometry(
                "mosaic",
                format!("{} has {} bands, expected {}", name, reader.bands(), bands),
            ));
        }
        match (&first.crs, &g.crs) {
            (None, None) => {}
            (Some(a), Some(b)) if a.is_equivalent(b) => {}
            (a, b) => {
                return Err(Error::geometry(
                    "mosaic",
                    format!("{}: CRS {:?} vs {:?}", name, b, a),
                ))
            }
        }
        if !gt.is_north_up() {
            return Err(Error::geometry("mosaic", format!("{} is not north-up", name)));
        }
        if ((gt.pixel_width - pw) / pw).abs() > PHASE_TOLERANCE
            || ((gt.pixel_height - ph) / ph).abs() > PHASE_TOLERANCE
        {
            return Err(Error::geometry(
                "mosaic",
                format!(
                    "{} pixel size {}x{} vs {}x{}",
                    name, gt.pixel_width, gt.pixel_height, pw, ph
                ),
            ));
        }
        let dx = (gt.origin_x - gt0.origin_x) / pw;
        let dy = (gt.origin_y - gt0.origin_y) / ph;
        if (dx - dx.round()).abs() > PHASE_TOLERANCE || (dy - dy.round()).abs() > PHASE_TOLERANCE {
            return Err(Error::geometry(
                "mosaic",
                format!("{} is not aligned to the grid of the first scene", name),
            ));
        }

        let (x0, y0, x1, y1) = gt.bounds(g.cols, g.rows);
        min_x = min_x.min(x0);
        min_y = min_y.min(y0);
        max_x = max_x.max(x1);
        max_y = max_y.max(y1);
    }

    let cols = ((max_x - min_x) / pw).round() as usize;
    let rows = ((max_y - min_y) / -ph).round() as usize;
    let transform = GeoTransform::new(min_x, max_y, pw, ph);
    let geometry = GridGeometry::new(rows, cols, transform, first.crs.clone());

    let placed = readers
        .into_iter()
        .map(|reader| {
            let g = reader.geometry();
            let col_off = ((g.transform.origin_x - min_x) / pw).round() as usize;
            let row_off = ((g.transform.origin_y - max_y) / ph).round() as usize;
            let extent = Window::new(row_off, col_off, g.rows, g.cols);
            let nodata = reader.nodata().map(|v| v as f32);
            PlacedScene {
                reader,
                extent,
                nodata,
            }
        })
        .collect();

    Ok((geometry, placed))
}

/// Pixels of a scene that would not be used by the mosaic.
fn count_invalid(scene: &mut PlacedScene, block_rows: usize) -> Result<u64> {
    let (rows, cols) = (scene.extent.rows, scene.extent.cols);
    let mut invalid = 0u64;
    for window in BlockWindows::new(rows, cols, block_rows, cols) {
        let data = scene.reader.read_window::<f32>(&window)?;
        let view = data.view();
        for r in 0..window.rows {
            for c in 0..window.cols {
                if !scene.is_valid(&view, r, c) {
                    invalid += 1;
                }
            }
        }
    }
    Ok(invalid)
}

/// Masked scene files of a period directory, sorted by file name.
pub fn masked_scenes(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|_| Error::missing_in_dir(dir.display().to_string(), dir.parent().unwrap_or(dir)))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().ends_with("_masked.tif"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(Error::EmptyDataset(format!(
            "no masked scenes in {}",
            dir.display()
        )));
    }
    Ok(files)
}
