//! Cloud masking and mosaicking on synthetic scenes.

mod common;

use common::*;
use ndarray::{Array2, Array3};

use covershift_algorithms::imagery::{
    masked_scenes, validate_scene, CloudMaskParams, CloudMasker, MosaicParams, SceneMosaicker,
    ScenePriority, SensorLayout,
};
use covershift_core::io::GeoTiffReader;
use covershift_core::{Error, Window};

const CLOUD: u16 = 1 << 3;
const SHADOW: u16 = 1 << 4;
const CIRRUS: u16 = 1 << 2;

fn bands(rows: usize, cols: usize) -> [Array2<u16>; 4] {
    [100u16, 200, 300, 400].map(|v| Array2::from_elem((rows, cols), v))
}

#[test]
fn period_masking_writes_one_stack_per_scene() {
    let dir = tempfile::tempdir().unwrap();
    let period = dir.path().join("2018");
    let out = dir.path().join("cloud_masked");
    let geometry = utm_geometry(6, 5);

    let mut qa = Array2::<u16>::from_elem((6, 5), 0);
    qa[[0, 0]] = CLOUD;
    qa[[1, 1]] = SHADOW;
    qa[[2, 2]] = CIRRUS | CLOUD;
    let mut b = bands(6, 5);
    for band in b.iter_mut() {
        band[[5, 4]] = 0;
    }
    write_scene(&period, "LC08_A", b, qa.clone(), &geometry);
    write_scene(&period, "LC08_B", bands(6, 5), Array2::zeros((6, 5)), &geometry);

    let masker = CloudMasker::new(CloudMaskParams::default()).unwrap();
    let results = masker.mask_period(&period, &out).unwrap();
    assert_eq!(results.len(), 2);

    let (path, report) = &results[0];
    assert!(path.ends_with("LC08_A_masked.tif"));
    assert_eq!(report.pixels, 30);
    assert_eq!(report.cloud, 2);
    assert_eq!(report.cirrus, 1);
    assert_eq!(report.footprint, 1);
    assert_eq!(report.masked, 4);
    assert_eq!(results[1].1.masked, 0);

    let mut reader = GeoTiffReader::open(path).unwrap();
    assert_eq!(reader.bands(), 4);
    assert_eq!(reader.geometry(), &geometry);
    let stack = reader.read_window::<f32>(&Window::full(6, 5)).unwrap();
    for b in 0..4 {
        assert!(stack[[b, 0, 0]].is_nan());
        assert!(stack[[b, 1, 1]].is_nan());
        assert!(stack[[b, 5, 4]].is_nan());
    }
    assert_eq!(stack[[3, 3, 3]], 400.0);

    assert_eq!(masked_scenes(&out).unwrap().len(), 2);
}

#[test]
fn missing_band_lists_the_scene_directory() {
    let dir = tempfile::tempdir().unwrap();
    let period = dir.path().join("2023");
    let scene = write_scene(&period, "LC09_X", bands(3, 3), Array2::zeros((3, 3)), &utm_geometry(3, 3));
    std::fs::remove_file(scene.join("LC09_X_SR_B4.TIF")).unwrap();

    let masker = CloudMasker::new(CloudMaskParams::default()).unwrap();
    let err = masker
        .mask_period(&period, &dir.path().join("out"))
        .unwrap_err();
    match &err {
        Error::MissingInput {
            item,
            location,
            available,
        } => {
            assert_eq!(item, "band B4");
            assert_eq!(location, &scene);
            assert!(available.contains(&"LC09_X_SR_B5.TIF".to_string()));
        }
        other => panic!("unexpected error: {}", other),
    }
    let message = err.to_string();
    assert!(message.contains("LC09_X_QA_PIXEL.TIF"));
    assert!(!dir.path().join("out").join("LC09_X_masked.tif").exists());

    let validation = validate_scene(&scene, &SensorLayout::default()).unwrap();
    assert!(!validation.is_complete());
    assert_eq!(validation.missing(), vec!["B4"]);
}

#[test]
fn empty_period_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let masker = CloudMasker::new(CloudMaskParams::default()).unwrap();
    assert!(matches!(
        masker.mask_period(dir.path(), &dir.path().join("out")),
        Err(Error::EmptyDataset(_))
    ));
}

fn two_overlapping_scenes(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut a = Array3::from_elem((4, 4, 4), 1.0f32);
    for b in 0..4 {
        a[[b, 1, 1]] = f32::NAN;
        a[[b, 3, 3]] = f32::NAN;
    }
    let b = Array3::from_elem((4, 4, 4), 2.0f32);

    let pa = dir.join("a_masked.tif");
    let pb = dir.join("b_masked.tif");
    write_stack(&pa, &a, &utm_geometry(4, 4), 2);
    write_stack(&pb, &b, &shifted_geometry(4, 4, 2, 2), 3);
    vec![pa, pb]
}

#[test]
fn overlap_keeps_first_valid_scene() {
    let dir = tempfile::tempdir().unwrap();
    let scenes = two_overlapping_scenes(dir.path());
    let output = dir.path().join("mosaic.tif");

    let report = SceneMosaicker::new(MosaicParams {
        block_rows: 4,
        ..Default::default()
    })
    .mosaic(&scenes, &output)
    .unwrap();

    assert_eq!((report.rows, report.cols, report.bands), (6, 6, 4));
    assert_eq!(report.filled, vec![14, 13]);
    assert_eq!(report.empty, 9);

    let mut reader = GeoTiffReader::open(&output).unwrap();
    assert_eq!(reader.geometry(), &utm_geometry(6, 6));
    let m = reader.read_window::<f32>(&Window::full(6, 6)).unwrap();
    assert_eq!(m[[0, 2, 2]], 1.0);
    assert_eq!(m[[2, 2, 3]], 1.0);
    // invalid in the first scene, covered by the second
    assert_eq!(m[[1, 3, 3]], 2.0);
    assert!(m[[0, 1, 1]].is_nan());
    assert_eq!(m[[3, 5, 5]], 2.0);
    assert!(m[[0, 0, 5]].is_nan());
}

#[test]
fn fewest_masked_scene_claims_first() {
    let dir = tempfile::tempdir().unwrap();
    let scenes = two_overlapping_scenes(dir.path());
    let output = dir.path().join("mosaic.tif");

    let report = SceneMosaicker::new(MosaicParams {
        priority: ScenePriority::FewestMasked,
        block_rows: 256,
    })
    .mosaic(&scenes, &output)
    .unwrap();

    assert_eq!(report.scene_order, vec![scenes[1].clone(), scenes[0].clone()]);
    let mut reader = GeoTiffReader::open(&output).unwrap();
    let m = reader.read_window::<f32>(&Window::full(6, 6)).unwrap();
    assert_eq!(m[[0, 2, 2]], 2.0);
    assert_eq!(m[[0, 0, 0]], 1.0);
}

#[test]
fn misaligned_scenes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let a = Array3::from_elem((4, 3, 3), 1.0f32);
    let pa = dir.path().join("a.tif");
    let pb = dir.path().join("b.tif");
    write_stack(&pa, &a, &utm_geometry(3, 3), 3);

    let mut half = utm_geometry(3, 3);
    half.transform.origin_x += PIXEL / 2.0;
    write_stack(&pb, &a, &half, 3);

    let output = dir.path().join("mosaic.tif");
    assert!(matches!(
        SceneMosaicker::default().mosaic(&[pa, pb], &output),
        Err(Error::GeometryMismatch { .. })
    ));
    assert!(!output.exists());
}
