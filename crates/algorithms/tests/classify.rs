//! Windowed classification end to end.

mod common;

use std::path::Path;

use common::*;
use ndarray::{array, Array3};

use covershift_algorithms::classification::{
    ClassifyParams, ClassifyReport, FeatureParams, WindowedClassifier,
};
use covershift_algorithms::imagery::normalized_difference_value;
use covershift_core::io::{read_geotiff, GeoTiffReader};
use covershift_core::raster::Raster;
use covershift_core::Error;
use covershift_parallel::{CancelToken, ProcessingMode};

fn run<C: covershift_algorithms::classification::Classifier>(
    classifier: C,
    params: ClassifyParams,
    input: &Path,
    dir: &Path,
    tag: &str,
) -> covershift_core::Result<ClassifyReport> {
    WindowedClassifier::new(classifier, params).classify(
        input,
        &dir.join(format!("lulc_{}.tif", tag)),
        &dir.join(format!("confidence_{}.tif", tag)),
    )
}

fn no_outputs(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .all(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            !name.starts_with("lulc_") && !name.starts_with("confidence_") && !name.ends_with(".partial")
        })
}

#[test]
fn two_by_two_with_one_nan_pixel() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mosaic.tif");
    let stack: Array3<f32> = array![
        [[0.05, 0.06], [0.04, 0.05]],
        [[0.08, 0.07], [0.06, 0.09]],
        [[0.05, f32::NAN], [0.30, 0.10]],
        [[0.60, 0.40], [0.10, 0.10]],
    ];
    let geometry = utm_geometry(2, 2);
    write_stack(&input, &stack, &geometry, 2);

    let report = run(NdviBuckets, ClassifyParams::default(), &input, dir.path(), "t1").unwrap();
    assert_eq!(report.blocks, 1);
    assert_eq!(report.valid_pixels, 3);

    let classes: Raster<u8> = read_geotiff(&report.classes_path, None).unwrap();
    let confidence: Raster<f32> = read_geotiff(&report.confidence_path, None).unwrap();
    assert_eq!(classes.geometry(), geometry);
    assert_eq!(confidence.geometry(), geometry);
    assert_eq!(classes.nodata(), Some(0));

    assert_eq!(classes.get(0, 1).unwrap(), 0);
    assert_eq!(confidence.get(0, 1).unwrap(), 0.0);

    for (r, c) in [(0, 0), (1, 0), (1, 1)] {
        let ndvi = normalized_difference_value(stack[[3, r, c]], stack[[2, r, c]], 1e-6);
        let expected = NdviBuckets::bucket(ndvi) as u8 + 1;
        assert_eq!(classes.get(r, c).unwrap(), expected, "pixel ({}, {})", r, c);
        assert_eq!(confidence.get(r, c).unwrap(), 0.6);
    }
}

#[test]
fn nan_in_first_band_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mosaic.tif");
    let mut stack = gradient_stack(3, 3);
    stack[[0, 2, 2]] = f32::NAN;
    write_stack(&input, &stack, &utm_geometry(3, 3), 3);

    let report = run(NdviBuckets, ClassifyParams::default(), &input, dir.path(), "x").unwrap();
    let classes: Raster<u8> = read_geotiff(&report.classes_path, None).unwrap();
    assert_eq!(classes.get(2, 2).unwrap(), 0);
    assert_eq!(report.valid_pixels, 8);
}

#[test]
fn all_invalid_blocks_are_written_as_zero() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mosaic.tif");
    let mut stack = gradient_stack(6, 4);
    for b in 0..4 {
        for r in 0..3 {
            for c in 0..4 {
                stack[[b, r, c]] = f32::NAN;
            }
        }
    }
    write_stack(&input, &stack, &utm_geometry(6, 4), 3);

    let report = run(NdviBuckets, ClassifyParams::default(), &input, dir.path(), "x").unwrap();
    assert_eq!(report.blocks, 2);
    assert_eq!(report.empty_blocks, 1);
    let classes: Raster<u8> = read_geotiff(&report.classes_path, None).unwrap();
    assert!(classes.view().rows().into_iter().take(3).flatten().all(|&c| c == 0));
    assert!(classes.view().rows().into_iter().skip(3).flatten().all(|&c| c > 0));
}

#[test]
fn tiled_and_striped_inputs_classify_identically() {
    let dir = tempfile::tempdir().unwrap();
    let geometry = utm_geometry(37, 45);
    let mut stack = gradient_stack(37, 45);
    stack[[1, 20, 30]] = f32::NAN;

    let striped = dir.path().join("striped.tif");
    let tiled = dir.path().join("tiled.tif");
    write_stack(&striped, &stack, &geometry, 7);
    write_tiled_stack(&tiled, &stack, &geometry, 16);

    let reader = GeoTiffReader::open(&tiled).unwrap();
    assert_eq!(reader.block_shape(), (16, 16));
    assert_eq!(reader.geometry(), &geometry);

    let a = run(NdviBuckets, ClassifyParams::default(), &striped, dir.path(), "striped").unwrap();
    let b = run(NdviBuckets, ClassifyParams::default(), &tiled, dir.path(), "tiled").unwrap();
    assert_eq!(a.valid_pixels, b.valid_pixels);
    assert_eq!(a.class_counts, b.class_counts);
    assert_eq!(b.blocks, 9);

    let ca: Raster<u8> = read_geotiff(&a.classes_path, None).unwrap();
    let cb: Raster<u8> = read_geotiff(&b.classes_path, None).unwrap();
    assert_eq!(values(ca.view()), values(cb.view()));
    assert_eq!(cb.geometry(), geometry);

    let pa: Raster<f32> = read_geotiff(&a.confidence_path, None).unwrap();
    let pb: Raster<f32> = read_geotiff(&b.confidence_path, None).unwrap();
    assert_eq!(values(pa.view()), values(pb.view()));
}

#[test]
fn processing_modes_produce_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mosaic.tif");
    write_stack(&input, &gradient_stack(50, 30), &utm_geometry(50, 30), 4);

    let modes = [
        ("seq", ProcessingMode::Sequential, None),
        ("par", ProcessingMode::Parallel, None),
        ("pool", ProcessingMode::ParallelWith(3), Some(2)),
    ];
    let mut outputs = Vec::new();
    for (tag, mode, batch_size) in modes {
        let params = ClassifyParams {
            features: FeatureParams::default(),
            mode,
            batch_size,
        };
        let report = run(NdviBuckets, params, &input, dir.path(), tag).unwrap();
        outputs.push((
            std::fs::read(&report.classes_path).unwrap(),
            std::fs::read(&report.confidence_path).unwrap(),
        ));
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn classifier_failure_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mosaic.tif");
    write_stack(&input, &gradient_stack(40, 10), &utm_geometry(40, 10), 4);

    let params = ClassifyParams {
        batch_size: Some(2),
        ..Default::default()
    };
    // only the last rows exceed the threshold
    let result = run(FailsAbove(0.148), params, &input, dir.path(), "x");
    assert!(matches!(result, Err(Error::Classifier(_))));
    assert!(no_outputs(dir.path()));
}

#[test]
fn cancelled_run_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mosaic.tif");
    write_stack(&input, &gradient_stack(40, 10), &utm_geometry(40, 10), 4);

    let token = CancelToken::new();
    let trigger = token.clone();
    let classifier = WindowedClassifier::new(
        NdviBuckets,
        ClassifyParams {
            batch_size: Some(1),
            ..Default::default()
        },
    )
    .with_cancel(token)
    .with_progress(move |done, _| {
        if done == 1 {
            trigger.cancel();
        }
    });

    let result = classifier.classify(
        &input,
        &dir.path().join("lulc_x.tif"),
        &dir.path().join("confidence_x.tif"),
    );
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(no_outputs(dir.path()));
}

#[test]
fn feature_count_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("single.tif");
    write_u16(&input, ndarray::Array2::from_elem((3, 3), 7), &utm_geometry(3, 3), None);

    let result = run(NdviBuckets, ClassifyParams::default(), &input, dir.path(), "x");
    assert!(result.is_err());
    assert!(no_outputs(dir.path()));
}
