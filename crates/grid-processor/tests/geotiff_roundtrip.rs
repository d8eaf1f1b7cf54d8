//! GeoTIFF read/write through the conserver.

use grid_processor::{
    conserve_file, conserve_file_to_grid, read_grid, read_int_grid, write_grid, write_int_grid,
    ConserveConfig, GridProcessorError, RasterConserver,
};
use tempfile::TempDir;
use test_utils::{
    assert_approx_eq, create_index_grid, create_population_counts, filenames, mask_columns,
    population_grid, require_test_file, WORLDPOP_NODATA, WORLDPOP_PIXEL_SIZE,
};
use worldpop_common::{GeoTransform, IntDataType, IntGrid, Projection};

#[test]
fn test_float_grid_preserves_values_and_georeferencing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nga_f_0_2020.tif");

    let input = population_grid(create_index_grid(30, 20), 30, 20);
    write_grid(&path, &input).unwrap();
    let read = read_grid(&path).unwrap();

    assert_eq!((read.width, read.height), (30, 20));
    assert_eq!(read.data, input.data);
    assert_eq!(read.nodata, Some(WORLDPOP_NODATA));
    assert_eq!(read.projection.epsg(), Some(4326));
    assert_approx_eq!(read.transform.origin_x, 3.0, 1e-12);
    assert_approx_eq!(read.transform.origin_y, 14.0, 1e-12);
    assert_approx_eq!(read.transform.pixel_width, WORLDPOP_PIXEL_SIZE, 1e-15);
    assert_approx_eq!(read.transform.pixel_height, -WORLDPOP_PIXEL_SIZE, 1e-15);
}

#[test]
fn test_int_grid_written_as_int16_and_int32() {
    let dir = TempDir::new().unwrap();

    for data_type in [IntDataType::Int16, IntDataType::Int32] {
        let path = dir.path().join(format!("out_{}.tif", data_type));
        let grid = IntGrid {
            data: vec![0, 17, -9999, 32000],
            width: 2,
            height: 2,
            transform: GeoTransform::north_up(-1.0, 2.0, 0.5, -0.5),
            nodata: -9999,
            data_type,
            projection: Projection::wgs84(),
        };
        write_int_grid(&path, &grid).unwrap();

        let read = read_grid(&path).unwrap();
        assert_eq!(read.data, vec![0.0, 17.0, -9999.0, 32000.0]);
        assert_eq!(read.nodata, Some(-9999.0));
        assert_eq!(read.valid_count(), 3);
    }
}

#[test]
fn test_int16_rejects_wide_values() {
    let dir = TempDir::new().unwrap();
    let grid = IntGrid {
        data: vec![40_000],
        width: 1,
        height: 1,
        transform: GeoTransform::default(),
        nodata: -9999,
        data_type: IntDataType::Int16,
        projection: Projection::default(),
    };
    assert!(write_int_grid(dir.path().join("wide.tif"), &grid).is_err());
}

#[test]
fn test_rotated_transform_survives() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rotated.tif");

    let mut input = population_grid(vec![1.0; 6], 3, 2);
    input.transform = GeoTransform::from_gdal([10.0, 0.5, 0.1, 20.0, 0.05, -0.5]);
    write_grid(&path, &input).unwrap();

    let read = read_grid(&path).unwrap();
    let expected = input.transform.to_gdal();
    for (got, want) in read.transform.to_gdal().iter().zip(expected.iter()) {
        assert_approx_eq!(*got, *want, 1e-12);
    }
}

#[test]
fn test_conserve_file_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(filenames::KEN_F_15_2015);

    let mut data = create_population_counts(50, 40, 3.0, 5);
    mask_columns(&mut data, 50, 10, 2, WORLDPOP_NODATA as f32);
    let input = population_grid(data, 50, 40);
    let expected_total = input.valid_sum().round() as i64;
    write_grid(&path, &input).unwrap();

    let conserver = RasterConserver::new(ConserveConfig::default()).unwrap();
    let report = conserve_file(&path, &path, &conserver).unwrap();
    assert_eq!(report.output_sum, expected_total);
    assert_eq!(report.output_size, (5, 4));

    let output = read_grid(&path).unwrap();
    assert_eq!((output.width, output.height), (5, 4));
    assert_eq!(output.nodata, Some(-9999.0));
    assert_eq!(output.valid_sum().round() as i64, expected_total);
    assert_eq!(output.projection.epsg(), Some(4326));
    assert_approx_eq!(output.transform.pixel_width, WORLDPOP_PIXEL_SIZE * 10.0, 1e-12);

    // No staging file is left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn test_conserve_file_failure_keeps_input() {
    let dir = TempDir::new().unwrap();
    let input_path = dir.path().join("tiny.tif");
    let output_path = dir.path().join("tiny_1km.tif");

    write_grid(&input_path, &population_grid(vec![1.0; 25], 5, 5)).unwrap();

    let conserver = RasterConserver::new(ConserveConfig::default()).unwrap();
    assert!(conserve_file(&input_path, &output_path, &conserver).is_err());
    assert!(input_path.exists());
    assert!(!output_path.exists());
}

#[test]
fn test_int_grid_reads_back_with_its_type() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nga_m_80_2020.tif");

    let grid = IntGrid {
        data: vec![5, -9999, 70_000, 0, 3, 1],
        width: 3,
        height: 2,
        transform: GeoTransform::north_up(3.0, 14.0, 0.0083333333, -0.0083333333),
        nodata: -9999,
        data_type: IntDataType::Int32,
        projection: Projection::wgs84(),
    };
    write_int_grid(&path, &grid).unwrap();

    let read = read_int_grid(&path).unwrap();
    assert_eq!(read.data, grid.data);
    assert_eq!(read.data_type, IntDataType::Int32);
    assert_eq!(read.nodata, -9999);
    assert_eq!(read.valid_sum(), 70_009);
    assert_eq!(read.projection.epsg(), Some(4326));

    // Float rasters are not conserved outputs
    let float_path = dir.path().join("float.tif");
    write_grid(&float_path, &population_grid(vec![1.5; 4], 2, 2)).unwrap();
    assert!(matches!(
        read_int_grid(&float_path),
        Err(GridProcessorError::GeoTiff(_))
    ));
}

#[test]
fn test_conserve_file_to_grid_matches_written_file() {
    let dir = TempDir::new().unwrap();
    let input_path = dir.path().join("ken_f_0_2015.tif");
    let output_path = dir.path().join("ken_f_0_2015_1km.tif");

    let input = population_grid(create_population_counts(30, 20, 2.0, 9), 30, 20);
    write_grid(&input_path, &input).unwrap();

    let conserver = RasterConserver::new(ConserveConfig::default()).unwrap();
    let conserved = conserve_file_to_grid(&input_path, &output_path, &conserver).unwrap();

    let written = read_int_grid(&output_path).unwrap();
    assert_eq!(written.data, conserved.grid.data);
    assert_eq!(written.data_type, IntDataType::Int16);
    assert_eq!(written.valid_sum(), conserved.report.output_sum);
}

#[test]
fn test_real_worldpop_raster() {
    let source = require_test_file!(filenames::NGA_F_0_2020);
    let dir = TempDir::new().unwrap();
    let output = dir.path().join(filenames::NGA_F_0_2020);

    let input = read_grid(&source).unwrap();
    let expected_total = input.valid_sum().round() as i64;

    let conserver = RasterConserver::new(ConserveConfig {
        output_type: IntDataType::Int32,
        ..Default::default()
    })
    .unwrap();
    let report = conserve_file(&source, &output, &conserver).unwrap();

    assert_eq!(report.output_sum, expected_total);
    assert_eq!(read_int_grid(&output).unwrap().valid_sum(), expected_total);
}
