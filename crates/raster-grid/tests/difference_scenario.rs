//! End-to-end: two 4x4 years with overlapping invalid blocks are
//! differenced, persisted and re-read.

use biomass_common::{GeoTransform, GridSpec};
use raster_grid::{
    diff, CellType, FileLayerSource, LayerSource, RasterLayer, RasterWriter, DIFF_NODATA,
};
use test_utils::{create_biomass_grid, grids, invalidate_block, regions};

const NODATA: f32 = -32768.0;

fn year_layer(year: u16, block: (usize, usize)) -> RasterLayer {
    let (min_x, _, _, max_y) = regions::OREGON_4X4;
    let spec = GridSpec::new(4, 4)
        .with_transform(GeoTransform::new(min_x, max_y, 30.0, -30.0))
        .with_crs(grids::CRS)
        .with_nodata(NODATA as f64);
    let mut values = create_biomass_grid(4, 4, year);
    invalidate_block(&mut values, 4, block.0, block.1, 2, 2, NODATA);
    RasterLayer::from_values(spec, values).unwrap()
}

#[test]
fn test_difference_valid_outside_union_of_blocks() {
    // Blocks at (0,0)-(1,1) and (1,1)-(2,2) overlap in cell (1,1).
    let y1990 = year_layer(1990, (0, 0));
    let y1991 = year_layer(1991, (1, 1));

    let change = diff(&y1990, &y1991).unwrap();

    let invalid: Vec<(usize, usize)> = vec![(0, 0), (1, 0), (0, 1), (1, 1), (2, 1), (1, 2), (2, 2)];
    for row in 0..4 {
        for col in 0..4 {
            let i = row * 4 + col;
            if invalid.contains(&(col, row)) {
                assert_eq!(change.get(i), None, "cell ({}, {})", col, row);
                assert_eq!(change.values[i], DIFF_NODATA);
            } else {
                let expected = y1991.values[i] - y1990.values[i];
                assert_eq!(change.get(i), Some(expected as i16), "cell ({}, {})", col, row);
            }
        }
    }
    assert_eq!(change.validity.iter().filter(|&&v| v).count(), 9);
}

#[test]
fn test_difference_persists_as_int16_zarr() {
    let y1990 = year_layer(1990, (0, 0));
    let y1991 = year_layer(1991, (1, 1));
    let change = diff(&y1990, &y1991).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oregon").join("oregon_diff_1990-1991.zarr");
    RasterWriter::default()
        .write(&path, &change.to_layer(), CellType::Int16, Default::default())
        .unwrap();

    let read = FileLayerSource::new().read(&path, Some(&y1990.spec)).unwrap();
    assert_eq!(read.spec.nodata, Some(DIFF_NODATA as f64));
    assert_eq!(read.validity, change.validity);
    for i in 0..16 {
        assert_eq!(read.get(i), change.get(i).map(f32::from));
    }
}
