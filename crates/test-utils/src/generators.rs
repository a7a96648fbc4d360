//! Test data generators for creating synthetic biomass-like rasters.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite. All grids are `Vec<f32>` in
//! row-major order (row 0 first, then row 1, etc.).

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates an integer-valued biomass grid for a given year.
///
/// Values stay within 50..250 so they survive an int16 round trip, and
/// differ between consecutive years by a known amount:
/// `biomass(year + 1) - biomass(year) == 3` wherever neither wraps.
///
/// ```
/// use test_utils::create_biomass_grid;
///
/// let a = create_biomass_grid(4, 4, 1990);
/// let b = create_biomass_grid(4, 4, 1991);
/// assert_eq!(a.len(), 16);
/// assert!(a.iter().all(|&v| (50.0..250.0).contains(&v)));
/// assert_ne!(a, b);
/// ```
pub fn create_biomass_grid(width: usize, height: usize, year: u16) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let v = (col * 7 + row * 13 + year as usize * 3) % 200;
            data.push(50.0 + v as f32);
        }
    }
    data
}

/// Overwrites a rectangular block with `nodata`.
///
/// The block is clipped to the grid.
pub fn invalidate_block(
    data: &mut [f32],
    width: usize,
    col: usize,
    row: usize,
    block_width: usize,
    block_height: usize,
    nodata: f32,
) {
    let height = data.len() / width.max(1);
    for r in row..(row + block_height).min(height) {
        for c in col..(col + block_width).min(width) {
            data[r * width + c] = nodata;
        }
    }
}

/// Creates an ownership grid of vertical bands, one band per code.
///
/// Column `c` gets `codes[c * codes.len() / width]`.
pub fn create_ownership_grid(width: usize, height: usize, codes: &[i32]) -> Vec<f32> {
    assert!(!codes.is_empty(), "at least one ownership code required");
    let mut data = Vec::with_capacity(width * height);
    for _row in 0..height {
        for col in 0..width {
            data.push(codes[col * codes.len() / width] as f32);
        }
    }
    data
}

/// Creates a county grid of horizontal bands, one band per code.
///
/// Row `r` gets `codes[r * codes.len() / height]`.
pub fn create_county_grid(width: usize, height: usize, codes: &[i32]) -> Vec<f32> {
    assert!(!codes.is_empty(), "at least one county code required");
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        let code = codes[row * codes.len() / height] as f32;
        data.extend(std::iter::repeat(code).take(width));
    }
    data
}

/// Creates a 0/1 canopy mask with every `nth` cell (in scan order) unset.
pub fn create_canopy_mask(width: usize, height: usize, nth: usize) -> Vec<f32> {
    (0..width * height)
        .map(|i| if nth > 0 && i % nth == nth - 1 { 0.0 } else { 1.0 })
        .collect()
}
