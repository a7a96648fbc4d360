//! Common test fixtures and constants.

/// Region extents in EPSG:5070 metres, as (min_x, min_y, max_x, max_y).
pub mod regions {
    /// Oregon analysis extent.
    pub const OREGON: (f64, f64, f64, f64) = (-2294730.0, 2301450.0, -1584300.0, 2906130.0);

    /// Washington analysis extent.
    pub const WASHINGTON: (f64, f64, f64, f64) =
        (-2137770.0, 2734170.0, -1545540.0, 3172590.0);

    /// Tiny extent covering a 4x4 grid of 30 m cells at Oregon's corner.
    pub const OREGON_4X4: (f64, f64, f64, f64) = (-2294730.0, 2906010.0, -2294610.0, 2906130.0);

    /// Names used in configuration and file names.
    pub const NAMES: [&str; 2] = ["oregon", "washington"];
}

/// Grid constants shared by the regional rasters.
pub mod grids {
    /// Cell size in metres.
    pub const RESOLUTION: f64 = 30.0;

    /// Albers equal-area CONUS.
    pub const CRS: &str = "EPSG:5070";

    /// No-data value of source biomass rasters.
    pub const BIOMASS_NODATA: f64 = -32768.0;
}

/// Year fixtures.
pub mod years {
    /// A short consecutive run.
    pub const CONSECUTIVE: [u16; 3] = [1990, 1991, 1992];

    /// Years with a gap; pairs are formed between adjacent entries.
    pub const WITH_GAP: [u16; 3] = [1990, 1991, 1995];

    /// Canopy reference period.
    pub const CANOPY_RANGE: &str = "2000-2015";
}

/// Category codes used in zonal layers.
pub mod codes {
    pub const OWNERS: [i32; 2] = [1, 2];
    pub const COUNTIES: [i32; 2] = [10, 20];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_extents_are_ordered() {
        for (min_x, min_y, max_x, max_y) in [regions::OREGON, regions::WASHINGTON, regions::OREGON_4X4] {
            assert!(min_x < max_x);
            assert!(min_y < max_y);
        }
    }

    #[test]
    fn test_small_extent_is_four_cells() {
        let (min_x, min_y, max_x, max_y) = regions::OREGON_4X4;
        assert_eq!((max_x - min_x) / grids::RESOLUTION, 4.0);
        assert_eq!((max_y - min_y) / grids::RESOLUTION, 4.0);
    }
}
