//! Common types shared across the forest biomass workspace.

pub mod bbox;
pub mod grid;
pub mod layer;
pub mod region;
pub mod years;

pub use bbox::{BboxParseError, BoundingBox};
pub use grid::{GeoTransform, GridShape, GridSpec};
pub use layer::{LayerKind, LayerKindParseError};
pub use region::Region;
pub use years::{YearRange, YearRangeParseError};
