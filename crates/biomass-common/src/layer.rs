//! Layer kinds produced and consumed by the pipeline.

use serde::{Deserialize, Serialize};

/// What a raster or table on disk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Unclipped annual biomass mosaic, one per year.
    BiomassSource,
    /// Biomass clipped to a region grid, one per region and year.
    Biomass,
    /// Biomass with the canopy mask applied.
    MaskedBiomass,
    /// Land ownership categories, one per region.
    Ownership,
    /// County GEOID categories, one per region.
    Counties,
    /// Forest canopy validity mask for a span of years.
    CanopyMask,
    /// Per-year summary table.
    Summary,
    /// Year-over-year biomass difference.
    Difference,
}

impl LayerKind {
    pub const ALL: [LayerKind; 8] = [
        LayerKind::BiomassSource,
        LayerKind::Biomass,
        LayerKind::MaskedBiomass,
        LayerKind::Ownership,
        LayerKind::Counties,
        LayerKind::CanopyMask,
        LayerKind::Summary,
        LayerKind::Difference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BiomassSource => "biomass_source",
            Self::Biomass => "biomass",
            Self::MaskedBiomass => "masked_biomass",
            Self::Ownership => "ownership",
            Self::Counties => "counties",
            Self::CanopyMask => "canopy_mask",
            Self::Summary => "summary",
            Self::Difference => "difference",
        }
    }

    /// Whether a layer of this kind exists once per year.
    pub fn is_annual(&self) -> bool {
        matches!(
            self,
            Self::BiomassSource | Self::Biomass | Self::MaskedBiomass | Self::Summary
        )
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LayerKind {
    type Err = LayerKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LayerKindParseError(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown layer kind: {0}")]
pub struct LayerKindParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for kind in LayerKind::ALL {
            assert_eq!(kind.as_str().parse::<LayerKind>().unwrap(), kind);
        }
        assert!("landcover".parse::<LayerKind>().is_err());
    }

    #[test]
    fn test_annual_kinds() {
        assert!(LayerKind::Biomass.is_annual());
        assert!(!LayerKind::Ownership.is_annual());
        assert!(!LayerKind::Difference.is_annual());
    }
}
