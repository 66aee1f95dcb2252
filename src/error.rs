use thiserror::Error;

use crate::core::container::handle::RoadId;

/// Fatal errors of the harmonization pipeline.
///
/// Whenever one of these is returned the caller's heightmap is unmodified.
#[derive(Debug, Error)]
pub enum Error {
    #[error("harmonization was cancelled")]
    CancellationRequested,

    #[error("heightmap has {found} samples but {width}x{height} were declared")]
    HeightmapSize {
        width: usize,
        height: usize,
        found: usize,
    },

    #[error("heightmap cell size must be positive and finite, got {0}")]
    InvalidCellSize(f64),
}

/// Recoverable anomalies found in the input.
///
/// These are recorded and logged, and the run continues with a deterministic fallback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Anomaly {
    #[error("road {road} skipped: {points} distinct finite control points, at least two are required")]
    InvalidCurve { road: RoadId, points: usize },

    #[error("degenerate junction at ({x:.2}, {y:.2}) dropped, its roads are treated independently")]
    DegenerateJunction { x: f64, y: f64 },

    #[error("road {road}: {sections} of {total} cross-sections have no baseline elevation")]
    UnresolvedElevation {
        road: RoadId,
        sections: usize,
        total: usize,
    },

    #[error("road {road}: blend distance {blend_distance} is narrower than half-width {half_width}, raised to the half-width")]
    BlendNarrowerThanCore {
        road: RoadId,
        half_width: f64,
        blend_distance: f64,
    },
}

impl Anomaly {
    /// Check if the anomaly removed the whole road from the run.
    pub fn excludes_road(&self) -> Option<RoadId> {
        match self {
            Anomaly::InvalidCurve { road, .. } => Some(*road),
            Anomaly::UnresolvedElevation {
                road,
                sections,
                total,
            } if sections == total => Some(*road),
            _ => None,
        }
    }
}
