use glam::DVec2;

use crate::core::{
    container::handle::{RoadId, SectionRef},
    geometry::{site::Site, spline::SplinePoint},
};

/// A sampled slice of a road centerline.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSection {
    pub road: RoadId,
    /// Local sequence index along the road.
    pub index: usize,
    /// Running distance from the start of the road.
    pub distance: f64,
    pub site: Site,
    pub tangent: DVec2,
    /// The tangent rotated counter-clockwise.
    pub normal: DVec2,
    /// Terrain-following elevation before junctions are considered.
    pub raw_elevation: Option<f64>,
    /// Target elevation of the road surface.
    pub elevation: Option<f64>,
    /// Excluded sections are never rasterized.
    pub excluded: bool,
}

impl CrossSection {
    pub fn new(road: RoadId, index: usize, point: &SplinePoint) -> Self {
        Self {
            road,
            index,
            distance: point.distance,
            site: point.site,
            tangent: point.tangent,
            normal: point.tangent.perp(),
            raw_elevation: None,
            elevation: None,
            excluded: false,
        }
    }

    pub fn handle(&self) -> SectionRef {
        SectionRef::new(self.road, self.index)
    }

    /// Target elevation if the section takes part in rasterization.
    pub fn target(&self) -> Option<f64> {
        if self.excluded {
            None
        } else {
            self.elevation.filter(|elevation| elevation.is_finite())
        }
    }
}
