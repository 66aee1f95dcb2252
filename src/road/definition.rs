use crate::{
    core::geometry::site::Site,
    unit::{Priority, Slope},
};

/// Ordered control points of a road centerline, in heightmap meters.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlCurve {
    points: Vec<Site>,
}

impl ControlCurve {
    pub fn new(points: Vec<Site>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Site] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<Site> for ControlCurve {
    fn from_iter<I: IntoIterator<Item = Site>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A road to stamp into the terrain: a centerline and its static parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadDefinition {
    pub curve: ControlCurve,
    /// Half-width of the protected core around the centerline.
    pub half_width: f64,
    /// Width of the band beyond the core where the road blends into the terrain.
    pub blend_distance: f64,
    /// Maximum longitudinal slope of the road surface.
    pub max_surface_slope: Slope,
    /// Maximum slope of the shoulder between the road and the terrain.
    pub max_shoulder_slope: Slope,
    /// Priority of the road. Higher priority wins every conflict.
    pub priority: Priority,
}

impl RoadDefinition {
    /// Create a road with default parameters: a 4 m half-width, 8 m blend band,
    /// 8° surface slope, 1:1.5 shoulder and priority 0.
    pub fn new(curve: ControlCurve) -> Self {
        Self {
            curve,
            half_width: 4.0,
            blend_distance: 8.0,
            max_surface_slope: Slope::from_degrees(8.0),
            max_shoulder_slope: Slope::from_grade(1.0 / 1.5),
            priority: Priority::default(),
        }
    }

    /// Set the half-width of the protected core.
    pub fn half_width(mut self, half_width: f64) -> Self {
        self.half_width = half_width;
        self
    }

    /// Set the width of the blend band.
    pub fn blend_distance(mut self, blend_distance: f64) -> Self {
        self.blend_distance = blend_distance;
        self
    }

    /// Set the maximum longitudinal slope.
    pub fn max_surface_slope(mut self, max_surface_slope: Slope) -> Self {
        self.max_surface_slope = max_surface_slope;
        self
    }

    /// Set the maximum shoulder slope.
    pub fn max_shoulder_slope(mut self, max_shoulder_slope: Slope) -> Self {
        self.max_shoulder_slope = max_shoulder_slope;
        self
    }

    /// Set the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Priority::new(priority);
        self
    }

    /// Half-width of the whole footprint, core and blend band.
    pub fn footprint(&self) -> f64 {
        self.half_width + self.blend_distance
    }
}
