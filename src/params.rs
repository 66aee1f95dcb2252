use crate::{raster::falloff::FalloffKind, unit::Slope};

/// Cross-sections are never sampled more densely than this.
pub const MIN_SAMPLE_SPACING: f64 = 0.25;

/// How the elevation of a closed ring road is determined.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RingElevationMode {
    /// The ring holds one elevation, the mean of its baseline.
    Uniform,
    /// The ring follows the terrain; connectors blend to the ring's local elevation.
    #[default]
    TerrainFollowing,
}

/// Tunable parameters of the harmonization run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizeParams {
    /// Radius to search other roads around a road endpoint.
    pub detection_radius: f64,
    /// Minimum distance along a road over which a junction elevation is blended.
    pub default_blend_distance: f64,
    /// Upper bound of the blend distance along a road.
    pub max_blend_distance: f64,
    /// Maximum slope allowed while blending toward a junction elevation.
    pub max_slope: Slope,
    /// Length of the ease zone after the blend distance, as a fraction of it.
    pub ease_fraction: f64,
    pub ring_mode: RingElevationMode,
    /// Distance between cross-sections. If None, the heightmap cell size is used.
    pub sample_spacing: Option<f64>,
    /// Radius of the moving average applied to the baseline elevation along each road.
    pub smoothing_radius: f64,
    /// Falloff of the blend footprint across a road.
    pub falloff: FalloffKind,
    /// Maximum factor the blend footprint may be widened by to respect the shoulder slope.
    pub shoulder_widen_limit: f64,
    /// Rows processed by one blending task between cancellation checks.
    pub row_batch: usize,
    /// Curves whose ends are closer than this are closed rings.
    pub ring_closure_tolerance: f64,
}

impl Default for HarmonizeParams {
    fn default() -> Self {
        Self {
            detection_radius: 10.0,
            default_blend_distance: 30.0,
            max_blend_distance: 150.0,
            max_slope: Slope::from_degrees(8.0),
            ease_fraction: 0.15,
            ring_mode: RingElevationMode::default(),
            sample_spacing: None,
            smoothing_radius: 10.0,
            falloff: FalloffKind::default(),
            shoulder_widen_limit: 3.0,
            row_batch: 32,
            ring_closure_tolerance: 1.0,
        }
    }
}

impl HarmonizeParams {
    /// Set the radius to search other roads around a road endpoint.
    pub fn detection_radius(mut self, detection_radius: f64) -> Self {
        self.detection_radius = detection_radius;
        self
    }

    /// Set the minimum blend distance.
    pub fn default_blend_distance(mut self, default_blend_distance: f64) -> Self {
        self.default_blend_distance = default_blend_distance;
        self
    }

    /// Set the maximum blend distance.
    pub fn max_blend_distance(mut self, max_blend_distance: f64) -> Self {
        self.max_blend_distance = max_blend_distance;
        self
    }

    /// Set the maximum slope while blending.
    pub fn max_slope(mut self, max_slope: Slope) -> Self {
        self.max_slope = max_slope;
        self
    }

    /// Set the length of the ease zone as a fraction of the blend distance.
    pub fn ease_fraction(mut self, ease_fraction: f64) -> Self {
        self.ease_fraction = ease_fraction;
        self
    }

    /// Set how closed rings are elevated.
    pub fn ring_mode(mut self, ring_mode: RingElevationMode) -> Self {
        self.ring_mode = ring_mode;
        self
    }

    /// Set the distance between cross-sections.
    pub fn sample_spacing(mut self, sample_spacing: Option<f64>) -> Self {
        self.sample_spacing = sample_spacing;
        self
    }

    /// Set the radius of the baseline smoothing.
    pub fn smoothing_radius(mut self, smoothing_radius: f64) -> Self {
        self.smoothing_radius = smoothing_radius;
        self
    }

    /// Set the falloff of the blend footprint.
    pub fn falloff(mut self, falloff: FalloffKind) -> Self {
        self.falloff = falloff;
        self
    }

    /// Set the maximum widening factor of the blend footprint.
    pub fn shoulder_widen_limit(mut self, shoulder_widen_limit: f64) -> Self {
        self.shoulder_widen_limit = shoulder_widen_limit;
        self
    }

    /// Set the number of rows blended between cancellation checks.
    pub fn row_batch(mut self, row_batch: usize) -> Self {
        self.row_batch = row_batch;
        self
    }

    /// Set the distance under which the ends of a curve close it into a ring.
    pub fn ring_closure_tolerance(mut self, ring_closure_tolerance: f64) -> Self {
        self.ring_closure_tolerance = ring_closure_tolerance;
        self
    }

    /// Distance between cross-sections for a heightmap with the given cell size.
    pub fn effective_spacing(&self, cell_size: f64) -> f64 {
        self.sample_spacing
            .unwrap_or(cell_size)
            .max(MIN_SAMPLE_SPACING)
    }

    /// Length of the ease zone for a blend distance.
    pub fn ease_distance(&self, blend_distance: f64) -> f64 {
        blend_distance * self.ease_fraction.max(0.0)
    }
}
