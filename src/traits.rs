use crate::{
    core::heightmap::Heightmap,
    pipeline::{HarmonizeSummary, PipelineStage},
    road::section::CrossSection,
};

/// Provider of the baseline elevation of cross-sections.
///
/// Implementations must be pure: the same section and terrain always give the same value.
/// Returning None (or a non-finite value) marks the elevation as unresolved.
pub trait RawElevationEstimator: Sync {
    fn estimate(&self, section: &CrossSection, terrain: &Heightmap) -> Option<f64>;
}

/// Estimator following the terrain under the centerline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerrainFollowingEstimator;

impl RawElevationEstimator for TerrainFollowingEstimator {
    fn estimate(&self, section: &CrossSection, terrain: &Heightmap) -> Option<f64> {
        terrain.sample(&section.site)
    }
}

/// Estimator that ignores the terrain and returns the value of a function of the site.
///
/// This is used only for testing purposes.
#[cfg(test)]
pub(crate) struct MockFnEstimator<F> {
    f: F,
}

#[cfg(test)]
impl<F> MockFnEstimator<F>
where
    F: Fn(&CrossSection) -> Option<f64> + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[cfg(test)]
impl<F> RawElevationEstimator for MockFnEstimator<F>
where
    F: Fn(&CrossSection) -> Option<f64> + Sync,
{
    fn estimate(&self, section: &CrossSection, _terrain: &Heightmap) -> Option<f64> {
        (self.f)(section)
    }
}

/// Observer of the progress of a harmonization run.
///
/// Notifications may arrive from worker threads.
pub trait ProgressObserver: Sync {
    /// Called with the fraction of the stage completed, from 0.0 to 1.0.
    fn on_progress(&self, stage: PipelineStage, fraction: f64);

    fn on_summary(&self, _summary: &HarmonizeSummary) {}
}

/// Observer discarding every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {
    fn on_progress(&self, _stage: PipelineStage, _fraction: f64) {}
}
