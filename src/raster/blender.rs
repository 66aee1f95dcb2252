use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::{
    core::heightmap::Heightmap,
    error::Error,
    pipeline::{CancellationToken, PipelineStage},
    traits::ProgressObserver,
};

use super::ownership::OwnershipLayers;

/// Blended copy of the terrain, ready to be committed.
#[derive(Debug, Clone)]
pub struct BlendOutput {
    pub data: Vec<f64>,
    pub cells_modified: usize,
}

/// Blends road targets into a copy of the terrain without touching protected cores.
///
/// Rows are processed in parallel batches. Cancellation is checked before each batch.
pub struct ProtectedBlender<'a> {
    row_batch: usize,
    cancellation: Option<&'a CancellationToken>,
    observer: Option<&'a dyn ProgressObserver>,
}

impl<'a> ProtectedBlender<'a> {
    pub fn new(row_batch: usize) -> Self {
        Self {
            row_batch: row_batch.max(1),
            cancellation: None,
            observer: None,
        }
    }

    pub fn with_cancellation(mut self, cancellation: &'a CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .is_some_and(|cancellation| cancellation.is_cancelled())
    }

    /// Blend the layers into a copy of the terrain.
    ///
    /// The terrain itself is not modified.
    pub fn blend(
        &self,
        terrain: &Heightmap,
        layers: &OwnershipLayers,
    ) -> Result<BlendOutput, Error> {
        let width = terrain.width();
        let mut data = terrain.data().to_vec();
        if data.is_empty() {
            return Ok(BlendOutput {
                data,
                cells_modified: 0,
            });
        }

        let batch_size = width * self.row_batch;
        let batches = data.len().div_ceil(batch_size);
        let done = AtomicUsize::new(0);

        let modified = data
            .par_chunks_mut(batch_size)
            .enumerate()
            .map(|(batch, chunk)| {
                if self.is_cancelled() {
                    return Err(Error::CancellationRequested);
                }
                let offset = batch * batch_size;
                let mut modified = 0;
                for (i, value) in chunk.iter_mut().enumerate() {
                    let blended = blend_cell(*value, offset + i, layers);
                    if blended.to_bits() != value.to_bits() {
                        modified += 1;
                        *value = blended;
                    }
                }
                if let Some(observer) = self.observer {
                    let done = done.fetch_add(1, Ordering::Relaxed) + 1;
                    observer.on_progress(PipelineStage::Blending, done as f64 / batches as f64);
                }
                Ok(modified)
            })
            .collect::<Result<Vec<usize>, Error>>()?
            .into_iter()
            .sum();

        Ok(BlendOutput {
            data,
            cells_modified: modified,
        })
    }
}

/// Elevation of one cell after blending.
///
/// Cores take the owner's target exactly. Blend bands move the terrain toward the weighted
/// target of every footprint covering the cell. Unclaimed cells keep the terrain.
fn blend_cell(terrain: f64, index: usize, layers: &OwnershipLayers) -> f64 {
    let Some(owner) = layers.owner(index) else {
        return terrain;
    };
    if owner.in_core() {
        return owner.elevation;
    }
    let factor = layers.blend_factor(index);
    match layers.blend_target(index) {
        Some(target) if factor > 0.0 => terrain + (target - terrain) * factor,
        _ => terrain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::geometry::site::Site,
        params::HarmonizeParams,
        raster::ownership::OwnershipBuilder,
        road::{
            definition::{ControlCurve, RoadDefinition},
            network::RoadNetwork,
            sampler::SplineSampler,
        },
    };

    fn setup(elevation: f64) -> (Heightmap, OwnershipLayers) {
        let definition = RoadDefinition::new(ControlCurve::new(vec![
            Site::new(2.0, 20.0),
            Site::new(38.0, 20.0),
        ]))
        .half_width(3.0)
        .blend_distance(5.0);
        let (mut network, _) =
            RoadNetwork::from_definitions(vec![definition], &SplineSampler::new(1.0, 1.0));
        for section in network.roads_mut()[0].sections.iter_mut() {
            section.raw_elevation = Some(elevation);
            section.elevation = Some(elevation);
        }
        let terrain = Heightmap::from_fn(41, 41, 1.0, |site| site.y * 0.1).unwrap();
        let layers = OwnershipBuilder::new(&HarmonizeParams::default()).build(&network, &terrain);
        (terrain, layers)
    }

    #[test]
    fn test_core_is_protected() {
        let (terrain, layers) = setup(5.0);
        let output = ProtectedBlender::new(4).blend(&terrain, &layers).unwrap();

        for row in 17..=23 {
            assert_eq!(output.data[terrain.index(20, row)], 5.0);
        }
        // Blend band moves toward the road, but not all the way.
        let index = terrain.index(20, 25);
        let blended = output.data[index];
        assert!(blended > terrain.data()[index]);
        assert!(blended < 5.0);
        // Untouched outside the footprint
        assert_eq!(output.data[terrain.index(20, 2)], terrain.data()[terrain.index(20, 2)]);
        assert!(output.cells_modified > 0);
    }

    #[test]
    fn test_batches_do_not_change_result() {
        let (terrain, layers) = setup(0.0);
        let a = ProtectedBlender::new(1).blend(&terrain, &layers).unwrap();
        let b = ProtectedBlender::new(1000).blend(&terrain, &layers).unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(a.cells_modified, b.cells_modified);
    }

    #[test]
    fn test_cancelled_blend() {
        let (terrain, layers) = setup(0.0);
        let token = CancellationToken::new();
        token.cancel();
        let result = ProtectedBlender::new(4)
            .with_cancellation(&token)
            .blend(&terrain, &layers);
        assert!(matches!(result, Err(Error::CancellationRequested)));
    }
}
