use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    core::{container::handle::RoadId, heightmap::Heightmap},
    elevation::{baseline::estimate_baseline, harmonizer::ElevationHarmonizer},
    error::{Anomaly, Error},
    junction::{detector::JunctionDetector, JunctionType},
    params::HarmonizeParams,
    raster::{blender::ProtectedBlender, ownership::OwnershipBuilder},
    road::{definition::RoadDefinition, network::RoadNetwork, sampler::SplineSampler},
    traits::{ProgressObserver, RawElevationEstimator, SilentObserver},
};

/// Shared flag to cancel a running harmonization.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Stages of a harmonization run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    Sampling,
    Baseline,
    Detection,
    Harmonization,
    Rasterization,
    Blending,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Sampling => "sampling",
            PipelineStage::Baseline => "baseline",
            PipelineStage::Detection => "detection",
            PipelineStage::Harmonization => "harmonization",
            PipelineStage::Rasterization => "rasterization",
            PipelineStage::Blending => "blending",
        };
        write!(f, "{}", name)
    }
}

/// Counts describing a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizeSummary {
    /// Number of roads taking part in the run.
    pub roads: usize,
    pub excluded_roads: Vec<RoadId>,
    /// Number of junctions of each type. Every type is present.
    pub junctions: BTreeMap<JunctionType, usize>,
    pub cells_modified: usize,
    pub anomalies: usize,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct HarmonizeOutcome {
    /// The finalized network with target elevations and junctions.
    pub network: RoadNetwork,
    pub summary: HarmonizeSummary,
    pub anomalies: Vec<Anomaly>,
}

/// Harmonizes road elevations and blends the roads into a heightmap.
pub struct TerrainHarmonizer<'a> {
    params: &'a HarmonizeParams,
    estimator: &'a dyn RawElevationEstimator,
    observer: &'a dyn ProgressObserver,
    cancellation: Option<CancellationToken>,
}

impl<'a> TerrainHarmonizer<'a> {
    pub fn new(params: &'a HarmonizeParams, estimator: &'a dyn RawElevationEstimator) -> Self {
        Self {
            params,
            estimator,
            observer: &SilentObserver,
            cancellation: None,
        }
    }

    /// Set the observer notified of the progress of each stage.
    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Set the token checked between stages and between row batches.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        match &self.cancellation {
            Some(cancellation) if cancellation.is_cancelled() => Err(Error::CancellationRequested),
            _ => Ok(()),
        }
    }

    fn begin(&self, stage: PipelineStage) -> Result<(), Error> {
        self.check_cancelled()?;
        log::debug!("{} started", stage);
        self.observer.on_progress(stage, 0.0);
        Ok(())
    }

    fn finish(&self, stage: PipelineStage) {
        self.observer.on_progress(stage, 1.0);
    }

    fn record(anomalies: &mut Vec<Anomaly>, found: Vec<Anomaly>) {
        for anomaly in &found {
            log::warn!("{}", anomaly);
        }
        anomalies.extend(found);
    }

    /// Run the whole pipeline on the heightmap.
    ///
    /// The heightmap is read by every stage and replaced only at the very end.
    /// If an error is returned, it is left unmodified.
    pub fn run(
        &self,
        heightmap: &mut Heightmap,
        definitions: Vec<RoadDefinition>,
    ) -> Result<HarmonizeOutcome, Error> {
        let params = self.params;
        let mut anomalies = Vec::new();

        self.begin(PipelineStage::Sampling)?;
        let spacing = params.effective_spacing(heightmap.cell_size());
        let sampler = SplineSampler::new(spacing, params.ring_closure_tolerance);
        let (mut network, found) = RoadNetwork::from_definitions(definitions, &sampler);
        Self::record(&mut anomalies, found);
        log::info!(
            "sampled {} roads every {:.2} m",
            network.active_roads().count(),
            spacing
        );
        self.finish(PipelineStage::Sampling);

        self.begin(PipelineStage::Baseline)?;
        let found = estimate_baseline(&mut network, heightmap, self.estimator, params);
        Self::record(&mut anomalies, found);
        self.finish(PipelineStage::Baseline);

        self.begin(PipelineStage::Detection)?;
        let detection = JunctionDetector::new(params.detection_radius).detect(&network);
        Self::record(&mut anomalies, detection.anomalies);
        network.set_junctions(detection.junctions);
        log::info!("detected {} junctions", network.junctions().len());
        self.finish(PipelineStage::Detection);

        self.begin(PipelineStage::Harmonization)?;
        ElevationHarmonizer::new(params).harmonize(&mut network, heightmap);
        self.finish(PipelineStage::Harmonization);

        self.begin(PipelineStage::Rasterization)?;
        let layers = OwnershipBuilder::new(params).build(&network, heightmap);
        log::info!("rasterized {} claimed cells", layers.claimed_cells());
        self.finish(PipelineStage::Rasterization);

        self.begin(PipelineStage::Blending)?;
        let mut blender = ProtectedBlender::new(params.row_batch).with_observer(self.observer);
        if let Some(cancellation) = &self.cancellation {
            blender = blender.with_cancellation(cancellation);
        }
        let output = blender.blend(heightmap, &layers)?;
        self.check_cancelled()?;
        heightmap.commit(output.data);
        self.finish(PipelineStage::Blending);

        let summary = summarize(&network, output.cells_modified, anomalies.len());
        log::info!(
            "harmonized {} roads ({} excluded), {} cells modified, {} anomalies",
            summary.roads,
            summary.excluded_roads.len(),
            summary.cells_modified,
            summary.anomalies
        );
        self.observer.on_summary(&summary);

        Ok(HarmonizeOutcome {
            network,
            summary,
            anomalies,
        })
    }
}

fn summarize(network: &RoadNetwork, cells_modified: usize, anomalies: usize) -> HarmonizeSummary {
    let mut junctions = JunctionType::ALL
        .iter()
        .map(|junction_type| (*junction_type, 0))
        .collect::<BTreeMap<_, _>>();
    for junction in network.junctions() {
        *junctions.entry(junction.junction_type).or_default() += 1;
    }
    HarmonizeSummary {
        roads: network.active_roads().count(),
        excluded_roads: network
            .roads()
            .iter()
            .filter(|road| road.excluded)
            .map(|road| road.id)
            .collect(),
        junctions,
        cells_modified,
        anomalies,
    }
}
