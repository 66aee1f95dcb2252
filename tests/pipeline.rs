use std::sync::Mutex;

use noise::{NoiseFn, Perlin};
use rand::{rngs::StdRng, Rng, SeedableRng};
use street_grade::{
    core::{container::handle::RoadId, geometry::site::Site, heightmap::Heightmap},
    elevation::harmonizer::approach_adjusted_slope,
    error::Error,
    junction::{ContributorRole, JunctionType},
    params::HarmonizeParams,
    pipeline::{CancellationToken, HarmonizeOutcome, PipelineStage, TerrainHarmonizer},
    raster::ownership::OwnershipBuilder,
    road::{
        definition::{ControlCurve, RoadDefinition},
        section::CrossSection,
    },
    traits::{ProgressObserver, RawElevationEstimator, TerrainFollowingEstimator},
};

fn road(points: &[(f64, f64)]) -> RoadDefinition {
    RoadDefinition::new(
        points
            .iter()
            .map(|&(x, y)| Site::new(x, y))
            .collect::<ControlCurve>(),
    )
}

fn run(
    heightmap: &mut Heightmap,
    params: &HarmonizeParams,
    roads: Vec<RoadDefinition>,
) -> HarmonizeOutcome {
    TerrainHarmonizer::new(params, &TerrainFollowingEstimator)
        .run(heightmap, roads)
        .unwrap()
}

/// Every cell inside the core of its owner holds exactly the owner's target.
fn assert_cores_protected(
    original: &Heightmap,
    result: &Heightmap,
    params: &HarmonizeParams,
    outcome: &HarmonizeOutcome,
) {
    let layers = OwnershipBuilder::new(params).build(&outcome.network, original);
    let mut cores = 0;
    for (index, value) in result.data().iter().enumerate() {
        if let Some(owner) = layers.owner(index).filter(|owner| owner.in_core()) {
            assert_eq!(value.to_bits(), owner.elevation.to_bits());
            cores += 1;
        }
    }
    assert!(cores > 0);
}

#[test]
fn test_midpoint_t_junction() {
    let mut heightmap =
        Heightmap::from_fn(121, 121, 1.0, |site| site.x / 10.0 + site.y / 20.0).unwrap();
    let original = heightmap.clone();
    let params = HarmonizeParams::default().detection_radius(10.0);
    let outcome = run(
        &mut heightmap,
        &params,
        vec![
            road(&[(0.0, 0.0), (100.0, 0.0)]),
            road(&[(50.0, 105.0), (50.0, 5.0)]),
        ],
    );

    let junction = outcome
        .network
        .junctions()
        .iter()
        .find(|junction| junction.junction_type == JunctionType::TJunction)
        .unwrap();
    assert!((junction.elevation.unwrap() - 5.0).abs() < 1e-6);
    assert_eq!(
        junction.roads().collect::<Vec<_>>(),
        vec![RoadId::new(0), RoadId::new(1)]
    );
    assert_eq!(outcome.summary.junctions[&JunctionType::TJunction], 1);
    assert_eq!(outcome.summary.junctions[&JunctionType::Endpoint], 3);

    let branch = &outcome.network.roads()[1];
    let last = branch.sections.len() - 1;
    assert!((branch.sections[last].elevation.unwrap() - 5.0).abs() < 1e-6);

    // The branch leaves the junction flat, following the main road across its slope.
    let step =
        branch.sections[last].elevation.unwrap() - branch.sections[last - 1].elevation.unwrap();
    assert!(step.abs() < 1e-2);

    // Beyond the blend distance and its ease zone the branch keeps following the terrain.
    let middle = branch.nearest_index(50.0);
    let section = &branch.sections[middle];
    assert!((section.elevation.unwrap() - section.raw_elevation.unwrap()).abs() < 1e-9);

    // The main road is untouched by the junction.
    assert!((heightmap.get(50, 0).unwrap() - 5.0).abs() < 1e-6);
    assert!((heightmap.get(40, 0).unwrap() - 4.0).abs() < 1e-6);
    // Far from every road the terrain is unchanged.
    assert_eq!(heightmap.get(110, 110), original.get(110, 110));

    assert_cores_protected(&original, &heightmap, &params, &outcome);
}

/// Estimator placing road #0 at 10 m and every other road at 0 m.
struct FixedEstimator;

impl RawElevationEstimator for FixedEstimator {
    fn estimate(&self, section: &CrossSection, _terrain: &Heightmap) -> Option<f64> {
        Some(if section.road == RoadId::new(0) { 10.0 } else { 0.0 })
    }
}

#[test]
fn test_higher_priority_core_wins() {
    let mut heightmap = Heightmap::from_fn(81, 81, 1.0, |_| 0.0).unwrap();
    let original = heightmap.clone();
    let params = HarmonizeParams::default();
    let outcome = TerrainHarmonizer::new(&params, &FixedEstimator)
        .run(
            &mut heightmap,
            vec![
                road(&[(0.0, 40.0), (80.0, 40.0)]).priority(1),
                road(&[(40.0, 0.0), (40.0, 80.0)]).priority(3),
            ],
        )
        .unwrap();

    let crossing = outcome
        .network
        .junctions()
        .iter()
        .find(|junction| junction.junction_type == JunctionType::MidSplineCrossing)
        .unwrap();
    // Weighted 3:1 toward the higher priority road
    assert!((crossing.elevation.unwrap() - 2.5).abs() < 1e-9);
    assert!(crossing
        .contributors
        .iter()
        .all(|contributor| contributor.role == ContributorRole::PassThrough));

    let layers = OwnershipBuilder::new(&params).build(&outcome.network, &original);
    for row in 37..=43 {
        for col in 37..=43 {
            let index = heightmap.index(col, row);
            let owner = layers.owner(index).unwrap();
            assert_eq!(owner.road, RoadId::new(1));
            assert_eq!(heightmap.data()[index], owner.elevation);
        }
    }
    assert!((heightmap.get(40, 40).unwrap() - 2.5).abs() < 1e-6);

    assert_cores_protected(&original, &heightmap, &params, &outcome);
}

#[test]
fn test_approach_slope_sign() {
    // The main road rises 1 m every 100 m; the branch joins from its downhill side.
    let mut heightmap = Heightmap::from_fn(101, 61, 1.0, |site| site.x / 100.0).unwrap();
    let outcome = run(
        &mut heightmap,
        &HarmonizeParams::default(),
        vec![
            road(&[(0.0, 20.0), (100.0, 20.0)]),
            road(&[(20.0, 58.0), (48.0, 22.0)]),
        ],
    );
    let network = &outcome.network;

    let junction = network
        .junctions()
        .iter()
        .find(|junction| junction.junction_type == JunctionType::TJunction)
        .unwrap();
    let main = junction.contributors_of(RoadId::new(0)).next().unwrap();
    assert!((main.slope - 0.01).abs() < 1e-6);

    let branch = junction.contributors_of(RoadId::new(1)).next().unwrap();
    let tangent = network.section(main.section).unwrap().tangent;
    let approach = -network.section(branch.section).unwrap().tangent;
    let adjusted = approach_adjusted_slope(main.slope, tangent, approach);
    assert!((adjusted + 0.01).abs() < 1e-6);

    // Along its own running distance the branch climbs into the junction.
    let expected = 0.01 * 28.0 / (28.0f64 * 28.0 + 36.0 * 36.0).sqrt();
    assert!(branch.slope > 0.0);
    assert!((branch.slope - expected).abs() < 1e-4);
}

/// Estimator ramping the main road along x and the branch along y, with the branch 0.6 m
/// below the main road where they meet.
struct RampEstimator;

impl RawElevationEstimator for RampEstimator {
    fn estimate(&self, section: &CrossSection, _terrain: &Heightmap) -> Option<f64> {
        Some(if section.road == RoadId::new(0) {
            section.site.x / 20.0
        } else {
            2.4 + (section.site.y - 5.0) * 0.04
        })
    }
}

#[test]
fn test_branch_slope_converges_to_original() {
    let mut heightmap = Heightmap::from_fn(121, 121, 1.0, |_| 0.0).unwrap();
    let params = HarmonizeParams::default().smoothing_radius(0.0);
    let outcome = TerrainHarmonizer::new(&params, &RampEstimator)
        .run(
            &mut heightmap,
            vec![
                road(&[(0.0, 0.0), (120.0, 0.0)]),
                road(&[(60.0, 110.0), (60.0, 5.0)]),
            ],
        )
        .unwrap();

    let junction = outcome
        .network
        .junctions()
        .iter()
        .find(|junction| junction.junction_type == JunctionType::TJunction)
        .unwrap();
    assert!((junction.elevation.unwrap() - 3.0).abs() < 1e-6);
    let d = junction.blend_distance;
    let ease = params.ease_distance(d);

    // Offsets are measured from the junction back along the branch.
    let branch = &outcome.network.roads()[1];
    let anchor = junction.contributors_of(branch.id).next().unwrap().distance;
    let elevation = |offset: f64| branch.elevation_at(anchor - offset).unwrap();
    let slope = |offset: f64| {
        let h = 1.0;
        if offset < h {
            (elevation(offset + h) - elevation(offset)) / h
        } else {
            (elevation(offset + h) - elevation(offset - h)) / (2.0 * h)
        }
    };

    let slopes = [0.0, 0.25, 0.5, 0.75, 1.0].map(|fraction| slope(fraction * d));
    assert!(slopes.windows(2).all(|pair| pair[1] > pair[0]));
    assert!(slopes[0].abs() < 5e-3);
    assert!((slopes[4] - 0.04).abs() < 2e-3);

    let mut offset = (d + ease).ceil();
    while offset < d + ease + 10.0 {
        let section = &branch.sections[branch.nearest_index(anchor - offset)];
        assert!((section.elevation.unwrap() - section.raw_elevation.unwrap()).abs() < 1e-9);
        assert!((slope(offset) - 0.04).abs() < 1e-6);
        offset += 1.0;
    }
}

fn random_roads(seed: u64, count: usize, extent: f64) -> Vec<RoadDefinition> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let points = rng.gen_range(2..5);
            let curve = (0..points)
                .map(|_| {
                    Site::new(
                        rng.gen_range(4.0..extent - 4.0),
                        rng.gen_range(4.0..extent - 4.0),
                    )
                })
                .collect::<ControlCurve>();
            RoadDefinition::new(curve)
                .half_width(rng.gen_range(2.0..5.0))
                .blend_distance(rng.gen_range(5.0..12.0))
                .priority(rng.gen_range(0..4))
        })
        .collect()
}

fn noise_terrain(seed: u32, size: usize) -> Heightmap {
    let perlin = Perlin::new(seed);
    Heightmap::from_fn(size, size, 1.0, |site| {
        perlin.get([site.x / 40.0, site.y / 40.0]) * 20.0
    })
    .unwrap()
}

#[test]
fn test_random_networks() {
    for seed in 0..4 {
        let mut heightmap = noise_terrain(seed as u32, 96);
        let original = heightmap.clone();
        let params = HarmonizeParams::default();
        let outcome = run(&mut heightmap, &params, random_roads(seed, 8, 96.0));

        assert!(heightmap.data().iter().all(|value| value.is_finite()));
        assert_eq!(
            outcome.summary.roads + outcome.summary.excluded_roads.len(),
            8
        );
        assert_cores_protected(&original, &heightmap, &params, &outcome);
    }
}

#[test]
fn test_deterministic_across_thread_counts() {
    let params = HarmonizeParams::default().row_batch(3);
    let harmonize = |threads: usize| {
        let mut heightmap = noise_terrain(11, 96);
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
            .install(|| run(&mut heightmap, &params, random_roads(42, 10, 96.0)));
        heightmap
            .data()
            .iter()
            .map(|value| value.to_bits())
            .collect::<Vec<_>>()
    };
    assert_eq!(harmonize(1), harmonize(4));
}

#[test]
fn test_cancelled_before_run() {
    let mut heightmap = noise_terrain(3, 64);
    let original = heightmap.clone();
    let params = HarmonizeParams::default();
    let token = CancellationToken::new();
    token.cancel();

    let result = TerrainHarmonizer::new(&params, &TerrainFollowingEstimator)
        .with_cancellation(token)
        .run(&mut heightmap, random_roads(5, 4, 64.0));
    assert!(matches!(result, Err(Error::CancellationRequested)));
    assert_eq!(heightmap, original);
}

/// Cancels the run as soon as the given stage starts.
struct CancelAt {
    stage: PipelineStage,
    token: CancellationToken,
    seen: Mutex<Vec<PipelineStage>>,
}

impl ProgressObserver for CancelAt {
    fn on_progress(&self, stage: PipelineStage, fraction: f64) {
        if fraction == 0.0 {
            self.seen.lock().unwrap().push(stage);
        }
        if stage == self.stage {
            self.token.cancel();
        }
    }
}

#[test]
fn test_cancelled_mid_run() {
    let mut heightmap = noise_terrain(3, 64);
    let original = heightmap.clone();
    let params = HarmonizeParams::default();
    let token = CancellationToken::new();
    let observer = CancelAt {
        stage: PipelineStage::Harmonization,
        token: token.clone(),
        seen: Mutex::new(Vec::new()),
    };

    let result = TerrainHarmonizer::new(&params, &TerrainFollowingEstimator)
        .with_observer(&observer)
        .with_cancellation(token)
        .run(&mut heightmap, random_roads(5, 4, 64.0));
    assert!(matches!(result, Err(Error::CancellationRequested)));
    assert_eq!(heightmap, original);
    assert_eq!(
        observer.seen.lock().unwrap().last(),
        Some(&PipelineStage::Harmonization)
    );
}
