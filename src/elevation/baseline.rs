use rayon::prelude::*;

use crate::{
    core::heightmap::Heightmap,
    error::Anomaly,
    params::{HarmonizeParams, RingElevationMode},
    road::network::{Road, RoadNetwork},
    traits::RawElevationEstimator,
};

use super::profile::clamp_grade;

/// Compute the raw elevation of every cross-section of every active road.
///
/// Roads are processed in parallel. Roads without a single resolved elevation are excluded.
pub fn estimate_baseline(
    network: &mut RoadNetwork,
    terrain: &Heightmap,
    estimator: &dyn RawElevationEstimator,
    params: &HarmonizeParams,
) -> Vec<Anomaly> {
    network
        .roads_mut()
        .par_iter_mut()
        .filter(|road| !road.excluded)
        .filter_map(|road| estimate_road(road, terrain, estimator, params))
        .collect()
}

fn estimate_road(
    road: &mut Road,
    terrain: &Heightmap,
    estimator: &dyn RawElevationEstimator,
    params: &HarmonizeParams,
) -> Option<Anomaly> {
    let total = road.sections.len();
    let estimates = road
        .sections
        .iter()
        .map(|section| {
            estimator
                .estimate(section, terrain)
                .filter(|elevation| elevation.is_finite())
        })
        .collect::<Vec<_>>();

    let unresolved = estimates.iter().filter(|value| value.is_none()).count();
    if unresolved == total {
        road.excluded = true;
        return Some(Anomaly::UnresolvedElevation {
            road: road.id,
            sections: unresolved,
            total,
        });
    }

    let distances = road
        .sections
        .iter()
        .map(|section| section.distance)
        .collect::<Vec<_>>();
    let mut values = fill_unresolved(&estimates, &distances, road.closed, road.length);

    let window = smoothing_window(params.smoothing_radius, road);
    values = if road.closed {
        moving_average_closed(&values, window)
    } else {
        moving_average_open(&values, window)
    };

    clamp_grade(
        &mut values,
        &distances,
        road.definition.max_surface_slope.grade(),
        &[],
    );

    if road.closed && params.ring_mode == RingElevationMode::Uniform {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter_mut().for_each(|value| *value = mean);
    }

    for ((section, value), estimate) in road
        .sections
        .iter_mut()
        .zip(values)
        .zip(estimates.iter())
    {
        section.raw_elevation = Some(value);
        section.elevation = Some(value);
        section.excluded = estimate.is_none();
    }

    (unresolved > 0).then_some(Anomaly::UnresolvedElevation {
        road: road.id,
        sections: unresolved,
        total,
    })
}

/// Number of samples on each side of the moving average window.
fn smoothing_window(radius: f64, road: &Road) -> usize {
    let spacing = road.spacing();
    if !(radius > 0.0 && spacing > 0.0) {
        return 0;
    }
    (radius / spacing).round() as usize
}

/// Replace unresolved values by linear interpolation between the nearest resolved ones.
///
/// On open roads the ends take the nearest resolved value.
/// Closed roads interpolate through the seam.
fn fill_unresolved(
    estimates: &[Option<f64>],
    distances: &[f64],
    closed: bool,
    length: f64,
) -> Vec<f64> {
    let resolved = estimates
        .iter()
        .enumerate()
        .filter_map(|(i, value)| value.map(|value| (i, value)))
        .collect::<Vec<_>>();

    (0..estimates.len())
        .map(|i| {
            if let Some(value) = estimates[i] {
                return value;
            }
            let after = resolved.partition_point(|(j, _)| *j < i);
            let next = resolved.get(after);
            let previous = after.checked_sub(1).and_then(|k| resolved.get(k));
            let (previous, next) = match (previous, next) {
                (Some(previous), Some(next)) => (*previous, *next),
                (Some(only), None) | (None, Some(only)) if !closed => return only.1,
                // wrap through the seam
                (Some(previous), None) => (*previous, resolved[0]),
                (None, Some(next)) => (resolved[resolved.len() - 1], *next),
                (None, None) => return 0.0,
            };
            let span = forward(distances[previous.0], distances[next.0], closed, length);
            let run = forward(distances[previous.0], distances[i], closed, length);
            if span > 0.0 {
                previous.1 + (next.1 - previous.1) * run / span
            } else {
                previous.1
            }
        })
        .collect()
}

fn forward(from: f64, to: f64, closed: bool, length: f64) -> f64 {
    if closed && to < from {
        to + length - from
    } else {
        to - from
    }
}

/// Moving average whose window shrinks symmetrically near the ends, so linear profiles are kept.
fn moving_average_open(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if window == 0 || n < 3 {
        return values.to_vec();
    }
    let prefix = std::iter::once(0.0)
        .chain(values.iter().scan(0.0, |sum, value| {
            *sum += value;
            Some(*sum)
        }))
        .collect::<Vec<_>>();
    (0..n)
        .map(|i| {
            let k = window.min(i).min(n - 1 - i);
            (prefix[i + k + 1] - prefix[i - k]) / (2 * k + 1) as f64
        })
        .collect()
}

/// Moving average wrapping around a closed ring.
fn moving_average_closed(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let window = window.min(n.saturating_sub(1) / 2);
    if window == 0 {
        return values.to_vec();
    }
    (0..n)
        .map(|i| {
            let sum = (0..=2 * window)
                .map(|offset| values[(i + n + offset - window) % n])
                .sum::<f64>();
            sum / (2 * window + 1) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::geometry::site::Site,
        road::{
            definition::{ControlCurve, RoadDefinition},
            sampler::SplineSampler,
            section::CrossSection,
        },
        traits::{MockFnEstimator, TerrainFollowingEstimator},
        unit::Slope,
    };

    fn network(definitions: Vec<RoadDefinition>) -> RoadNetwork {
        RoadNetwork::from_definitions(definitions, &SplineSampler::new(1.0, 1.0)).0
    }

    fn straight() -> RoadDefinition {
        RoadDefinition::new(ControlCurve::new(vec![
            Site::new(0.0, 0.0),
            Site::new(20.0, 0.0),
        ]))
    }

    fn terrain() -> Heightmap {
        Heightmap::from_fn(32, 8, 1.0, |site| site.x * 0.1).unwrap()
    }

    #[test]
    fn test_linear_terrain_is_kept() {
        let mut network = network(vec![straight()]);
        let anomalies = estimate_baseline(
            &mut network,
            &terrain(),
            &TerrainFollowingEstimator,
            &HarmonizeParams::default(),
        );
        assert!(anomalies.is_empty());
        let road = &network.roads()[0];
        for section in &road.sections {
            assert!((section.raw_elevation.unwrap() - section.site.x * 0.1).abs() < 1e-6);
            assert_eq!(section.elevation, section.raw_elevation);
        }
    }

    #[test]
    fn test_unresolved_sections_are_filled() {
        let mut network = network(vec![straight()]);
        let estimator = MockFnEstimator::new(|section: &CrossSection| {
            (section.index % 4 != 1).then_some(section.distance * 0.1)
        });
        let anomalies = estimate_baseline(
            &mut network,
            &terrain(),
            &estimator,
            &HarmonizeParams::default().smoothing_radius(0.0),
        );
        assert_eq!(
            anomalies,
            vec![Anomaly::UnresolvedElevation {
                road: network.roads()[0].id,
                sections: 5,
                total: 21
            }]
        );
        let road = &network.roads()[0];
        assert!(!road.excluded);
        assert!(road.sections[1].excluded);
        assert!(road.sections[1].target().is_none());
        assert!((road.sections[1].raw_elevation.unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_all_unresolved_excludes_road() {
        let mut network = network(vec![straight()]);
        let estimator = MockFnEstimator::new(|_: &CrossSection| Some(f64::NAN));
        let anomalies = estimate_baseline(
            &mut network,
            &terrain(),
            &estimator,
            &HarmonizeParams::default(),
        );
        assert_eq!(anomalies[0].excludes_road(), Some(network.roads()[0].id));
        assert!(network.roads()[0].excluded);
    }

    #[test]
    fn test_grade_is_limited() {
        let mut network = network(vec![straight().max_surface_slope(Slope::from_grade(0.05))]);
        let estimator = MockFnEstimator::new(|section: &CrossSection| {
            Some(if section.distance < 10.0 { 0.0 } else { 5.0 })
        });
        estimate_baseline(
            &mut network,
            &terrain(),
            &estimator,
            &HarmonizeParams::default().smoothing_radius(0.0),
        );
        let road = &network.roads()[0];
        assert!(road.sections.windows(2).all(|pair| {
            let rise = pair[1].raw_elevation.unwrap() - pair[0].raw_elevation.unwrap();
            rise.abs() <= 0.05 * (pair[1].distance - pair[0].distance) + 1e-9
        }));
    }

    #[test]
    fn test_uniform_ring() {
        let ring = RoadDefinition::new(ControlCurve::new(vec![
            Site::new(2.0, 1.0),
            Site::new(28.0, 1.0),
            Site::new(28.0, 6.0),
            Site::new(2.0, 6.0),
            Site::new(2.0, 1.0),
        ]));
        let mut network = network(vec![ring]);
        estimate_baseline(
            &mut network,
            &terrain(),
            &TerrainFollowingEstimator,
            &HarmonizeParams::default().ring_mode(RingElevationMode::Uniform),
        );
        let road = &network.roads()[0];
        assert!(road.closed);
        let first = road.sections[0].raw_elevation.unwrap();
        assert!(road
            .sections
            .iter()
            .all(|section| section.raw_elevation == Some(first)));
    }

    #[test]
    fn test_moving_average() {
        assert_eq!(
            moving_average_open(&[0.0, 1.0, 2.0, 3.0, 10.0], 1),
            vec![0.0, 1.0, 2.0, 5.0, 10.0]
        );
        assert_eq!(
            moving_average_closed(&[3.0, 0.0, 0.0, 0.0], 1),
            vec![1.0, 1.0, 0.0, 1.0]
        );
    }
}
