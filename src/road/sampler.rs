use crate::{
    core::{
        container::handle::RoadId,
        geometry::{
            site::Site,
            spline::{CenterlineSpline, COINCIDENT_EPSILON},
        },
    },
    error::Anomaly,
};

use super::{definition::ControlCurve, section::CrossSection};

/// Cross-sections of one road produced by the sampler.
#[derive(Debug, Clone)]
pub struct SampledRoad {
    pub sections: Vec<CrossSection>,
    pub closed: bool,
    pub length: f64,
}

/// Sampler turning control curves into arc-length parameterized cross-sections.
#[derive(Debug, Clone)]
pub struct SplineSampler {
    spacing: f64,
    ring_closure_tolerance: f64,
}

impl SplineSampler {
    pub fn new(spacing: f64, ring_closure_tolerance: f64) -> Self {
        Self {
            spacing,
            ring_closure_tolerance,
        }
    }

    /// Sample a road centerline.
    ///
    /// A curve whose ends meet within the closure tolerance, and which is long enough not to be
    /// a stub, is sampled as a closed ring.
    pub fn sample(&self, road: RoadId, curve: &ControlCurve) -> Result<SampledRoad, Anomaly> {
        let mut points = distinct_points(curve.points());
        if points.len() < 2 {
            return Err(Anomaly::InvalidCurve {
                road,
                points: points.len(),
            });
        }

        let closed = self.is_ring(&points);
        if closed {
            points.pop();
        }

        let spline = CenterlineSpline::catmull_rom(&points, closed).ok_or(
            Anomaly::InvalidCurve {
                road,
                points: points.len(),
            },
        )?;

        let sections = spline
            .sample(self.spacing)
            .iter()
            .enumerate()
            .map(|(index, point)| CrossSection::new(road, index, point))
            .collect::<Vec<_>>();

        Ok(SampledRoad {
            sections,
            closed: spline.is_closed(),
            length: spline.length(),
        })
    }

    fn is_ring(&self, points: &[Site]) -> bool {
        if points.len() < 4 {
            return false;
        }
        let (first, last) = (points[0], points[points.len() - 1]);
        let perimeter = points
            .windows(2)
            .map(|pair| pair[0].distance(&pair[1]))
            .sum::<f64>();
        first.distance(&last) <= self.ring_closure_tolerance
            && perimeter > 4.0 * self.ring_closure_tolerance
    }
}

/// Finite control points with consecutive duplicates collapsed.
fn distinct_points(points: &[Site]) -> Vec<Site> {
    let mut result: Vec<Site> = Vec::with_capacity(points.len());
    for site in points.iter().filter(|site| site.is_finite()) {
        if result
            .last()
            .map_or(true, |last| last.distance(site) > COINCIDENT_EPSILON)
        {
            result.push(*site);
        }
    }
    result
}
