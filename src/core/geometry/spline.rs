use bezier_rs::{Bezier, TValue};
use glam::DVec2;

use super::site::Site;

/// Number of subdivisions of each bezier segment used to build its arc-length table.
const LENGTH_TABLE_STEPS: usize = 32;

const BISECTION_STEPS: usize = 24;

/// Consecutive control points closer than this are treated as one point.
pub const COINCIDENT_EPSILON: f64 = 1e-6;

/// A point on a spline with its unit tangent and running distance from the start.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SplinePoint {
    pub site: Site,
    pub tangent: DVec2,
    pub distance: f64,
}

/// One cubic segment of the spline with its arc-length lookup table.
#[derive(Debug, Clone)]
struct SplineSegment {
    curve: Bezier,
    start_distance: f64,
    /// Accumulated length at each of the `LENGTH_TABLE_STEPS + 1` parametric stations.
    lengths: Vec<f64>,
    chord: DVec2,
}

impl SplineSegment {
    fn new(curve: Bezier, start_distance: f64, chord: DVec2) -> Self {
        let mut lengths = Vec::with_capacity(LENGTH_TABLE_STEPS + 1);
        let mut previous = curve.evaluate(TValue::Parametric(0.0));
        let mut accumulated = 0.0;
        lengths.push(0.0);
        for step in 1..=LENGTH_TABLE_STEPS {
            let t = step as f64 / LENGTH_TABLE_STEPS as f64;
            let point = curve.evaluate(TValue::Parametric(t));
            accumulated += point.distance(previous);
            lengths.push(accumulated);
            previous = point;
        }
        Self {
            curve,
            start_distance,
            lengths,
            chord,
        }
    }

    fn length(&self) -> f64 {
        self.lengths[LENGTH_TABLE_STEPS]
    }

    /// Convert a length along this segment into the parametric position.
    ///
    /// The table brackets the position. Bisection on the chord from the bracket start refines it.
    fn parametric(&self, local_distance: f64) -> f64 {
        if local_distance <= 0.0 {
            return 0.0;
        }
        if local_distance >= self.length() {
            return 1.0;
        }
        let step = self
            .lengths
            .partition_point(|length| *length < local_distance)
            .clamp(1, LENGTH_TABLE_STEPS);
        let remaining = local_distance - self.lengths[step - 1];
        let (mut low, mut high) = (
            (step - 1) as f64 / LENGTH_TABLE_STEPS as f64,
            step as f64 / LENGTH_TABLE_STEPS as f64,
        );
        let origin = self.curve.evaluate(TValue::Parametric(low));
        for _ in 0..BISECTION_STEPS {
            let middle = 0.5 * (low + high);
            if self.curve.evaluate(TValue::Parametric(middle)).distance(origin) < remaining {
                low = middle;
            } else {
                high = middle;
            }
        }
        0.5 * (low + high)
    }

    fn evaluate(&self, local_distance: f64) -> (Site, DVec2) {
        let t = self.parametric(local_distance);
        let point = self.curve.evaluate(TValue::Parametric(t));
        let tangent = self.curve.tangent(TValue::Parametric(t));
        let tangent = if tangent.is_finite() && tangent.length_squared() > 1e-18 {
            tangent.normalize()
        } else {
            self.chord.normalize_or_zero()
        };
        (Site::new(point.x, point.y), tangent)
    }
}

/// Centerline of a road.
///
/// This is a Catmull-Rom spline through the control points, stored as a chain of cubic
/// bezier curves from the bezier-rs crate and parameterized by arc length.
#[derive(Debug, Clone)]
pub struct CenterlineSpline {
    segments: Vec<SplineSegment>,
    length: f64,
    closed: bool,
}

impl CenterlineSpline {
    /// Create a spline passing through all the control points.
    ///
    /// Consecutive coincident points are collapsed first.
    /// Return None if fewer than two distinct points remain, or if any point is not finite.
    /// A closed spline also needs at least three distinct points; otherwise it is built open.
    pub fn catmull_rom(points: &[Site], closed: bool) -> Option<Self> {
        if points.iter().any(|site| !site.is_finite()) {
            return None;
        }
        let mut points = dedup_points(points);
        if closed
            && points.len() > 1
            && points[0].distance(&points[points.len() - 1]) <= COINCIDENT_EPSILON
        {
            points.pop();
        }
        if points.len() < 2 {
            return None;
        }
        let closed = closed && points.len() >= 3;

        let count = points.len();
        let at = |index: isize| -> Site {
            if closed {
                points[index.rem_euclid(count as isize) as usize]
            } else {
                points[index.clamp(0, count as isize - 1) as usize]
            }
        };

        let segment_count = if closed { count } else { count - 1 };
        let mut segments = Vec::with_capacity(segment_count);
        let mut distance = 0.0;
        for i in 0..segment_count as isize {
            let (p0, p1, p2, p3) = (at(i - 1), at(i), at(i + 1), at(i + 2));
            let handle0 = p1.offset(p0.vector_to(&p2) / 6.0);
            let handle1 = p2.offset(p1.vector_to(&p3) / -6.0);
            let curve = Bezier::from_cubic_coordinates(
                p1.x, p1.y, handle0.x, handle0.y, handle1.x, handle1.y, p2.x, p2.y,
            );
            let segment = SplineSegment::new(curve, distance, p1.vector_to(&p2));
            distance += segment.length();
            segments.push(segment);
        }

        Some(Self {
            segments,
            length: distance,
            closed,
        })
    }

    /// Get the total arc length of the spline.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Evaluate the spline at a running distance from its start.
    ///
    /// The distance is clamped to the spline, or wrapped around it if the spline is closed.
    pub fn evaluate(&self, distance: f64) -> SplinePoint {
        let distance = if self.closed && self.length > 0.0 {
            distance.rem_euclid(self.length)
        } else {
            distance.clamp(0.0, self.length)
        };
        let index = self
            .segments
            .partition_point(|segment| segment.start_distance <= distance)
            .saturating_sub(1);
        let segment = &self.segments[index];
        let (site, tangent) = segment.evaluate(distance - segment.start_distance);
        SplinePoint {
            site,
            tangent,
            distance,
        }
    }

    /// Sample the spline at uniform arc-length steps no longer than `spacing`.
    ///
    /// Open splines are sampled from start to end inclusive.
    /// Closed splines skip the final sample, which would duplicate the first one.
    pub fn sample(&self, spacing: f64) -> Vec<SplinePoint> {
        // the tolerance keeps a length of exactly n spacings from producing an extra sample
        let count = (self.length / spacing - 1e-9).ceil().max(1.0) as usize;
        let step = self.length / count as f64;
        let last = if self.closed { count - 1 } else { count };
        (0..=last)
            .map(|i| {
                let distance = if i == count {
                    self.length
                } else {
                    i as f64 * step
                };
                let mut point = self.evaluate(distance);
                point.distance = distance;
                point
            })
            .collect()
    }
}

/// Remove consecutive duplicates from the control points.
fn dedup_points(points: &[Site]) -> Vec<Site> {
    let mut result: Vec<Site> = Vec::with_capacity(points.len());
    for site in points {
        if let Some(last) = result.last() {
            if last.distance(site) <= COINCIDENT_EPSILON {
                continue;
            }
        }
        result.push(*site);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_line() {
        let spline =
            CenterlineSpline::catmull_rom(&[Site::new(0.0, 0.0), Site::new(100.0, 0.0)], false)
                .unwrap();
        assert!((spline.length() - 100.0).abs() < 1e-6);

        let point = spline.evaluate(25.0);
        assert!(point.site.distance(&Site::new(25.0, 0.0)) < 1e-3);
        assert!((point.tangent - DVec2::X).length() < 1e-9);
    }

    #[test]
    fn test_sample_spacing() {
        let spline = CenterlineSpline::catmull_rom(
            &[
                Site::new(0.0, 0.0),
                Site::new(50.0, 20.0),
                Site::new(100.0, 0.0),
            ],
            false,
        )
        .unwrap();
        let samples = spline.sample(2.0);
        assert_eq!(samples[0].distance, 0.0);
        assert_eq!(samples[samples.len() - 1].distance, spline.length());
        assert!(samples
            .windows(2)
            .all(|pair| pair[1].distance > pair[0].distance
                && pair[1].distance - pair[0].distance <= 2.0 + 1e-9));
        assert!(samples[samples.len() - 1]
            .site
            .distance(&Site::new(100.0, 0.0))
            < 1e-6);
        // The curve passes through its control points.
        assert!(samples
            .iter()
            .any(|sample| sample.site.distance(&Site::new(50.0, 20.0)) < 1.5));
    }

    #[test]
    fn test_invalid_points() {
        assert!(CenterlineSpline::catmull_rom(&[Site::new(1.0, 1.0)], false).is_none());
        assert!(CenterlineSpline::catmull_rom(
            &[Site::new(1.0, 1.0), Site::new(1.0, 1.0)],
            false
        )
        .is_none());
        assert!(CenterlineSpline::catmull_rom(
            &[Site::new(1.0, 1.0), Site::new(f64::NAN, 1.0)],
            false
        )
        .is_none());
    }

    #[test]
    fn test_closed_ring() {
        let radius = 20.0;
        let points = (0..16)
            .map(|i| {
                let angle = i as f64 / 16.0 * std::f64::consts::TAU;
                Site::new(radius * angle.cos(), radius * angle.sin())
            })
            .collect::<Vec<_>>();
        let spline = CenterlineSpline::catmull_rom(&points, true).unwrap();
        assert!(spline.is_closed());
        let circumference = std::f64::consts::TAU * radius;
        assert!((spline.length() - circumference).abs() < circumference * 0.01);

        let samples = spline.sample(1.0);
        let first = samples[0];
        let last = samples[samples.len() - 1];
        assert!(last.distance < spline.length());
        assert!(first.site.distance(&last.site) <= 1.0 + 1e-6);

        // Wrapped evaluation
        let wrapped = spline.evaluate(spline.length() + 1.0);
        assert!((wrapped.distance - 1.0).abs() < 1e-9);
    }
}
