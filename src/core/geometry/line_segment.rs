use rstar::{PointDistance, RTreeObject};

use super::site::Site;

/// Parallel or degenerate segments are rejected below this cross product.
const PARALLEL_EPSILON: f64 = 1e-12;

/// Straight piece of a sampled road centerline.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineSegment(pub Site, pub Site);

/// Intersection of two line segments.
///
/// `t_self` and `t_other` are the parametric positions (0.0 at the start, 1.0 at the end)
/// of the intersection on each segment.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SegmentIntersection {
    pub site: Site,
    pub t_self: f64,
    pub t_other: f64,
}

impl LineSegment {
    /// Create a line segment from two sites.
    pub fn new(start: Site, end: Site) -> Self {
        Self(start, end)
    }

    pub fn length(&self) -> f64 {
        self.0.distance(&self.1)
    }

    /// Find the single point where two segments cross, ends included.
    ///
    /// Parallel segments give None, overlapping collinear ones too.
    pub fn get_intersection(&self, other: &Self) -> Option<SegmentIntersection> {
        let r = self.0.vector_to(&self.1);
        let s = other.0.vector_to(&other.1);
        let denom = r.perp_dot(s);
        if denom.abs() < PARALLEL_EPSILON {
            return None;
        }

        let qp = self.0.vector_to(&other.0);
        let t_self = qp.perp_dot(s) / denom;
        let t_other = qp.perp_dot(r) / denom;
        if !(0.0..=1.0).contains(&t_self) || !(0.0..=1.0).contains(&t_other) {
            return None;
        }

        Some(SegmentIntersection {
            site: self.0.lerp(&self.1, t_self),
            t_self,
            t_other,
        })
    }

    /// Calculate the perpendicular projection of the site on the line segment.
    ///
    /// The projection is clamped to the segment; the parametric position is returned with it.
    pub fn get_projection(&self, site: &Site) -> (Site, f64) {
        let b = self.0.vector_to(&self.1);
        let mag_b2 = b.length_squared();
        if mag_b2 == 0.0 {
            return (self.0, 0.0);
        }
        let t = (self.0.vector_to(site).dot(b) / mag_b2).clamp(0.0, 1.0);
        (self.0.lerp(&self.1, t), t)
    }

    /// Calculate the distance from the site to the line segment.
    pub fn get_distance(&self, site: &Site) -> f64 {
        let (projection, _) = self.get_projection(site);
        projection.distance(site)
    }
}

impl RTreeObject for LineSegment {
    type Envelope = rstar::AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        rstar::AABB::from_corners(self.0.as_array(), self.1.as_array())
    }
}

impl PointDistance for LineSegment {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let site = Site::new(point[0], point[1]);
        let (projection, _) = self.get_projection(&site);
        projection.distance_2(&site)
    }
}
