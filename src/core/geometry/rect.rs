use glam::DVec2;

use super::site::Site;

/// Representation of a rectangle oriented along a direction.
///
/// The rectangle spans `behind` meters backward and `ahead` meters forward along `tangent`,
/// and `across` meters to each side along the normal.
#[derive(Debug, Copy, Clone)]
pub struct OrientedRect {
    center: Site,
    tangent: DVec2,
    normal: DVec2,
    behind: f64,
    ahead: f64,
    across: f64,
}

impl OrientedRect {
    /// Create a rectangle around a center site.
    ///
    /// `tangent` is expected to be a unit vector.
    pub fn new(center: Site, tangent: DVec2, behind: f64, ahead: f64, across: f64) -> Self {
        Self {
            center,
            tangent,
            normal: tangent.perp(),
            behind,
            ahead,
            across,
        }
    }

    /// Local coordinates `(along, across)` of the site.
    ///
    /// Return None if the site is outside the rectangle.
    ///
    /// `across` is signed; positive values lie on the left of the tangent.
    pub fn local_coordinates(&self, site: &Site) -> Option<(f64, f64)> {
        let offset = self.center.vector_to(site);
        let along = offset.dot(self.tangent);
        let across = offset.dot(self.normal);
        if along < -self.behind || along > self.ahead || across.abs() > self.across {
            return None;
        }
        Some((along, across))
    }

    /// Get the bounds of the rectangle and return the corner (min, max) sites.
    pub fn get_bounds(&self) -> (Site, Site) {
        let corners = [
            (-self.behind, -self.across),
            (-self.behind, self.across),
            (self.ahead, -self.across),
            (self.ahead, self.across),
        ]
        .map(|(along, across)| self.center.offset(self.tangent * along + self.normal * across));

        corners.iter().fold(
            (
                Site::new(f64::INFINITY, f64::INFINITY),
                Site::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            ),
            |(min, max), corner| {
                (
                    Site::new(min.x.min(corner.x), min.y.min(corner.y)),
                    Site::new(max.x.max(corner.x), max.y.max(corner.y)),
                )
            },
        )
    }
}
