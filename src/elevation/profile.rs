use crate::raster::falloff::smoothstep;

/// Keeps the influence finite at the anchor while letting it dominate every other profile there.
const ANCHOR_INFLUENCE_EPSILON: f64 = 1e-6;

/// Quintic Hermite interpolation on `[0, 1]`.
///
/// Values `p0`, `p1` and first derivatives `m0`, `m1` (per unit of `u`) are matched at both ends;
/// second derivatives are zero at both ends.
pub fn quintic_hermite(p0: f64, m0: f64, p1: f64, m1: f64, u: f64) -> f64 {
    let u = u.clamp(0.0, 1.0);
    let (u2, u3) = (u * u, u * u * u);
    let (u4, u5) = (u3 * u, u3 * u2);
    let h0 = 1.0 - 10.0 * u3 + 15.0 * u4 - 6.0 * u5;
    let h1 = u - 6.0 * u3 + 8.0 * u4 - 3.0 * u5;
    let h4 = -4.0 * u3 + 7.0 * u4 - 3.0 * u5;
    let h5 = 10.0 * u3 - 15.0 * u4 + 6.0 * u5;
    p0 * h0 + m0 * h1 + m1 * h4 + p1 * h5
}

/// Shape of a profile between its anchor and the blend distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileShape {
    /// Quintic Hermite from the anchor value and slope to the end value and slope.
    Hermite,
    /// Fade from the extension of the road beyond the blend distance toward the anchor value.
    Fade,
}

/// Elevation profile of a road leading away from a junction anchor.
///
/// Offsets are measured along the road from the anchor, in the direction the profile leads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JunctionProfile {
    pub anchor_value: f64,
    /// Grade at the anchor, positive when climbing away from it.
    pub anchor_slope: f64,
    pub blend_distance: f64,
    pub end_value: f64,
    /// Grade at the blend distance, positive when climbing away from the anchor.
    pub end_slope: f64,
    /// Length of the ease zone after the blend distance.
    pub ease_distance: f64,
    pub shape: ProfileShape,
}

impl JunctionProfile {
    /// Total length of road covered by the profile.
    pub fn reach(&self) -> f64 {
        self.blend_distance + self.ease_distance
    }

    /// Check if the profile covers the offset.
    pub fn covers(&self, offset: f64) -> bool {
        offset >= 0.0 && offset <= self.reach() && self.blend_distance > 0.0
    }

    /// Linear extension of the profile end.
    fn extension(&self, offset: f64) -> f64 {
        self.end_value + self.end_slope * (offset - self.blend_distance)
    }

    /// Elevation at the offset, given the road's original elevation there.
    ///
    /// Return None outside the profile.
    pub fn value(&self, offset: f64, original: f64) -> Option<f64> {
        if !self.covers(offset) {
            return None;
        }
        let d = self.blend_distance;
        if offset <= d {
            let u = offset / d;
            let value = match self.shape {
                ProfileShape::Hermite => quintic_hermite(
                    self.anchor_value,
                    self.anchor_slope * d,
                    self.end_value,
                    self.end_slope * d,
                    u,
                ),
                ProfileShape::Fade => {
                    let extension = self.extension(offset);
                    extension + (self.anchor_value - extension) * smoothstep(1.0 - u)
                }
            };
            return Some(value);
        }
        let extension = self.extension(offset);
        let t = smoothstep((offset - d) / self.ease_distance);
        Some(extension + (original - extension) * t)
    }

    /// Linear continuation of the anchor, for offsets just behind it.
    pub fn anchor_value_at(&self, offset: f64) -> f64 {
        self.anchor_value + self.anchor_slope * offset
    }

    /// Weight of the profile when combined with other profiles on the same road.
    ///
    /// Very large at the anchor so anchors stay exact, tapering to zero at the end of the reach.
    pub fn influence(&self, offset: f64) -> f64 {
        let d = self.blend_distance;
        let taper = 1.0 - smoothstep(offset / self.reach());
        let ratio = offset / d;
        taper / (ratio * ratio + ANCHOR_INFLUENCE_EPSILON)
    }
}

/// Limit the grade between consecutive samples without moving pinned samples.
///
/// A forward pass then a backward pass clamp each sample into the grade cone of its neighbor.
pub fn clamp_grade(values: &mut [f64], distances: &[f64], grade: f64, pinned: &[bool]) {
    let n = values.len();
    if n < 2 || !(grade.is_finite() && grade >= 0.0) {
        return;
    }
    let is_pinned = |i: usize| pinned.get(i).copied().unwrap_or(false);
    for i in 1..n {
        if is_pinned(i) {
            continue;
        }
        let limit = grade * (distances[i] - distances[i - 1]).abs();
        values[i] = values[i].clamp(values[i - 1] - limit, values[i - 1] + limit);
    }
    for i in (0..n - 1).rev() {
        if is_pinned(i) {
            continue;
        }
        let limit = grade * (distances[i + 1] - distances[i]).abs();
        values[i] = values[i].clamp(values[i + 1] - limit, values[i + 1] + limit);
    }
}
