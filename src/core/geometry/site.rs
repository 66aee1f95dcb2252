use glam::DVec2;

/// Representation of a 2D site in heightmap meters.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Site {
    pub x: f64,
    pub y: f64,
}

impl From<DVec2> for Site {
    fn from(vector: DVec2) -> Self {
        Self::new(vector.x, vector.y)
    }
}

impl From<Site> for DVec2 {
    fn from(site: Site) -> Self {
        DVec2::new(site.x, site.y)
    }
}

impl Site {
    /// Create a site from x and y coordinates.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_2(other).sqrt()
    }

    /// Squared distance, for comparisons and R-tree queries.
    pub fn distance_2(&self, other: &Self) -> f64 {
        self.vector_to(other).length_squared()
    }

    /// Vector pointing from this site to the other site.
    pub fn vector_to(&self, other: &Self) -> DVec2 {
        DVec2::new(other.x - self.x, other.y - self.y)
    }

    /// Calculate the site moved by the vector.
    pub fn offset(&self, vector: DVec2) -> Self {
        Self::new(self.x + vector.x, self.y + vector.y)
    }

    /// Linear interpolation towards the other site.
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}
