/// A slope expressed as an angle from the horizontal.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct Slope(f64);

impl Slope {
    pub fn from_radians(radians: f64) -> Self {
        Self(radians)
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self(degrees.to_radians())
    }

    /// Create a slope from a grade (rise over run).
    pub fn from_grade(grade: f64) -> Self {
        Self(grade.atan())
    }

    pub fn radians(&self) -> f64 {
        self.0
    }

    pub fn degrees(&self) -> f64 {
        self.0.to_degrees()
    }

    /// Rise per meter of horizontal run.
    pub fn grade(&self) -> f64 {
        self.0.tan()
    }

    /// Get the gentler of two slopes.
    pub fn min(self, other: Self) -> Self {
        if other.0 < self.0 {
            other
        } else {
            self
        }
    }
}

/// Priority of a road. Higher priority wins every conflict.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(i32);

impl Priority {
    pub fn new(priority: i32) -> Self {
        Self(priority)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slope_conversions() {
        let slope = Slope::from_degrees(45.0);
        assert!((slope.grade() - 1.0).abs() < 1e-12);
        assert!((Slope::from_grade(0.1).grade() - 0.1).abs() < 1e-12);
        assert!((Slope::from_radians(slope.radians()).degrees() - 45.0).abs() < 1e-12);
        assert_eq!(
            Slope::from_degrees(10.0).min(Slope::from_degrees(5.0)),
            Slope::from_degrees(5.0)
        );
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::new(3) > Priority::new(1));
        assert_eq!(Priority::default().value(), 0);
    }
}
