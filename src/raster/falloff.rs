/// Hermite smoothstep of `t` clamped to [0, 1].
pub fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Monotonic falloff of the blend weight across the blend footprint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FalloffKind {
    #[default]
    Smoothstep,
    Cosine,
}

impl FalloffKind {
    /// Weight of the road target at the normalized distance `u` into the blend band.
    ///
    /// The weight is 1 at the edge of the core (`u = 0`) and 0 at the outer edge (`u = 1`).
    pub fn weight(&self, u: f64) -> f64 {
        if !(u < 1.0) {
            return 0.0;
        }
        let u = u.max(0.0);
        match self {
            FalloffKind::Smoothstep => 1.0 - smoothstep(u),
            FalloffKind::Cosine => 0.5 * (1.0 + (std::f64::consts::PI * u).cos()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_bounds() {
        for kind in [FalloffKind::Smoothstep, FalloffKind::Cosine] {
            assert_eq!(kind.weight(0.0), 1.0);
            assert_eq!(kind.weight(-1.0), 1.0);
            assert_eq!(kind.weight(1.0), 0.0);
            assert_eq!(kind.weight(f64::NAN), 0.0);
            assert!((kind.weight(0.5) - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_weight_is_monotonic() {
        for kind in [FalloffKind::Smoothstep, FalloffKind::Cosine] {
            let weights = (0..=100)
                .map(|i| kind.weight(i as f64 / 100.0))
                .collect::<Vec<_>>();
            assert!(weights.windows(2).all(|pair| pair[1] <= pair[0]));
        }
    }

    #[test]
    fn test_smoothstep() {
        assert_eq!(smoothstep(-2.0), 0.0);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(smoothstep(3.0), 1.0);
    }
}
