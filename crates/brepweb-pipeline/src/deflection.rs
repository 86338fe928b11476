//! Deflection Estimator: per-part tessellation tolerances.
//!
//! The linear deflection follows each part's own size, so small features
//! on a large assembly keep their detail while big parts are capped. Open
//! shells and faces get 0.6 of the solid tolerance.
//!
//! | largest extent `d` | linear deflection      |
//! |--------------------|------------------------|
//! | `d < 100`          | `max(0.03, d * 0.002)` |
//! | `100 <= d < 1000`  | `max(0.1, d * 0.002)`  |
//! | `d >= 1000`        | `min(d * 0.0025, 4.0)` |

use brepweb_core::{BoundingBox, KernelError, TessellationParams};

use crate::record::ShapeClass;

/// Angular deflection used for every part, in radians.
pub const ANGULAR_DEFLECTION: f64 = 0.25;

/// Linear deflection when a part cannot be measured.
pub const FALLBACK_DEFLECTION: f64 = 1.0;

const SHELL_FACTOR: f64 = 0.6;

/// Linear deflection for a part whose largest extent is `max_dimension`.
pub fn linear_deflection(max_dimension: f64, shell_or_face: bool) -> f64 {
    if !max_dimension.is_finite() || max_dimension < 0.0 {
        return FALLBACK_DEFLECTION;
    }
    let factor = if shell_or_face { SHELL_FACTOR } else { 1.0 };
    let d = max_dimension;
    let base = if d < 100.0 {
        (d * 0.002).max(0.03)
    } else if d < 1000.0 {
        (d * 0.002).max(0.1)
    } else {
        (d * 0.0025).min(4.0)
    };
    base * factor
}

/// Tolerances for the parts of one job.
#[derive(Debug, Clone, Copy)]
pub struct DeflectionEstimator {
    global_max_dimension: f64,
    angular: f64,
}

impl DeflectionEstimator {
    /// `global_max_dimension` is the whole model's largest extent. It is kept
    /// as job context; each part is sized by its own box.
    pub fn new(global_max_dimension: f64, angular: f64) -> Self {
        Self {
            global_max_dimension,
            angular,
        }
    }

    pub fn global_max_dimension(&self) -> f64 {
        self.global_max_dimension
    }

    /// Linear deflection for a part given the outcome of measuring it.
    pub fn linear(&self, bounds: Result<BoundingBox, KernelError>, class: ShapeClass) -> f64 {
        match bounds {
            Ok(bounds) if !bounds.is_degenerate() => {
                linear_deflection(bounds.max_dimension() as f64, class.is_shell_or_face())
            }
            Ok(_) => FALLBACK_DEFLECTION,
            Err(err) => {
                tracing::debug!(%err, "cannot measure part, using fallback deflection");
                FALLBACK_DEFLECTION
            }
        }
    }

    /// Absolute tessellation parameters for a linear deflection.
    pub fn params(&self, linear: f64) -> TessellationParams {
        TessellationParams::absolute(linear, self.angular)
    }
}

impl Default for DeflectionEstimator {
    fn default() -> Self {
        Self::new(0.0, ANGULAR_DEFLECTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_boundary_values() {
        assert!(close(linear_deflection(50.0, false), 0.1));
        assert!(close(linear_deflection(500.0, false), 1.0));
        assert!(close(linear_deflection(2000.0, false), 4.0));
        assert!(close(linear_deflection(50.0, true), 0.06));
    }

    #[test]
    fn test_floors_and_band_edges() {
        assert!(close(linear_deflection(1.0, false), 0.03));
        assert!(close(linear_deflection(100.0, false), 0.2));
        assert!(close(linear_deflection(999.0, false), 1.998));
        assert!(close(linear_deflection(1000.0, false), 2.5));
        assert!(close(linear_deflection(1000.0, true), 1.5));
    }

    #[test]
    fn test_unmeasurable_parts_use_fallback() {
        let estimator = DeflectionEstimator::default();
        let err = KernelError::Degenerate("empty".into());
        assert_eq!(estimator.linear(Err(err), ShapeClass::Solid), FALLBACK_DEFLECTION);
        assert_eq!(estimator.linear(Ok(BoundingBox::empty()), ShapeClass::Shell), FALLBACK_DEFLECTION);
        assert_eq!(linear_deflection(f64::NAN, false), FALLBACK_DEFLECTION);
    }

    #[test]
    fn test_part_size_not_global_size() {
        let estimator = DeflectionEstimator::new(5000.0, ANGULAR_DEFLECTION);
        let small = BoundingBox::new(Vec3::ZERO, Vec3::new(50.0, 10.0, 5.0));
        assert!(close(estimator.linear(Ok(small), ShapeClass::Solid), 0.1));
        assert!(close(estimator.linear(Ok(small), ShapeClass::Face), 0.06));
        assert!(close(estimator.linear(Ok(small), ShapeClass::Unknown), 0.1));
        assert_eq!(estimator.global_max_dimension(), 5000.0);
    }

    #[test]
    fn test_params_are_absolute() {
        let params = DeflectionEstimator::default().params(0.5);
        assert_eq!(params.linear_deflection, 0.5);
        assert_eq!(params.angular_deflection, 0.25);
        assert!(!params.relative);
    }

    proptest! {
        #[test]
        fn prop_bounded(d in 0.0f64..1.0e6) {
            let solid = linear_deflection(d, false);
            prop_assert!((0.03..=4.0).contains(&solid));
        }

        #[test]
        fn prop_shell_factor(d in 0.0f64..1.0e6) {
            let solid = linear_deflection(d, false);
            let shell = linear_deflection(d, true);
            prop_assert!((shell - solid * 0.6).abs() < 1e-12);
        }

        #[test]
        fn prop_monotone(a in 0.0f64..1.0e5, b in 0.0f64..1.0e5) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(linear_deflection(lo, false) <= linear_deflection(hi, false));
        }
    }
}
