//! Tunables for the intersection engine.

use conix_solve::SolverSettings;
use serde::{Deserialize, Serialize};

use crate::{IntersectError, Result};

/// Intersection parameters.
///
/// Lengths are relative: `tolerance` and `march_step` are multiplied by the
/// size of the region where the operands overlap (never less than 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntersectSettings {
    /// Acceptance tolerance for a point to lie on both operands.
    pub tolerance: f64,
    /// Grid resolution per parameter axis when searching for seeds and
    /// touching points.
    pub seed_grid: usize,
    /// Largest marching step.
    pub march_step: f64,
    /// Upper bound on points per traced fragment.
    pub max_march_points: usize,
    /// Torus meridians used as seed sources for cylinder/torus pairs; eight
    /// times this many rulings sample each branch of a cylinder/cylinder
    /// curve.
    pub cross_sections: usize,
    /// Samples used when clipping curves to the domain rectangles.
    pub clip_samples: usize,
    /// Samples used when a parameter-space image has to be interpolated.
    pub projection_samples: usize,
    /// Settings passed to every numerical solve.
    pub solver: SolverSettings,
}

impl Default for IntersectSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            seed_grid: 24,
            march_step: 0.02,
            max_march_points: 4000,
            cross_sections: 8,
            clip_samples: 64,
            projection_samples: 64,
            solver: SolverSettings::default(),
        }
    }
}

impl IntersectSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(IntersectError::InvalidSettings(
                "tolerance must be between 0 and 1".into(),
            ));
        }
        if self.seed_grid < 2 {
            return Err(IntersectError::InvalidSettings(
                "seed_grid must be at least 2".into(),
            ));
        }
        if !(self.march_step > 0.0 && self.march_step <= 0.5) {
            return Err(IntersectError::InvalidSettings(
                "march_step must be in (0, 0.5]".into(),
            ));
        }
        if self.max_march_points < 2 {
            return Err(IntersectError::InvalidSettings(
                "max_march_points must be at least 2".into(),
            ));
        }
        if self.cross_sections == 0 {
            return Err(IntersectError::InvalidSettings(
                "cross_sections must be positive".into(),
            ));
        }
        if self.clip_samples < 2 || self.projection_samples < 2 {
            return Err(IntersectError::InvalidSettings(
                "clip_samples and projection_samples must be at least 2".into(),
            ));
        }
        self.solver.validate()?;
        Ok(())
    }

    /// Rulings sampled per branch of a cylinder/cylinder curve.
    pub fn ruling_samples(&self) -> usize {
        8 * self.cross_sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_valid() {
        assert!(IntersectSettings::default().validate().is_ok());
        assert_eq!(IntersectSettings::default().ruling_samples(), 64);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let bad = [
            IntersectSettings {
                tolerance: 0.0,
                ..Default::default()
            },
            IntersectSettings {
                seed_grid: 1,
                ..Default::default()
            },
            IntersectSettings {
                march_step: f64::NAN,
                ..Default::default()
            },
            IntersectSettings {
                cross_sections: 0,
                ..Default::default()
            },
        ];
        for s in &bad {
            assert!(matches!(s.validate(), Err(IntersectError::InvalidSettings(_))));
        }
    }

    #[test]
    fn test_solver_settings_checked() {
        let s = IntersectSettings {
            solver: SolverSettings {
                max_iterations: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(IntersectError::Solver(_))));
    }

    #[test]
    fn test_settings_partial_json() {
        let s: IntersectSettings = serde_json::from_str(r#"{"cross_sections": 12}"#).unwrap();
        assert_eq!(s.cross_sections, 12);
        assert_eq!(s.seed_grid, 24);
    }
}
