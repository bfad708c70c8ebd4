//! Three-flavour electron-antineutrino survival probability in vacuum.
//!
//! `P = 1 − cos⁴θ₁₃ sin²2θ₁₂ sin²Δ₂₁ − sin²2θ₁₃ (cos²θ₁₂ sin²Δ₃₁ + sin²θ₁₂ sin²Δ₃₂)`
//! with `Δᵢⱼ = 1.267 Δm²ᵢⱼ[eV²] L[m] / E[MeV]` and normal ordering
//! (`Δm²₃₁ = Δm²₃₂ + Δm²₂₁`).

use dyb_core::{Error, Result};

/// Phase factor of `Δm² L / 4E` in eV², m and MeV.
pub const PHASE_FACTOR: f64 = 1.266_93;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillation {
    pub sin_sq_2theta13: f64,
    pub sin_sq_2theta12: f64,
    /// eV²
    pub delta_m_sq_32: f64,
    /// eV²
    pub delta_m_sq_21: f64,
}

impl Oscillation {
    /// Reject mixing strengths outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        for (name, s) in [("sin²2θ₁₃", self.sin_sq_2theta13), ("sin²2θ₁₂", self.sin_sq_2theta12)] {
            if !(0.0..=1.0).contains(&s) {
                return Err(Error::Computation(format!("{name}={s} is outside [0, 1]")));
            }
        }
        Ok(())
    }

    /// Survival probability at baseline `l` (m) and antineutrino energy `e` (MeV).
    pub fn survival(&self, l: f64, e: f64) -> f64 {
        // cos²θ from sin²2θ, first octant
        let cos_sq = |s: f64| 0.5 * (1.0 + (1.0 - s).sqrt());
        let cos_sq_13 = cos_sq(self.sin_sq_2theta13);
        let cos_sq_12 = cos_sq(self.sin_sq_2theta12);
        let sin_sq_12 = 1.0 - cos_sq_12;

        let phase = |dm2: f64| (PHASE_FACTOR * dm2 * l / e).sin().powi(2);
        let dm2_31 = self.delta_m_sq_32 + self.delta_m_sq_21;

        1.0 - cos_sq_13 * cos_sq_13 * self.sin_sq_2theta12 * phase(self.delta_m_sq_21)
            - self.sin_sq_2theta13
                * (cos_sq_12 * phase(dm2_31) + sin_sq_12 * phase(self.delta_m_sq_32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn nominal() -> Oscillation {
        Oscillation {
            sin_sq_2theta13: 0.0853,
            sin_sq_2theta12: 0.851,
            delta_m_sq_32: 2.454e-3,
            delta_m_sq_21: 7.53e-5,
        }
    }

    #[test]
    fn no_mixing_means_no_disappearance() {
        let osc = Oscillation { sin_sq_2theta13: 0.0, sin_sq_2theta12: 0.0, ..nominal() };
        assert_relative_eq!(osc.survival(1580.0, 4.0), 1.0);
    }

    #[test]
    fn far_deficit_exceeds_near() {
        let osc = nominal();
        let near = osc.survival(364.0, 4.0);
        let far = osc.survival(1580.0, 4.0);
        assert!(far < near && near < 1.0);
        // close to the first θ₁₃ oscillation maximum the deficit is about sin²2θ₁₃
        assert!((1.0 - far) > 0.8 * osc.sin_sq_2theta13);
    }

    #[test]
    fn probability_is_bounded() {
        let osc = nominal();
        for i in 1..200 {
            let p = osc.survival(1580.0, 1.8 + 0.05 * i as f64);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn unphysical_mixing_is_rejected() {
        let osc = Oscillation { sin_sq_2theta13: 1.2, ..nominal() };
        assert!(osc.validate().is_err());
        assert!(nominal().validate().is_ok());
    }
}
