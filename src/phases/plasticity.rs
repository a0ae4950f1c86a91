use bytemuck::{Pod, Zeroable};

use crate::error::{invalid_phase, SphResult};
use crate::math::SymMatrix3;

/// Drucker-Prager constants of one plastic phase.
///
/// Yield function, tension positive:
/// `f(σ) = sqrt(J2) + alpha_phi I1 - k_c`, admissible when `f <= 0`.
/// `alpha_phi` and `k_c` match the Mohr-Coulomb criterion in plane strain.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DruckerPragerCte {
    pub phase_id: u32,

    /// Cohesion (Pa)
    pub cohesion: f32,

    /// Internal friction angle (rad)
    pub friction_angle: f32,

    /// Dilatancy angle (rad), zero for isochoric flow
    pub dilatancy_angle: f32,

    pub young_modulus: f32,
    pub poisson_ratio: f32,

    pub alpha_phi: f32,
    pub alpha_psi: f32,
    pub k_c: f32,
    pub shear_modulus: f32,
    pub bulk_modulus: f32,
}

impl DruckerPragerCte {
    pub fn new(
        phase_id: u16,
        cohesion: f32,
        friction_angle: f32,
        dilatancy_angle: f32,
        young_modulus: f32,
        poisson_ratio: f32,
    ) -> Self {
        let tan_phi = friction_angle.tan();
        let tan_psi = dilatancy_angle.tan();
        let den_phi = (9.0 + 12.0 * tan_phi * tan_phi).sqrt();
        let den_psi = (9.0 + 12.0 * tan_psi * tan_psi).sqrt();

        Self {
            phase_id: phase_id as u32,
            cohesion,
            friction_angle,
            dilatancy_angle,
            young_modulus,
            poisson_ratio,
            alpha_phi: tan_phi / den_phi,
            alpha_psi: tan_psi / den_psi,
            k_c: 3.0 * cohesion / den_phi,
            shear_modulus: young_modulus / (2.0 * (1.0 + poisson_ratio)),
            bulk_modulus: young_modulus / (3.0 * (1.0 - 2.0 * poisson_ratio)),
        }
    }

    pub fn phase(&self) -> u16 {
        self.phase_id as u16
    }

    pub fn yield_function(&self, stress: &SymMatrix3) -> f32 {
        stress.j2().max(0.0).sqrt() + self.alpha_phi * stress.trace() - self.k_c
    }

    /// Map a trial stress back onto the yield surface.
    ///
    /// Returns the admissible stress and whether plastic flow occurred. The
    /// flow rule is non-associated, with the dilatancy angle driving the
    /// volumetric part; trial states beyond the cone apex return to the apex.
    pub fn return_map(&self, trial: &SymMatrix3) -> (SymMatrix3, bool) {
        let f = self.yield_function(trial);
        if f <= 0.0 {
            return (*trial, false);
        }

        let i1 = trial.trace();
        let s = trial.deviatoric();
        let sqrt_j2 = trial.j2().max(0.0).sqrt();
        let g = self.shear_modulus;
        let k = self.bulk_modulus;

        let dlambda = f / (g + 9.0 * k * self.alpha_phi * self.alpha_psi);
        let sqrt_j2_new = sqrt_j2 - g * dlambda;

        let (s_new, i1_new) = if sqrt_j2_new >= 0.0 && sqrt_j2 > 0.0 {
            (s * (sqrt_j2_new / sqrt_j2), i1 - 9.0 * k * self.alpha_psi * dlambda)
        } else if self.alpha_phi > 0.0 {
            (SymMatrix3::ZERO, self.k_c / self.alpha_phi)
        } else {
            (SymMatrix3::ZERO, i1)
        };

        let mut stress = s_new + SymMatrix3::diagonal(i1_new / 3.0);

        // Remove any rounding overshoot by scaling the deviator
        let residual = self.yield_function(&stress);
        if residual > 0.0 {
            let sqrt_j2_now = stress.j2().max(0.0).sqrt();
            let scale = if sqrt_j2_now > 0.0 {
                ((sqrt_j2_now - residual) / sqrt_j2_now).max(0.0)
            } else {
                0.0
            };
            stress = stress.deviatoric() * scale + SymMatrix3::diagonal(stress.trace() / 3.0);
        }

        (stress, true)
    }

    pub fn validate(&self) -> SphResult<()> {
        let phase = self.phase();
        if !(self.cohesion >= 0.0) {
            return Err(invalid_phase(phase, "cohesion must not be negative"));
        }
        let right = std::f32::consts::FRAC_PI_2;
        if !(self.friction_angle >= 0.0 && self.friction_angle < right) {
            return Err(invalid_phase(phase, "friction angle must lie in [0, 90) degrees"));
        }
        if !(self.dilatancy_angle >= 0.0 && self.dilatancy_angle <= self.friction_angle) {
            return Err(invalid_phase(phase, "dilatancy angle must lie in [0, friction angle]"));
        }
        if !(self.young_modulus > 0.0) {
            return Err(invalid_phase(phase, "Young modulus must be positive"));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(invalid_phase(phase, "Poisson ratio must lie in (-1, 0.5)"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sand() -> DruckerPragerCte {
        DruckerPragerCte::new(2, 100.0, 30f32.to_radians(), 5f32.to_radians(), 5.0e6, 0.3)
    }

    #[test]
    fn test_derived_constants() {
        let dp = sand();
        let tan_phi = 30f32.to_radians().tan();
        let den = (9.0 + 12.0 * tan_phi * tan_phi).sqrt();
        assert!((dp.alpha_phi - tan_phi / den).abs() < 1e-6);
        assert!((dp.k_c - 300.0 / den).abs() < 1e-3);
        assert!((dp.shear_modulus - 5.0e6 / 2.6).abs() < 1.0);
        assert!(dp.validate().is_ok());
    }

    #[test]
    fn test_admissible_stress_is_untouched() {
        let dp = sand();
        let stress = SymMatrix3::new(-1000.0, 50.0, 0.0, -1000.0, 0.0, -1200.0);
        assert!(dp.yield_function(&stress) < 0.0);
        let (out, yielded) = dp.return_map(&stress);
        assert!(!yielded);
        assert_eq!(out, stress);
    }

    #[test]
    fn test_shear_overload_returns_to_surface() {
        let dp = sand();
        let trial = SymMatrix3::new(-1000.0, 5000.0, 0.0, -1000.0, 0.0, -1000.0);
        assert!(dp.yield_function(&trial) > 0.0);

        let (out, yielded) = dp.return_map(&trial);
        assert!(yielded);
        let f = dp.yield_function(&out);
        assert!(f <= 1e-3 * (dp.k_c + out.trace().abs()), "f = {}", f);
        assert!(f.abs() < 1.0, "return should land on the surface, f = {}", f);
    }

    #[test]
    fn test_tension_returns_to_apex() {
        let dp = sand();
        let trial = SymMatrix3::diagonal(1.0e5);
        let (out, yielded) = dp.return_map(&trial);
        assert!(yielded);
        assert!(out.j2() < 1e-3);
        assert!((out.trace() - dp.k_c / dp.alpha_phi).abs() < 1e-2);
        assert!(dp.yield_function(&out) <= 1e-3);
    }

    #[test]
    fn test_frictionless_phase_is_von_mises() {
        let clay = DruckerPragerCte::new(1, 500.0, 0.0, 0.0, 1.0e6, 0.45);
        assert_eq!(clay.alpha_phi, 0.0);
        let trial = SymMatrix3::new(0.0, 2000.0, 0.0, 0.0, 0.0, 0.0);
        let (out, yielded) = clay.return_map(&trial);
        assert!(yielded);
        assert!((out.j2().sqrt() - clay.k_c).abs() < 1e-2);
        assert!((out.trace() - trial.trace()).abs() < 1e-3);
    }

    #[test]
    fn test_validation_rejects_bad_angles() {
        let bad = DruckerPragerCte::new(0, 10.0, 20f32.to_radians(), 25f32.to_radians(), 1.0e6, 0.3);
        assert!(bad.validate().is_err());
        let bad = DruckerPragerCte::new(0, -1.0, 20f32.to_radians(), 0.0, 1.0e6, 0.3);
        assert!(bad.validate().is_err());
    }
}
