//! Effective viscosity of the non-Newtonian laws.

use super::{PhaseRheology, RheologyLaw};

/// Shear rates below this use the small-rate limit of each law
const MIN_SHEAR_RATE: f32 = 1.0e-6;

/// Effective viscosity `mu(γ̇)` clamped to the phase ceiling
pub fn effective_viscosity(rheology: &PhaseRheology, gamma_dot: f32) -> f32 {
    let gamma_dot = gamma_dot.max(0.0);
    let mu = match rheology.law() {
        RheologyLaw::Newtonian => rheology.visco,
        RheologyLaw::PowerLaw => power_law(rheology.visco, rheology.flow_index, gamma_dot),
        RheologyLaw::BinghamPapanastasiou => {
            rheology.visco + yield_term(rheology.tau_yield, rheology.papanastasiou_m, gamma_dot)
        }
        RheologyLaw::HerschelBulkleyPapanastasiou => {
            power_law(rheology.visco, rheology.flow_index, gamma_dot)
                + yield_term(rheology.tau_yield, rheology.papanastasiou_m, gamma_dot)
        }
    };
    mu.min(rheology.visco_max)
}

/// Shear-rate dependent stress at `gamma_dot`, `mu(γ̇) γ̇`
pub fn shear_stress(rheology: &PhaseRheology, gamma_dot: f32) -> f32 {
    effective_viscosity(rheology, gamma_dot) * gamma_dot
}

#[inline]
fn power_law(k: f32, n: f32, gamma_dot: f32) -> f32 {
    if n == 1.0 {
        return k;
    }
    k * gamma_dot.max(MIN_SHEAR_RATE).powf(n - 1.0)
}

/// `tau_y (1 - exp(-m γ̇)) / γ̇`, which tends to `tau_y m` as `γ̇ -> 0`
#[inline]
fn yield_term(tau_yield: f32, m: f32, gamma_dot: f32) -> f32 {
    if tau_yield == 0.0 {
        return 0.0;
    }
    let x = m * gamma_dot;
    if x < 1.0e-4 {
        // Series expansion avoids cancellation in 1 - exp(-x)
        tau_yield * m * (1.0 - 0.5 * x)
    } else {
        tau_yield * (-(-x).exp_m1()) / gamma_dot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newtonian_is_constant() {
        let r = PhaseRheology::newtonian(0, 1.0e-3);
        assert_eq!(effective_viscosity(&r, 0.0), 1.0e-3);
        assert_eq!(effective_viscosity(&r, 1000.0), 1.0e-3);
    }

    #[test]
    fn test_power_law_shear_thinning() {
        let r = PhaseRheology::new(0, RheologyLaw::PowerLaw, 2.0, 0.5, 0.0, 0.0, 1.0e6);
        let low = effective_viscosity(&r, 1.0);
        let high = effective_viscosity(&r, 100.0);
        assert!((low - 2.0).abs() < 1e-6);
        assert!((high - 0.2).abs() < 1e-5);

        // The zero-rate singularity is capped by the ceiling
        let capped = PhaseRheology::new(0, RheologyLaw::PowerLaw, 2.0, 0.5, 0.0, 0.0, 50.0);
        assert_eq!(effective_viscosity(&capped, 0.0), 50.0);
    }

    #[test]
    fn test_papanastasiou_limits() {
        let r = PhaseRheology::new(0, RheologyLaw::BinghamPapanastasiou, 0.1, 1.0, 100.0, 20.0, 1.0e9);

        // At zero rate the regularised viscosity is mu + tau_y m
        let zero = effective_viscosity(&r, 0.0);
        assert!((zero - (0.1 + 20.0 * 100.0)).abs() < 1e-2);

        // At high rate the stress approaches the Bingham line tau_y + mu γ̇
        let rate = 50.0;
        let stress = shear_stress(&r, rate);
        assert!((stress - (20.0 + 0.1 * rate)).abs() < 1e-3);
    }

    #[test]
    fn test_herschel_bulkley_combines_terms() {
        let r = PhaseRheology::new(
            0,
            RheologyLaw::HerschelBulkleyPapanastasiou,
            1.0,
            0.5,
            1000.0,
            10.0,
            1.0e9,
        );
        let rate: f32 = 4.0;
        let expected = 1.0 * rate.powf(-0.5) + 10.0 / rate;
        assert!((effective_viscosity(&r, rate) - expected).abs() < 1e-4);
    }
}
