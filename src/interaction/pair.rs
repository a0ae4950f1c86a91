//! Terms of one particle pair, evaluated in a fixed orientation.
//!
//! `a` is the side with the lower `(id, slot)` key. The momentum term is the
//! force exerted on `a`; `b` receives its negation, which keeps the discrete
//! momentum balance exact regardless of which side evaluates the pair.

use glam::Vec3;

use super::ViscoTreatment;
use crate::math::SymMatrix3;

/// State of one side of a pair
#[derive(Debug, Clone, Copy)]
pub struct PairSide {
    pub fluid: bool,
    pub phase: u16,
    pub vel: Vec3,
    /// Density after the floor
    pub rho: f32,
    pub mass: f32,
    pub pressure: f32,
    pub cs0: f32,
    pub visco_eff: f32,
    pub tau: SymMatrix3,
}

/// Pair settings fixed for one launch
#[derive(Debug, Clone, Copy)]
pub struct PairSettings {
    pub treatment: ViscoTreatment,
    /// Artificial viscosity coefficient between fluid particles
    pub visco: f32,
    /// Artificial viscosity coefficient between fluid and boundary
    pub visco_bound: f32,
    pub delta: Option<f32>,
    pub h: f32,
    pub eta2: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairTerms {
    /// Force on `a`, the force on `b` is `-momentum`
    pub momentum: Vec3,
    pub ar_a: f32,
    pub ar_b: f32,
    /// `dv.dr / (r^2 + eta^2)`
    pub visc_dt: f32,
}

/// Evaluate every term of the pair `(a, b)`.
///
/// `dr = pos_a - pos_b` and `fac` is the kernel gradient factor, so
/// `grad_a W_ab = dr * fac`.
pub fn evaluate(a: &PairSide, b: &PairSide, dr: Vec3, rr2: f32, fac: f32, settings: &PairSettings) -> PairTerms {
    let grad = dr * fac;
    let dv = a.vel - b.vel;
    let dot = dv.dot(dr);
    let dvgrad = dv.dot(grad);
    let dot_rr2 = dot / (rr2 + settings.eta2);

    let mut terms = PairTerms {
        momentum: Vec3::ZERO,
        ar_a: b.mass * dvgrad,
        ar_b: a.mass * dvgrad,
        visc_dt: dot_rr2,
    };

    if !a.fluid && !b.fluid {
        return terms;
    }

    let mm = a.mass * b.mass;
    let prs = (a.pressure + b.pressure) / (a.rho * b.rho);
    let mut force = grad * (-mm * prs);

    if a.fluid && b.fluid {
        force += match settings.treatment {
            ViscoTreatment::Artificial => artificial(a, b, dot_rr2, grad, settings.visco, settings.h) * mm,
            ViscoTreatment::Laminar => {
                let coef = (a.visco_eff + b.visco_eff) / (a.rho * b.rho) * dr.dot(grad) / (rr2 + settings.eta2);
                dv * (mm * coef)
            }
            ViscoTreatment::Stress => {
                let sa = a.tau * (1.0 / (a.rho * a.rho));
                let sb = b.tau * (1.0 / (b.rho * b.rho));
                (sa + sb).mul_vec(grad) * mm
            }
        };

        if let Some(delta) = settings.delta {
            if a.phase == b.phase {
                let cbar = 0.5 * (a.cs0 + b.cs0);
                let diff = 2.0 * delta * settings.h * cbar * dr.dot(grad) / (rr2 + settings.eta2);
                terms.ar_a += diff * (a.rho - b.rho) * b.mass / b.rho;
                terms.ar_b += diff * (b.rho - a.rho) * a.mass / a.rho;
            }
        }
    } else {
        force += artificial(a, b, dot_rr2, grad, settings.visco_bound, settings.h) * mm;
    }

    terms.momentum = force;
    terms
}

/// Monaghan artificial viscosity per unit `m_a m_b`, active only for
/// approaching particles
#[inline]
fn artificial(a: &PairSide, b: &PairSide, dot_rr2: f32, grad: Vec3, alpha: f32, h: f32) -> Vec3 {
    if dot_rr2 >= 0.0 || alpha == 0.0 {
        return Vec3::ZERO;
    }
    let cbar = 0.5 * (a.cs0 + b.cs0);
    let rhobar = 0.5 * (a.rho + b.rho);
    let amubar = h * dot_rr2;
    let pi_visc = -alpha * cbar * amubar / rhobar;
    grad * -pi_visc
}
