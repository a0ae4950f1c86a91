//! First pass of the force kernel: strain rate and viscous stress.

use glam::{Mat3, Vec3};

use super::neighbours::Neighbour;
use crate::math::SymMatrix3;
use crate::particles::ParticleArrays;
use crate::phases::PhaseTable;

/// Per-particle viscous state produced by the first pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViscousState {
    pub visco_eff: f32,
    pub shear_rate: f32,
    pub tau: SymMatrix3,
}

/// SPH velocity gradient `L_ab = dv_a/dx_b` at slot `i`
pub fn velocity_gradient(
    particles: &ParticleArrays,
    phases: &PhaseTable,
    i: usize,
    neighbours: &[Neighbour],
) -> Mat3 {
    let vel_i = particles.velocity(i);
    let mut grad = Mat3::ZERO;
    for n in neighbours {
        let j = n.slot;
        let cte = phases.constants(particles.code[j].phase());
        let volume = cte.mass / cte.floor_density(particles.density(j));
        let dv = particles.velocity(j) - vel_i;
        let g = n.dr * n.fac;
        grad += outer(dv, g) * volume;
    }
    grad
}

/// `u ⊗ g`, column `b` holds `u * g_b`
#[inline]
pub fn outer(u: Vec3, g: Vec3) -> Mat3 {
    Mat3::from_cols(u * g.x, u * g.y, u * g.z)
}

/// Shear rate `sqrt(2 D:D)`
#[inline]
pub fn shear_rate(strain_rate: &SymMatrix3) -> f32 {
    (2.0 * strain_rate.double_dot(strain_rate)).max(0.0).sqrt()
}

/// Effective viscosity and stress `tau = 2 mu D` of a fluid slot.
///
/// `visco_limit` is the explicit diffusion stability ceiling for the step.
pub fn viscous_state(
    particles: &ParticleArrays,
    phases: &PhaseTable,
    i: usize,
    neighbours: &[Neighbour],
    visco_limit: f32,
) -> ViscousState {
    let strain_rate = SymMatrix3::symmetric_part(velocity_gradient(particles, phases, i, neighbours));
    let gamma_dot = shear_rate(&strain_rate);
    let visco_eff = phases
        .rheology(particles.code[i].phase())
        .effective_viscosity(gamma_dot)
        .min(visco_limit);
    ViscousState {
        visco_eff,
        shear_rate: gamma_dot,
        tau: strain_rate * (2.0 * visco_eff),
    }
}
