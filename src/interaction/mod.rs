//! Force interaction kernel for non-Newtonian multi-phase SPH.
//!
//! One worker per particle visits its neighbours in `(id, slot)` order and
//! accumulates into its own output slot only. Each pair is evaluated in the
//! orientation given by the lower key so that both sides see exactly
//! opposite momentum terms.
//!
//! The kernel runs in two passes. The first computes the strain rate,
//! effective viscosity and viscous stress of every fluid particle; the
//! second sums pressure, viscous, density and gravity terms. Periodic ghosts
//! never receive output, their first-pass state is read from the slot they
//! were copied from.

pub mod neighbours;
pub mod pair;
pub mod velocity_gradient;

use std::time::Instant;

use glam::{DVec3, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::division::DivData;
use crate::error::{invalid_parameter, SphResult};
use crate::kernel::{KernelKind, SphKernel};
use crate::math::SymMatrix3;
use crate::particles::ParticleArrays;
use crate::phases::{phase_table, PhaseTable};
use neighbours::{NeighbourSearch, OffsetPrecision};
use pair::{PairSettings, PairSide};
pub use velocity_gradient::ViscousState;

/// Viscous formulation between fluid particles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViscoTreatment {
    /// Monaghan artificial viscosity
    Artificial,
    /// Morris laminar operator with the mean effective viscosity
    Laminar,
    /// Divergence of the viscous stress `tau_i + tau_j`
    Stress,
}

/// Per-particle accumulators written by [`compute_forces`]
#[derive(Debug, Clone, Default)]
pub struct ForceOutput {
    /// Acceleration
    pub ace: Vec<Vec3>,
    /// Density time derivative
    pub ar: Vec<f32>,
    pub visco_eff: Vec<f32>,
    pub shear_rate: Vec<f32>,
    /// Viscous stress `2 mu D`
    pub tau: Vec<SymMatrix3>,
}

impl ForceOutput {
    pub fn new(capacity: usize) -> Self {
        Self {
            ace: Vec::with_capacity(capacity),
            ar: Vec::with_capacity(capacity),
            visco_eff: Vec::with_capacity(capacity),
            shear_rate: Vec::with_capacity(capacity),
            tau: Vec::with_capacity(capacity),
        }
    }

    fn reset(&mut self, count: usize) {
        self.ace.clear();
        self.ace.resize(count, Vec3::ZERO);
        self.ar.clear();
        self.ar.resize(count, 0.0);
        self.visco_eff.clear();
        self.visco_eff.resize(count, 0.0);
        self.shear_rate.clear();
        self.shear_rate.resize(count, 0.0);
        self.tau.clear();
        self.tau.resize(count, SymMatrix3::ZERO);
    }

    pub fn len(&self) -> usize {
        self.ace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ace.is_empty()
    }
}

/// Everything one force launch reads, plus the output it writes.
///
/// Borrowed for a single call; nothing is retained afterwards.
pub struct InteractionParams<'a> {
    pub kernel: KernelKind,
    pub simulate_2d: bool,
    pub h: f32,
    pub visco_treatment: ViscoTreatment,
    /// Artificial viscosity coefficient between fluid particles
    pub visco: f32,
    pub visco_bound: f32,
    /// Molteni density diffusion coefficient
    pub delta: Option<f32>,
    pub gravity: Vec3,
    pub map_pos_min: DVec3,
    pub div: &'a DivData,
    pub particles: &'a ParticleArrays,
    /// Number of leading boundary slots
    pub npb: usize,
    pub out: &'a mut ForceOutput,
}

/// Reductions returned by [`compute_forces`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InteractionStats {
    pub fluid: usize,
    pub bound: usize,
    /// Pairs within the support, counted from both sides
    pub neighbour_pairs: usize,
    /// Maximum `dv.dr / (r^2 + eta^2)` for the viscous time step
    pub viscdt_max: f32,
    pub visco_eff_max: f32,
    pub elapsed_us: u64,
}

/// Compute accelerations and density derivatives of every real particle.
///
/// `time_inc` is the step the output will be integrated with. It caps the
/// effective viscosity at the explicit diffusion limit; zero disables the
/// cap.
pub fn compute_forces(params: &mut InteractionParams<'_>, time_inc: f64) -> SphResult<InteractionStats> {
    let start = Instant::now();
    validate(params, time_inc)?;
    let guard = phase_table()?;
    let phases: &PhaseTable = &guard;
    phases.validate_codes(&params.particles.code)?;

    let particles = params.particles;
    let count = particles.count;
    let npb = params.npb;
    let search = NeighbourSearch {
        div: params.div,
        particles,
        kernel: SphKernel::new(params.kernel, params.h, params.simulate_2d),
        map_pos_min: params.map_pos_min,
        simulate_2d: params.simulate_2d,
        precision: OffsetPrecision::Double,
    };
    let h2 = params.h * params.h;
    let settings = PairSettings {
        treatment: params.visco_treatment,
        visco: params.visco,
        visco_bound: params.visco_bound,
        delta: params.delta,
        h: params.h,
        eta2: 0.01 * h2,
    };
    let visco_limit_factor = if time_inc > 0.0 { (0.125 * h2 as f64 / time_inc) as f32 } else { f32::INFINITY };

    params.out.reset(count);
    let ForceOutput {
        ace,
        ar,
        visco_eff,
        shear_rate,
        tau,
    } = &mut *params.out;

    // Pass 1: viscous state of fluid particles
    let skip_first_pass = settings.treatment == ViscoTreatment::Artificial;
    visco_eff
        .par_iter_mut()
        .zip(shear_rate.par_iter_mut())
        .zip(tau.par_iter_mut())
        .enumerate()
        .skip(npb)
        .for_each(|(i, ((visco, rate), tau))| {
            let code = particles.code[i];
            if skip_first_pass || code.is_excluded() {
                return;
            }
            let cte = phases.constants(code.phase());
            let limit = visco_limit_factor * cte.floor_density(particles.density(i));
            let near = search.gather(particles.position(i), Some(i), |j| !particles.code[j].is_excluded());
            let state = velocity_gradient::viscous_state(particles, phases, i, &near, limit);
            *visco = state.visco_eff;
            *rate = state.shear_rate;
            *tau = state.tau;
        });

    let (visco_eff, tau) = (&*visco_eff, &*tau);
    let side_of = |slot: usize| -> PairSide {
        let code = particles.code[slot];
        let cte = phases.constants(code.phase());
        let rho = cte.floor_density(particles.density(slot));
        // Ghosts share the viscous state of the slot they were copied from
        let source = particles.origin[slot] as usize;
        PairSide {
            fluid: code.is_fluid(),
            phase: code.phase(),
            vel: particles.velocity(slot),
            rho,
            mass: cte.mass,
            pressure: cte.pressure(rho),
            cs0: cte.cs0,
            visco_eff: visco_eff.get(source).copied().unwrap_or(0.0),
            tau: tau.get(source).copied().unwrap_or_default(),
        }
    };

    // Pass 2: pair sums
    let gravity = params.gravity;
    let reduced = ace
        .par_iter_mut()
        .zip(ar.par_iter_mut())
        .enumerate()
        .map(|(i, (ace, ar))| {
            let code = particles.code[i];
            if code.is_excluded() {
                return PassStats::default();
            }
            let fluid = code.is_fluid();
            let me = side_of(i);
            let key_i = (particles.idp[i], i);
            let near = search.gather(particles.position(i), Some(i), |j| {
                let other = particles.code[j];
                !other.is_excluded() && (fluid || other.is_fluid())
            });

            let mut stats = PassStats {
                pairs: near.len(),
                ..Default::default()
            };
            let mut acc = Vec3::ZERO;
            let mut arp = 0.0f32;
            for n in &near {
                let other = side_of(n.slot);
                let first = key_i < (particles.idp[n.slot], n.slot);
                let terms = if first {
                    pair::evaluate(&me, &other, n.dr, n.rr2, n.fac, &settings)
                } else {
                    pair::evaluate(&other, &me, -n.dr, n.rr2, n.fac, &settings)
                };
                if first {
                    acc += terms.momentum;
                    arp += terms.ar_a;
                } else {
                    acc -= terms.momentum;
                    arp += terms.ar_b;
                }
                stats.viscdt_max = stats.viscdt_max.max(terms.visc_dt);
            }

            *ar = arp;
            if fluid {
                *ace = acc / me.mass + gravity;
                stats.fluid = 1;
            } else {
                stats.bound = 1;
            }
            stats
        })
        .reduce(PassStats::default, PassStats::merge);

    let visco_eff_max = visco_eff.iter().copied().fold(0.0f32, f32::max);
    drop(guard);

    let stats = InteractionStats {
        fluid: reduced.fluid,
        bound: reduced.bound,
        neighbour_pairs: reduced.pairs,
        viscdt_max: reduced.viscdt_max,
        visco_eff_max,
        elapsed_us: start.elapsed().as_micros() as u64,
    };
    log::debug!(
        "[interaction] forces for {} fluid, {} bound, {} pairs in {}us",
        stats.fluid,
        stats.bound,
        stats.neighbour_pairs,
        stats.elapsed_us
    );
    Ok(stats)
}

#[derive(Debug, Clone, Copy, Default)]
struct PassStats {
    fluid: usize,
    bound: usize,
    pairs: usize,
    viscdt_max: f32,
}

impl PassStats {
    fn merge(a: Self, b: Self) -> Self {
        Self {
            fluid: a.fluid + b.fluid,
            bound: a.bound + b.bound,
            pairs: a.pairs + b.pairs,
            viscdt_max: a.viscdt_max.max(b.viscdt_max),
        }
    }
}

fn validate(params: &InteractionParams<'_>, time_inc: f64) -> SphResult<()> {
    let particles = params.particles;
    particles.validate()?;

    if !(params.h > 0.0) || !params.h.is_finite() {
        return Err(invalid_parameter("h", format!("{} is not a positive length", params.h)));
    }
    if !(time_inc >= 0.0) || !time_inc.is_finite() {
        return Err(invalid_parameter("time_inc", format!("{} is not a valid time step", time_inc)));
    }
    if !(params.visco >= 0.0) || !(params.visco_bound >= 0.0) {
        return Err(invalid_parameter("visco", "artificial viscosity must not be negative"));
    }
    if let Some(delta) = params.delta {
        if !(delta >= 0.0) {
            return Err(invalid_parameter("delta", format!("{} must not be negative", delta)));
        }
    }
    if params.div.simulate_2d() != params.simulate_2d {
        return Err(invalid_parameter("div", "division and kernel disagree on 2D/3D"));
    }
    let support = 2.0 * params.h as f64;
    if params.div.cell_size() < support * (1.0 - 1.0e-6) {
        return Err(invalid_parameter(
            "div",
            format!("cell size {} is below the kernel support {}", params.div.cell_size(), support),
        ));
    }
    check_layout(particles, params.npb)
}

/// Boundary slots must form the prefix `0..npb` of the real particles
pub(crate) fn check_layout(particles: &ParticleArrays, npb: usize) -> SphResult<()> {
    if npb > particles.count {
        return Err(invalid_parameter(
            "npb",
            format!("{} boundary particles but only {} particles", npb, particles.count),
        ));
    }
    let codes = &particles.code[..particles.count];
    if let Some(slot) = codes[..npb].iter().position(|c| c.is_fluid()) {
        return Err(invalid_parameter("npb", format!("slot {} is fluid but lies in the boundary block", slot)));
    }
    if let Some(offset) = codes[npb..].iter().position(|c| c.is_bound()) {
        return Err(invalid_parameter(
            "npb",
            format!("slot {} is a boundary but lies in the fluid block", npb + offset),
        ));
    }
    Ok(())
}
