//! Modified dynamic boundary condition (mDBC).
//!
//! Each boundary particle with a nonzero normal projects a ghost node into
//! the fluid, extrapolates density and velocity there from fluid neighbours
//! and maps them back onto itself. Plastic phases also get a stress built
//! from the extrapolated strain rate and returned onto the Drucker-Prager
//! surface.
//!
//! Results depend only on fluid-side data, the normals and the wall motion,
//! so rerunning the correction does not change anything.

pub mod least_squares;
pub mod slip;

use std::time::Instant;

use glam::{DVec3, Mat3, Vec3};
use rayon::prelude::*;

use crate::division::DivData;
use crate::error::{check_len, invalid_parameter, SphError, SphResult};
use crate::interaction::neighbours::{NeighbourSearch, OffsetPrecision};
use crate::interaction::velocity_gradient::shear_rate;
use crate::kernel::{KernelKind, SphKernel};
use crate::math::SymMatrix3;
use crate::particles::ParticleArrays;
use crate::phases::{phase_table, plasticity_table, PhaseTable, PlasticityTable};
use least_squares::{Extrapolation, LeastSquares};
pub use slip::{boundary_velocity, SlipMode};

/// Settings of one correction launch
#[derive(Debug, Clone, Copy)]
pub struct MdbcConfig {
    pub kernel: KernelKind,
    pub simulate_2d: bool,
    pub h: f32,
    pub slip_mode: SlipMode,
    /// Blend factor for [`SlipMode::PartialSlip`]
    pub slip_factor: f32,
    /// Minimum `|det|` of the moment matrix for a first-order solve
    pub threshold: f32,
    /// Form neighbour offsets in single precision
    pub fast_single: bool,
}

/// Counters returned by [`correct_boundary`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MdbcStats {
    pub first_order: usize,
    pub zeroth_order: usize,
    pub no_fluid: usize,
    /// Boundary particles without a normal
    pub skipped: usize,
    /// Plastic particles whose trial stress was returned to the yield surface
    pub yielded: usize,
    pub elapsed_us: u64,
}

impl MdbcStats {
    pub fn corrected(&self) -> usize {
        self.first_order + self.zeroth_order + self.no_fluid
    }

    fn merge(a: Self, b: Self) -> Self {
        Self {
            first_order: a.first_order + b.first_order,
            zeroth_order: a.zeroth_order + b.zeroth_order,
            no_fluid: a.no_fluid + b.no_fluid,
            skipped: a.skipped + b.skipped,
            yielded: a.yielded + b.yielded,
            elapsed_us: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Order {
    First,
    Zeroth,
    NoFluid,
}

/// New state of one boundary particle
#[derive(Debug, Clone, Copy)]
struct Correction {
    order: Order,
    vel: Vec3,
    rho: f32,
    velocity_gradient: Mat3,
}

/// Correct density, velocity and (for plastic phases) stress of the first
/// `nbound` particles.
///
/// `boundary_normal[p]` points out of the fluid and its length is the
/// distance from particle `p` to its ghost node. `sigma`, when present, is
/// indexed like the boundary slots; only walls of phases with Drucker-Prager
/// constants get a stress, and a yield-stress wall without them is an error.
/// Fluid slots are never written.
#[allow(clippy::too_many_arguments)]
pub fn correct_boundary(
    config: &MdbcConfig,
    nbound: usize,
    div: &DivData,
    map_pos_min: DVec3,
    particles: &mut ParticleArrays,
    boundary_normal: &[Vec3],
    motion_vel: &[Vec3],
    sigma: Option<&mut [SymMatrix3]>,
) -> SphResult<MdbcStats> {
    let start = Instant::now();
    validate(config, nbound, div, particles, boundary_normal, motion_vel, sigma.as_deref())?;

    let phase_guard = phase_table()?;
    let phases: &PhaseTable = &phase_guard;
    phases.validate_codes(&particles.code)?;
    let plastic_guard = plasticity_table();
    let plasticity: Option<&PlasticityTable> = (*plastic_guard).as_ref();
    if sigma.is_some() && plasticity.is_none() {
        // Only corrected walls of a yield-stress phase need Drucker-Prager constants
        let needs_plasticity = particles.code[..nbound]
            .iter()
            .zip(boundary_normal)
            .find(|(code, normal)| {
                !code.is_excluded() && **normal != Vec3::ZERO && phases.rheology(code.phase()).tau_yield > 0.0
            });
        if let Some((code, _)) = needs_plasticity {
            return Err(SphError::MissingPlasticity { phase: code.phase() });
        }
    }

    let search = NeighbourSearch {
        div,
        particles: &*particles,
        kernel: SphKernel::new(config.kernel, config.h, config.simulate_2d),
        map_pos_min,
        simulate_2d: config.simulate_2d,
        precision: if config.fast_single {
            OffsetPrecision::Single
        } else {
            OffsetPrecision::Double
        },
    };

    let corrections: Vec<Option<Correction>> = (0..nbound)
        .into_par_iter()
        .map(|p| {
            let code = search.particles.code[p];
            let normal = boundary_normal[p];
            if code.is_excluded() || normal == Vec3::ZERO {
                return None;
            }
            Some(extrapolate(config, &search, phases, p, normal, motion_vel[p]))
        })
        .collect();

    let ParticleArrays { velrho, code, .. } = particles;
    let code = &*code;
    let mut stats = velrho[..nbound]
        .par_iter_mut()
        .zip(corrections.par_iter())
        .map(|(vr, correction)| {
            let mut stats = MdbcStats::default();
            match correction {
                None => stats.skipped = 1,
                Some(c) => {
                    *vr = c.vel.extend(c.rho);
                    match c.order {
                        Order::First => stats.first_order = 1,
                        Order::Zeroth => stats.zeroth_order = 1,
                        Order::NoFluid => stats.no_fluid = 1,
                    }
                }
            }
            stats
        })
        .reduce(MdbcStats::default, MdbcStats::merge);

    if let (Some(sigma), Some(plasticity)) = (sigma, plasticity) {
        stats.yielded = sigma[..nbound]
            .par_iter_mut()
            .zip(corrections.par_iter())
            .enumerate()
            .map(|(p, (stress, correction))| {
                let correction = match correction {
                    Some(c) => c,
                    None => return 0,
                };
                match plastic_stress(phases, plasticity, code[p].phase(), correction) {
                    Some((admissible, yielded)) => {
                        *stress = admissible;
                        yielded as usize
                    }
                    None => 0,
                }
            })
            .sum();
    }

    stats.elapsed_us = start.elapsed().as_micros() as u64;
    log::debug!(
        "[mdbc] corrected {} of {} boundary particles ({} first order) in {}us",
        stats.corrected(),
        nbound,
        stats.first_order,
        stats.elapsed_us
    );
    if stats.zeroth_order * 2 > stats.corrected() {
        log::warn!(
            "[mdbc] {} of {} corrections fell back to zeroth order; check the threshold and boundary normals",
            stats.zeroth_order,
            stats.corrected()
        );
    }
    Ok(stats)
}

fn extrapolate(
    config: &MdbcConfig,
    search: &NeighbourSearch<'_>,
    phases: &PhaseTable,
    p: usize,
    normal: Vec3,
    wall_vel: Vec3,
) -> Correction {
    let particles = search.particles;
    let rho0 = phases.constants(particles.code[p].phase()).rho0;
    let ghost = particles.position(p) - normal.as_dvec3();

    let near = search.gather(ghost, None, |j| {
        let c = particles.code[j];
        c.is_fluid() && !c.is_excluded()
    });

    let mut lsq = LeastSquares::new(config.simulate_2d);
    for n in &near {
        let cte = phases.constants(particles.code[n.slot].phase());
        let vr = particles.velrho[n.slot];
        let rho = cte.floor_density(vr.w);
        lsq.add(cte.mass / rho, n.dr, n.w, n.fac, [rho, vr.x, vr.y, vr.z]);
    }

    let (order, rho, ghost_vel, velocity_gradient) = match lsq.solve(config.threshold as f64) {
        Extrapolation::FirstOrder { values, gradients } => {
            // Boundary particle sits at ghost + normal
            let rho = values[0] + gradients[0].dot(normal.as_dvec3());
            let vel = Vec3::new(values[1] as f32, values[2] as f32, values[3] as f32);
            let grad = Mat3::from_cols(
                Vec3::new(gradients[1].x as f32, gradients[2].x as f32, gradients[3].x as f32),
                Vec3::new(gradients[1].y as f32, gradients[2].y as f32, gradients[3].y as f32),
                Vec3::new(gradients[1].z as f32, gradients[2].z as f32, gradients[3].z as f32),
            );
            (Order::First, rho as f32, vel, grad)
        }
        Extrapolation::ZerothOrder { values } => {
            let vel = Vec3::new(values[1] as f32, values[2] as f32, values[3] as f32);
            (Order::Zeroth, values[0] as f32, vel, Mat3::ZERO)
        }
        Extrapolation::NoFluid => {
            return Correction {
                order: Order::NoFluid,
                vel: wall_vel,
                rho: rho0,
                velocity_gradient: Mat3::ZERO,
            };
        }
    };

    let unit_normal = normal.normalize_or_zero();
    Correction {
        order,
        vel: boundary_velocity(config.slip_mode, ghost_vel, wall_vel, unit_normal, config.slip_factor),
        rho: if rho.is_finite() { rho.max(rho0) } else { rho0 },
        velocity_gradient,
    }
}

/// Trial stress `-p I + 2 mu dev(D)` mapped onto the yield surface, or
/// `None` for phases without Drucker-Prager constants
fn plastic_stress(
    phases: &PhaseTable,
    plasticity: &PlasticityTable,
    phase: u16,
    correction: &Correction,
) -> Option<(SymMatrix3, bool)> {
    let dp = plasticity.get(phase)?;
    let cte = phases.constants(phase);
    let strain_rate = SymMatrix3::symmetric_part(correction.velocity_gradient);
    let visco = phases.rheology(phase).effective_viscosity(shear_rate(&strain_rate));
    let trial = SymMatrix3::diagonal(-cte.pressure(correction.rho)) + strain_rate.deviatoric() * (2.0 * visco);
    Some(dp.return_map(&trial))
}

fn validate(
    config: &MdbcConfig,
    nbound: usize,
    div: &DivData,
    particles: &ParticleArrays,
    boundary_normal: &[Vec3],
    motion_vel: &[Vec3],
    sigma: Option<&[SymMatrix3]>,
) -> SphResult<()> {
    particles.validate()?;
    if !(config.h > 0.0) || !config.h.is_finite() {
        return Err(invalid_parameter("h", format!("{} is not a positive length", config.h)));
    }
    if !(config.threshold >= 0.0) {
        return Err(invalid_parameter("threshold", format!("{} must not be negative", config.threshold)));
    }
    if !(0.0..=1.0).contains(&config.slip_factor) {
        return Err(invalid_parameter("slip_factor", format!("{} is outside [0, 1]", config.slip_factor)));
    }
    if div.simulate_2d() != config.simulate_2d {
        return Err(invalid_parameter("div", "division and kernel disagree on 2D/3D"));
    }
    let support = 2.0 * config.h as f64;
    if div.cell_size() < support * (1.0 - 1.0e-6) {
        return Err(invalid_parameter(
            "div",
            format!("cell size {} is below the kernel support {}", div.cell_size(), support),
        ));
    }
    if nbound > particles.count {
        return Err(invalid_parameter(
            "nbound",
            format!("{} boundary particles but only {} particles", nbound, particles.count),
        ));
    }
    if let Some(slot) = particles.code[..nbound].iter().position(|c| c.is_fluid()) {
        return Err(invalid_parameter("nbound", format!("slot {} is fluid but lies in the boundary block", slot)));
    }
    check_len("boundary_normal", boundary_normal.len(), nbound)?;
    check_len("motion_vel", motion_vel.len(), nbound)?;
    if let Some(sigma) = sigma {
        check_len("sigma", sigma.len(), nbound)?;
    }
    Ok(())
}
