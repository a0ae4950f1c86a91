use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Velocity condition imposed on corrected boundary particles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlipMode {
    /// Only density is corrected, velocity follows the wall motion
    Vel0,
    /// Tangential and normal velocity mirrored about the wall motion
    NoSlip,
    /// Tangential velocity kept from the fluid, normal velocity mirrored
    FreeSlip,
    /// Tangential velocity blended between no-slip and free-slip
    PartialSlip,
}

/// Boundary velocity from the fluid velocity at the ghost node.
///
/// `unit_normal` may be zero when the mode ignores it. `slip_factor` is only
/// read by [`SlipMode::PartialSlip`]: 0 behaves as no-slip, 1 as free-slip.
pub fn boundary_velocity(mode: SlipMode, ghost_vel: Vec3, wall_vel: Vec3, unit_normal: Vec3, slip_factor: f32) -> Vec3 {
    match mode {
        SlipMode::Vel0 => wall_vel,
        SlipMode::NoSlip => 2.0 * wall_vel - ghost_vel,
        SlipMode::FreeSlip => mirror_normal(ghost_vel, wall_vel, unit_normal, 1.0),
        SlipMode::PartialSlip => mirror_normal(ghost_vel, wall_vel, unit_normal, slip_factor.clamp(0.0, 1.0)),
    }
}

fn mirror_normal(ghost_vel: Vec3, wall_vel: Vec3, n: Vec3, slip: f32) -> Vec3 {
    let ghost_n = ghost_vel.dot(n);
    let wall_n = wall_vel.dot(n);
    let ghost_t = ghost_vel - n * ghost_n;
    let wall_t = wall_vel - n * wall_n;

    let no_slip_t = 2.0 * wall_t - ghost_t;
    let tangential = no_slip_t + (ghost_t - no_slip_t) * slip;
    tangential + n * (2.0 * wall_n - ghost_n)
}
