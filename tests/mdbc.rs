// Boundary correction against a flat wall at z = 0.

mod common;

use common::*;
use glam::{DVec3, Vec3};
use sph_nn_core::phases::plasticity_table;
use sph_nn_core::{correct_boundary, MdbcConfig, MdbcStats, ParticleArrays, SlipMode, SymMatrix3, TypeCode};

const COLUMNS: usize = 20;

struct Channel {
    particles: ParticleArrays,
    nbound: usize,
    normals: Vec<Vec3>,
    motion: Vec<Vec3>,
}

/// Two wall rows below z = 0 and a fluid block above, both of `phase`
fn channel(phase: u16, fluid_rows: usize, velocity: impl Fn(DVec3) -> Vec3, density: impl Fn(DVec3) -> f32) -> Channel {
    let mut particles = ParticleArrays::new(COLUMNS * (fluid_rows + 2));
    let next = lattice(
        &mut particles,
        COLUMNS,
        2,
        DVec3::new(0.0, 0.0, -2.0 * DP),
        TypeCode::fixed(phase),
        0,
        |_| Vec3::ZERO,
        |_| 0.0,
    );
    let nbound = particles.count;
    lattice(
        &mut particles,
        COLUMNS,
        fluid_rows,
        DVec3::ZERO,
        TypeCode::fluid(phase),
        next,
        velocity,
        density,
    );

    // Ghost nodes mirror the wall particles about z = 0
    let normals = (0..nbound)
        .map(|p| Vec3::new(0.0, 0.0, 2.0 * particles.position(p).z as f32))
        .collect();
    Channel {
        particles,
        nbound,
        normals,
        motion: vec![Vec3::ZERO; nbound],
    }
}

fn correct(config: &MdbcConfig, channel: &mut Channel, sigma: Option<&mut [SymMatrix3]>) -> MdbcStats {
    let div = build_div(&channel.particles, DVec3::ZERO);
    correct_boundary(
        config,
        channel.nbound,
        &div,
        DVec3::ZERO,
        &mut channel.particles,
        &channel.normals,
        &channel.motion,
        sigma,
    )
    .expect("boundary correction")
}

/// Wall slot in the middle of the row at `row` (0 is the deeper one)
fn wall_slot(row: usize) -> usize {
    row * COLUMNS + COLUMNS / 2
}

/// Shear flow with a constant velocity towards the wall
fn sheared_inflow(p: DVec3) -> Vec3 {
    Vec3::new(0.2 + 1.5 * p.z as f32, 0.0, 0.1)
}

fn graded_density(p: DVec3) -> f32 {
    1000.0 + 50.0 * (0.1 - p.z as f32)
}

#[test]
fn test_linear_field_is_extrapolated_exactly() {
    let config = upload_fixture().mdbc_config();
    let mut channel = channel(
        WATER,
        10,
        |p| Vec3::new(0.2 + 1.5 * p.z as f32, 0.0, 0.0),
        |p| 1000.0 + 50.0 * (0.1 - p.z as f32),
    );

    let stats = correct(&config, &mut channel, None);
    assert_eq!(stats.first_order, channel.nbound);
    assert_eq!(stats.corrected(), channel.nbound);
    assert_eq!(stats.skipped, 0);

    // Top row, ghost node at z = 0.005
    let top = channel.particles.velrho[wall_slot(1)];
    assert!((top.w - 1005.25).abs() < 1.0e-2, "density {}", top.w);
    assert!((top.x + 0.2075).abs() < 1.0e-4, "velocity {}", top.x);
    assert!(top.y.abs() < 1.0e-6 && top.z.abs() < 1.0e-4);

    // Deeper row, ghost node at z = 0.015
    let deep = channel.particles.velrho[wall_slot(0)];
    assert!((deep.w - 1005.75).abs() < 1.0e-2, "density {}", deep.w);
    assert!((deep.x + 0.2225).abs() < 1.0e-4, "velocity {}", deep.x);
}

#[test]
fn test_sparse_neighbourhood_falls_back_to_shepard() {
    let mut config = upload_fixture().mdbc_config();
    config.threshold = 1.0;

    let mut particles = ParticleArrays::new(2);
    particles.push(DVec3::new(0.1, 0.0, -0.5 * DP), Vec3::ZERO, 1000.0, TypeCode::fixed(WATER), 0);
    particles.push(DVec3::new(0.1 + 0.5 * DP, 0.0, DP), Vec3::new(0.3, 0.0, 0.0), 1010.0, TypeCode::fluid(WATER), 1);
    let mut channel = Channel {
        particles,
        nbound: 1,
        normals: vec![Vec3::new(0.0, 0.0, -DP as f32)],
        motion: vec![Vec3::ZERO],
    };

    let stats = correct(&config, &mut channel, None);
    assert_eq!(stats.zeroth_order, 1);
    assert_eq!(stats.first_order, 0);

    let wall = channel.particles.velrho[0];
    assert!((wall.w - 1010.0).abs() < 1.0e-3);
    assert!((wall.x + 0.3).abs() < 1.0e-5);
}

#[test]
fn test_wall_without_fluid_takes_rest_state() {
    let config = upload_fixture().mdbc_config();
    let mut particles = ParticleArrays::new(2);
    particles.push(DVec3::new(0.1, 0.0, -0.5 * DP), Vec3::ZERO, 1030.0, TypeCode::moving(WATER), 0);
    particles.push(DVec3::new(0.3, 0.0, 0.3), Vec3::ZERO, 1000.0, TypeCode::fluid(WATER), 1);
    let mut channel = Channel {
        particles,
        nbound: 1,
        normals: vec![Vec3::new(0.0, 0.0, -DP as f32)],
        motion: vec![Vec3::new(0.05, 0.0, 0.0)],
    };

    let stats = correct(&config, &mut channel, None);
    assert_eq!(stats.no_fluid, 1);
    assert_eq!(channel.particles.velrho[0], Vec3::new(0.05, 0.0, 0.0).extend(1000.0));
}

#[test]
fn test_wall_without_normal_is_skipped() {
    let config = upload_fixture().mdbc_config();
    let mut channel = channel(WATER, 4, |_| Vec3::X, |_| 1002.0);
    let skipped = wall_slot(1);
    channel.normals[skipped] = Vec3::ZERO;
    let before = channel.particles.velrho[skipped];

    let stats = correct(&config, &mut channel, None);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.corrected(), channel.nbound - 1);
    assert_eq!(channel.particles.velrho[skipped], before);
}

#[test]
fn test_correction_is_idempotent_and_leaves_fluid_alone() {
    let config = upload_fixture().mdbc_config();
    let mut channel = channel(
        GRANULAR,
        8,
        |p| Vec3::new(50.0 * p.z as f32, 0.0, 0.0),
        |p| 2000.0 + 20.0 * (0.08 - p.z as f32),
    );
    let n = channel.particles.count;
    jitter(&mut channel.particles, channel.nbound..n, 0.1 * DP, 21);
    stir(&mut channel.particles, channel.nbound..n, 0.2, 22);
    let fluid_before = channel.particles.velrho[channel.nbound..].to_vec();
    let positions_before = channel.particles.pos_z.clone();

    let mut sigma = vec![SymMatrix3::ZERO; channel.nbound];
    correct(&config, &mut channel, Some(sigma.as_mut_slice()));
    let velrho_once = channel.particles.velrho.clone();
    let sigma_once = sigma.clone();

    correct(&config, &mut channel, Some(sigma.as_mut_slice()));
    assert_eq!(channel.particles.velrho, velrho_once);
    assert_eq!(sigma, sigma_once);

    assert_eq!(&channel.particles.velrho[channel.nbound..], &fluid_before[..]);
    assert_eq!(channel.particles.pos_z, positions_before);
}

#[test]
fn test_plastic_wall_stress_is_admissible() {
    let config = upload_fixture().mdbc_config();
    let mut channel = channel(GRANULAR, 10, |p| Vec3::new(50.0 * p.z as f32, 0.0, 0.0), |_| 2000.0);

    let mut sigma = vec![SymMatrix3::ZERO; channel.nbound];
    let stats = correct(&config, &mut channel, Some(sigma.as_mut_slice()));
    assert_eq!(stats.first_order, channel.nbound);
    assert!(stats.yielded > 0, "shear of 50 1/s must exceed the yield stress");

    let plasticity = plasticity_table();
    let dp = (*plasticity)
        .as_ref()
        .and_then(|table| table.get(GRANULAR))
        .expect("granular phase is plastic");
    for (p, stress) in sigma.iter().enumerate() {
        assert!(stress.is_finite());
        let f = dp.yield_function(stress);
        assert!(f <= 1.0e-3, "slot {} outside the yield surface: f = {}", p, f);
    }
    // The shear stress keeps the sign of the strain rate
    assert!(sigma[wall_slot(1)].xz > 0.0);
}

#[test]
fn test_single_precision_offsets_match_double() {
    let mut config = upload_fixture().mdbc_config();
    let mut double = channel(WATER, 10, sheared_inflow, graded_density);
    let mut single = channel(WATER, 10, sheared_inflow, graded_density);
    let n = double.particles.count;
    jitter(&mut double.particles, double.nbound..n, 0.1 * DP, 31);
    jitter(&mut single.particles, single.nbound..n, 0.1 * DP, 31);

    config.fast_single = false;
    let a = correct(&config, &mut double, None);
    config.fast_single = true;
    let b = correct(&config, &mut single, None);
    assert_eq!(a.first_order, double.nbound);
    assert_eq!(b.first_order, a.first_order);

    for p in 0..double.nbound {
        let (x, y) = (double.particles.velrho[p], single.particles.velrho[p]);
        assert!((x.w - y.w).abs() < 0.05, "slot {}: density {} against {}", p, x.w, y.w);
        assert!((x.truncate() - y.truncate()).length() < 1.0e-3, "slot {}: {:?} against {:?}", p, x, y);
    }
}

#[test]
fn test_each_slip_mode_through_the_correction() {
    let motion = Vec3::new(0.05, 0.0, 0.0);
    // Fluid velocity at the top row's ghost node (z = 0.005)
    let ghost = Vec3::new(0.2075, 0.0, 0.1);
    let cases = [
        (SlipMode::Vel0, 0.0, motion),
        (SlipMode::NoSlip, 0.0, 2.0 * motion - ghost),
        (SlipMode::FreeSlip, 0.0, Vec3::new(0.2075, 0.0, -0.1)),
        (SlipMode::PartialSlip, 0.25, Vec3::new(-0.02875, 0.0, -0.1)),
    ];

    for (mode, slip_factor, expected) in cases {
        let mut config = upload_fixture().mdbc_config();
        config.slip_mode = mode;
        config.slip_factor = slip_factor;
        let mut channel = channel(WATER, 10, sheared_inflow, graded_density);
        channel.motion = vec![motion; channel.nbound];

        let stats = correct(&config, &mut channel, None);
        assert_eq!(stats.first_order, channel.nbound, "{:?}", mode);

        let top = channel.particles.velrho[wall_slot(1)];
        assert!((top.w - 1005.25).abs() < 1.0e-2, "{:?}: density {}", mode, top.w);
        assert!(
            (top.truncate() - expected).length() < 1.0e-4,
            "{:?}: velocity {:?}, expected {:?}",
            mode,
            top.truncate(),
            expected
        );
    }
}
