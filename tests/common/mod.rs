// Shared fixture for the integration tests.
//
// Every test binary that touches the phase store uploads the same three
// phases, so concurrent tests only ever see idempotent re-uploads.

#![allow(dead_code)]

use glam::{DVec3, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sph_nn_core::{DivData, ParticleArrays, SphConfig, TypeCode};

/// Particle spacing
pub const DP: f64 = 0.01;

/// Smoothing length
pub const H: f32 = 0.012;

pub const WATER: u16 = 0;
pub const MUD: u16 = 1;
pub const GRANULAR: u16 = 2;

pub const FIXTURE: &str = r#"
[kernel]
kind = "wendland"
h = 0.012
simulate_2d = true

[interaction]
visco_treatment = "stress"
visco_bound = 0.5
gravity = [0.0, 0.0, -9.81]

[mdbc]
slip = "no_slip"
threshold = 0.0

[launch]
worker_threads = 2

[[phase]]
id = 0
rho0 = 1000.0
mass = 0.1
cs0 = 20.0
visco = 0.001

[[phase]]
id = 1
rho0 = 1600.0
mass = 0.16
cs0 = 25.0
rheology = "herschel_bulkley_papanastasiou"
visco = 0.5
flow_index = 0.7
papanastasiou_m = 100.0
tau_yield = 20.0
visco_max = 50.0

[[phase]]
id = 2
rho0 = 2000.0
mass = 0.2
cs0 = 30.0
rheology = "bingham_papanastasiou"
visco = 1.0
papanastasiou_m = 100.0
tau_yield = 100.0
visco_max = 1000.0

[phase.drucker_prager]
cohesion = 10.0
friction_angle = 30.0
dilatancy_angle = 5.0
young_modulus = 1.0e6
poisson_ratio = 0.3
"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn fixture() -> SphConfig {
    SphConfig::from_toml_str(FIXTURE).expect("fixture config must parse")
}

/// Parse the fixture and make sure its phases are uploaded
pub fn upload_fixture() -> SphConfig {
    init_logging();
    let config = fixture();
    config.apply().expect("fixture phases must upload");
    config
}

/// Append an `nx` by `nz` lattice in the X-Z plane with cell-centred
/// positions starting at `origin`. Returns the next free id.
#[allow(clippy::too_many_arguments)]
pub fn lattice(
    particles: &mut ParticleArrays,
    nx: usize,
    nz: usize,
    origin: DVec3,
    code: TypeCode,
    first_id: u32,
    velocity: impl Fn(DVec3) -> Vec3,
    density: impl Fn(DVec3) -> f32,
) -> u32 {
    let mut id = first_id;
    for k in 0..nz {
        for i in 0..nx {
            let pos = origin + DVec3::new((i as f64 + 0.5) * DP, 0.0, (k as f64 + 0.5) * DP);
            particles.push(pos, velocity(pos), density(pos), code, id);
            id += 1;
        }
    }
    id
}

/// Randomly displace the X-Z positions of `slots` by up to `amount`
pub fn jitter(particles: &mut ParticleArrays, slots: std::ops::Range<usize>, amount: f64, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for p in slots {
        particles.pos_xy[p].x += rng.gen_range(-amount..amount);
        particles.pos_z[p] += rng.gen_range(-amount..amount);
    }
}

/// Random velocity and density perturbation of `slots`
pub fn stir(particles: &mut ParticleArrays, slots: std::ops::Range<usize>, speed: f32, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for p in slots {
        let v = &mut particles.velrho[p];
        v.x = rng.gen_range(-speed..speed);
        v.z = rng.gen_range(-speed..speed);
        v.w *= 1.0 + rng.gen_range(-0.01..0.01);
    }
}

/// Division with cells of exactly the kernel support
pub fn build_div(particles: &ParticleArrays, map_pos_min: DVec3) -> DivData {
    DivData::build(particles, map_pos_min, 2.0 * H as f64, true).expect("division must build")
}
