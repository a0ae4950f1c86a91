//! Particle interaction core for multi-phase non-Newtonian SPH.
//!
//! The crate receives particle arrays, a spatial division and phase tables
//! from an external step driver and provides the per-step kernels:
//!
//! - [`periodic`]: transient ghost copies across periodic edges, for the
//!   Verlet and Symplectic integrators
//! - [`interaction`]: pressure, non-Newtonian viscous, density and gravity
//!   terms with exact pairwise momentum balance
//! - [`mdbc`]: boundary correction by least-squares extrapolation, with
//!   Drucker-Prager stress return for plastic phases
//!
//! Phase constants live in a process-wide store ([`phases`]) that kernels
//! read under a shared lock and configuration reloads replace atomically.

pub mod config;
pub mod division;
pub mod error;
pub mod interaction;
pub mod kernel;
pub mod launch;
pub mod math;
pub mod mdbc;
pub mod particles;
pub mod periodic;
pub mod phases;

pub use config::SphConfig;
pub use division::{CellCode, DivData};
pub use error::{SphError, SphResult};
pub use interaction::{compute_forces, ForceOutput, InteractionParams, InteractionStats, ViscoTreatment};
pub use kernel::{KernelKind, SphKernel};
pub use launch::{KernelLauncher, LaunchConfig};
pub use math::SymMatrix3;
pub use mdbc::{correct_boundary, MdbcConfig, MdbcStats, SlipMode};
pub use particles::{ParticleArrays, ParticleKind, TypeCode};
pub use periodic::{
    duplicate_periodic, periodic_duplicate_symplectic, periodic_duplicate_verlet, PeriodicSource, SchemeBuffers,
};
pub use phases::{
    reload_phase_store, upload_phase_constants, upload_plasticity_constants, DruckerPragerCte, PhaseCte,
    PhaseRheology, RheologyLaw, UploadOutcome,
};
