//! Particle storage
//!
//! Columnar particle arrays indexed by slot, plus the packed particle code.
//! Periodic ghosts live in a reserved tail range of the same columns.

pub mod arrays;
pub mod code;

pub use arrays::{ParticleArrays, MAX_PARTICLES};
pub use code::{ParticleKind, TypeCode};
