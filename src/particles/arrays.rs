use glam::{DVec2, DVec3, Vec3, Vec4};

use super::TypeCode;
use crate::division::CellCode;
use crate::error::{check_len, SphResult};

/// Maximum number of particle slots, real and ghost
pub const MAX_PARTICLES: usize = 1 << 30;

/// Particle state stored in Structure of Arrays (SOA) layout.
///
/// Slots `0..count` are authoritative particles, boundaries first. Slots
/// `count..len()` are transient periodic ghosts written by the duplicator
/// and dropped with [`ParticleArrays::discard_ghosts`] before the integrator
/// runs.
#[derive(Debug, Clone, Default)]
pub struct ParticleArrays {
    /// Number of authoritative particles
    pub count: usize,

    /// Horizontal position in double precision
    pub pos_xy: Vec<DVec2>,
    /// Vertical position in double precision
    pub pos_z: Vec<f64>,

    /// Velocity (xyz) and density (w)
    pub velrho: Vec<Vec4>,

    pub code: Vec<TypeCode>,

    /// Stable particle id, copied to ghosts
    pub idp: Vec<u32>,

    /// Packed cell of each slot
    pub dcell: Vec<CellCode>,

    /// Authoritative slot a ghost was copied from (identity for real slots)
    pub origin: Vec<u32>,
}

impl ParticleArrays {
    /// Create an empty particle set with pre-allocated capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            count: 0,
            pos_xy: Vec::with_capacity(capacity),
            pos_z: Vec::with_capacity(capacity),
            velrho: Vec::with_capacity(capacity),
            code: Vec::with_capacity(capacity),
            idp: Vec::with_capacity(capacity),
            dcell: Vec::with_capacity(capacity),
            origin: Vec::with_capacity(capacity),
        }
    }

    /// Total number of slots, ghosts included
    pub fn len(&self) -> usize {
        self.pos_xy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos_xy.is_empty()
    }

    /// Number of ghost slots currently appended
    pub fn ghost_count(&self) -> usize {
        self.len() - self.count
    }

    /// Append an authoritative particle.
    ///
    /// Must not be called while ghost slots are present.
    pub fn push(&mut self, position: DVec3, velocity: Vec3, density: f32, code: TypeCode, id: u32) -> usize {
        debug_assert_eq!(self.ghost_count(), 0, "push with ghost slots present");
        let slot = self.len();
        self.pos_xy.push(DVec2::new(position.x, position.y));
        self.pos_z.push(position.z);
        self.velrho.push(velocity.extend(density));
        self.code.push(code);
        self.idp.push(id);
        self.dcell.push(CellCode::default());
        self.origin.push(slot as u32);
        self.count = self.len();
        slot
    }

    /// Grow every column by `extra` slots for the duplicator.
    ///
    /// Reserved slots carry [`TypeCode::UNUSED`], so any slot the duplicator
    /// leaves unwritten is excluded from every kernel. Returns the first
    /// ghost slot.
    pub fn reserve_ghosts(&mut self, extra: usize) -> usize {
        let start = self.len();
        let new_len = start + extra;
        self.pos_xy.resize(new_len, DVec2::ZERO);
        self.pos_z.resize(new_len, 0.0);
        self.velrho.resize(new_len, Vec4::ZERO);
        self.code.resize(new_len, TypeCode::UNUSED);
        self.idp.resize(new_len, 0);
        self.dcell.resize(new_len, CellCode::default());
        self.origin.resize(new_len, 0);
        start
    }

    /// Drop every ghost slot, leaving only authoritative particles
    pub fn discard_ghosts(&mut self) {
        let count = self.count;
        self.pos_xy.truncate(count);
        self.pos_z.truncate(count);
        self.velrho.truncate(count);
        self.code.truncate(count);
        self.idp.truncate(count);
        self.dcell.truncate(count);
        self.origin.truncate(count);
    }

    pub fn position(&self, slot: usize) -> DVec3 {
        let xy = self.pos_xy[slot];
        DVec3::new(xy.x, xy.y, self.pos_z[slot])
    }

    pub fn velocity(&self, slot: usize) -> Vec3 {
        self.velrho[slot].truncate()
    }

    pub fn density(&self, slot: usize) -> f32 {
        self.velrho[slot].w
    }

    /// Number of leading boundary slots among the authoritative particles
    pub fn bound_count(&self) -> usize {
        self.code[..self.count]
            .iter()
            .take_while(|code| code.is_bound())
            .count()
    }

    /// Check that all columns agree on the slot count
    pub fn validate(&self) -> SphResult<()> {
        let n = self.len();
        check_len("pos_z", self.pos_z.len(), n)?;
        check_len("velrho", self.velrho.len(), n)?;
        check_len("code", self.code.len(), n)?;
        check_len("idp", self.idp.len(), n)?;
        check_len("dcell", self.dcell.len(), n)?;
        check_len("origin", self.origin.len(), n)?;
        if self.count > n {
            return Err(crate::error::invalid_parameter(
                "count",
                format!("{} authoritative particles but only {} slots", self.count, n),
            ));
        }
        if n > MAX_PARTICLES {
            return Err(crate::error::invalid_parameter(
                "count",
                format!("{} slots exceed the limit of {}", n, MAX_PARTICLES),
            ));
        }
        Ok(())
    }
}
