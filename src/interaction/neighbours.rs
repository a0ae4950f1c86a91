//! Neighbour gathering shared by the force and boundary kernels.

use glam::{DVec3, Vec3};

use crate::division::DivData;
use crate::kernel::SphKernel;
use crate::particles::ParticleArrays;

/// A neighbour inside the kernel support of some centre point
#[derive(Debug, Clone, Copy)]
pub struct Neighbour {
    pub slot: usize,
    /// Centre minus neighbour position
    pub dr: Vec3,
    pub rr2: f32,
    pub w: f32,
    /// Gradient factor, `grad W = dr * fac`
    pub fac: f32,
}

/// How neighbour offsets are formed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetPrecision {
    /// Difference taken in f64, then narrowed
    Double,
    /// Both positions narrowed relative to the domain minimum first
    Single,
}

/// Neighbourhood query bound to one division and particle set
pub struct NeighbourSearch<'a> {
    pub div: &'a DivData,
    pub particles: &'a ParticleArrays,
    pub kernel: SphKernel,
    pub map_pos_min: DVec3,
    pub simulate_2d: bool,
    pub precision: OffsetPrecision,
}

impl NeighbourSearch<'_> {
    #[inline]
    pub fn offset(&self, center: DVec3, slot: usize) -> Vec3 {
        let other = self.particles.position(slot);
        let mut dr = match self.precision {
            OffsetPrecision::Double => (center - other).as_vec3(),
            OffsetPrecision::Single => {
                (center - self.map_pos_min).as_vec3() - (other - self.map_pos_min).as_vec3()
            }
        };
        if self.simulate_2d {
            dr.y = 0.0;
        }
        dr
    }

    /// Every slot accepted by `accept` within the support of `center`.
    ///
    /// Results are sorted by `(id, slot)`, so sums over them do not depend
    /// on the slot layout.
    pub fn gather<F>(&self, center: DVec3, skip: Option<usize>, accept: F) -> Vec<Neighbour>
    where
        F: Fn(usize) -> bool,
    {
        let mut found = Vec::new();
        self.div.for_each_candidate(center, self.map_pos_min, |slot| {
            if Some(slot) == skip || !accept(slot) {
                return;
            }
            let dr = self.offset(center, slot);
            let rr2 = dr.length_squared();
            if !self.kernel.in_support(rr2) {
                return;
            }
            let (w, fac) = self.kernel.wab_fac(rr2);
            found.push(Neighbour { slot, dr, rr2, w, fac });
        });
        let idp = &self.particles.idp;
        found.sort_unstable_by_key(|n| (idp[n.slot], n.slot));
        found
    }
}
