//! Periodic ghost duplication.
//!
//! Ghosts are written into slots reserved past the sources, one per entry of
//! the source list. The two integration schemes differ only in which
//! auxiliary columns travel with the ghost, selected by [`SchemeBuffers`].

use std::time::Instant;

use glam::{DVec2, DVec3, Vec4};
use rayon::prelude::*;

use crate::division::CellCode;
use crate::error::{check_len, invalid_duplication, SphResult};
use crate::particles::ParticleArrays;

/// One entry of the duplication list: a source slot plus a direction bit.
///
/// With the inverse bit set the translation is subtracted instead of added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub struct PeriodicSource(pub u32);

impl PeriodicSource {
    pub const INVERSE: u32 = 0x8000_0000;

    pub fn forward(slot: usize) -> Self {
        Self(slot as u32 & !Self::INVERSE)
    }

    pub fn inverse(slot: usize) -> Self {
        Self(slot as u32 | Self::INVERSE)
    }

    #[inline]
    pub fn slot(self) -> usize {
        (self.0 & !Self::INVERSE) as usize
    }

    #[inline]
    pub fn is_inverse(self) -> bool {
        self.0 & Self::INVERSE != 0
    }

    #[inline]
    fn sign(self) -> f64 {
        if self.is_inverse() {
            -1.0
        } else {
            1.0
        }
    }
}

/// Auxiliary per-scheme state duplicated along with the particle
pub enum SchemeBuffers<'a> {
    /// Velocity and density of the previous step
    Verlet { velrho_m1: &'a mut [Vec4] },
    /// Predictor position and velocity/density
    Symplectic {
        pos_xy_pre: &'a mut [DVec2],
        pos_z_pre: &'a mut [f64],
        velrho_pre: &'a mut [Vec4],
    },
}

impl SchemeBuffers<'_> {
    fn name(&self) -> &'static str {
        match self {
            SchemeBuffers::Verlet { .. } => "verlet",
            SchemeBuffers::Symplectic { .. } => "symplectic",
        }
    }
}

/// Collect the slots of `slots` lying within `width` of either edge of a
/// periodic axis.
///
/// Particles near the lower edge are copied forward by `perinc`, particles
/// near the upper edge are copied back. Excluded particles are skipped.
pub fn collect_sources(
    particles: &ParticleArrays,
    slots: std::ops::Range<usize>,
    axis: usize,
    map_pos_min: DVec3,
    map_pos_max: DVec3,
    width: f64,
) -> Vec<PeriodicSource> {
    slots
        .filter(|&p| !particles.code[p].is_excluded())
        .filter_map(|p| {
            let x = particles.position(p)[axis];
            if x < map_pos_min[axis] + width {
                Some(PeriodicSource::forward(p))
            } else if x >= map_pos_max[axis] - width {
                Some(PeriodicSource::inverse(p))
            } else {
                None
            }
        })
        .collect()
}

/// Write `n` periodic ghosts starting at slot `pini`.
///
/// Ghost `k` copies `list[k]` shifted by `perinc` (or `-perinc`), keeps the
/// source id and origin, gets the periodic flag and a cell moved by
/// `domain_cells` along every axis with a nonzero translation. Sources are
/// never modified, and nothing is written when a shifted cell falls outside
/// the [`CellCode`] range.
#[allow(clippy::too_many_arguments)]
pub fn duplicate_periodic(
    n: usize,
    pini: usize,
    domain_cells: [u32; 3],
    perinc: DVec3,
    list: &[PeriodicSource],
    particles: &mut ParticleArrays,
    aux: SchemeBuffers<'_>,
) -> SphResult<usize> {
    let start = Instant::now();
    let scheme = aux.name();
    validate_request(n, pini, domain_cells, perinc, list, particles, &aux)?;
    if n == 0 {
        return Ok(0);
    }
    let list = &list[..n];

    let cell_shift = |source: PeriodicSource| -> [i32; 3] {
        let sign = if source.is_inverse() { -1 } else { 1 };
        let mut delta = [0i32; 3];
        for axis in 0..3 {
            if perinc[axis] != 0.0 {
                delta[axis] = sign * perinc[axis].signum() as i32 * domain_cells[axis] as i32;
            }
        }
        delta
    };
    let ghost_cells: Vec<CellCode> = list
        .par_iter()
        .map(|&s| particles.dcell[s.slot()].shifted(cell_shift(s)))
        .collect::<SphResult<_>>()?;

    let ParticleArrays {
        pos_xy,
        pos_z,
        velrho,
        code,
        idp,
        dcell,
        origin,
        ..
    } = particles;

    copy_column(pos_xy, pini, list, |xy, s| {
        xy + DVec2::new(perinc.x, perinc.y) * s.sign()
    });
    copy_column(pos_z, pini, list, |z, s| z + perinc.z * s.sign());
    copy_column(velrho, pini, list, |v, _| v);
    copy_column(code, pini, list, |c, _| c.with_periodic());
    copy_column(idp, pini, list, |id, _| id);
    dcell[pini..pini + n].copy_from_slice(&ghost_cells);
    copy_column(origin, pini, list, |o, _| o);

    match aux {
        SchemeBuffers::Verlet { velrho_m1 } => {
            copy_column(velrho_m1, pini, list, |v, _| v);
        }
        SchemeBuffers::Symplectic {
            pos_xy_pre,
            pos_z_pre,
            velrho_pre,
        } => {
            copy_column(pos_xy_pre, pini, list, |xy, s| {
                xy + DVec2::new(perinc.x, perinc.y) * s.sign()
            });
            copy_column(pos_z_pre, pini, list, |z, s| z + perinc.z * s.sign());
            copy_column(velrho_pre, pini, list, |v, _| v);
        }
    }

    log::debug!(
        "[periodic] {} duplicated {} ghosts at {} in {}us",
        scheme,
        n,
        pini,
        start.elapsed().as_micros()
    );
    Ok(n)
}

/// Verlet flavour of [`duplicate_periodic`]
#[allow(clippy::too_many_arguments)]
pub fn periodic_duplicate_verlet(
    n: usize,
    pini: usize,
    domain_cells: [u32; 3],
    perinc: DVec3,
    list: &[PeriodicSource],
    particles: &mut ParticleArrays,
    velrho_m1: &mut [Vec4],
) -> SphResult<usize> {
    duplicate_periodic(
        n,
        pini,
        domain_cells,
        perinc,
        list,
        particles,
        SchemeBuffers::Verlet { velrho_m1 },
    )
}

/// Symplectic flavour of [`duplicate_periodic`]
#[allow(clippy::too_many_arguments)]
pub fn periodic_duplicate_symplectic(
    n: usize,
    pini: usize,
    domain_cells: [u32; 3],
    perinc: DVec3,
    list: &[PeriodicSource],
    particles: &mut ParticleArrays,
    pos_xy_pre: &mut [DVec2],
    pos_z_pre: &mut [f64],
    velrho_pre: &mut [Vec4],
) -> SphResult<usize> {
    duplicate_periodic(
        n,
        pini,
        domain_cells,
        perinc,
        list,
        particles,
        SchemeBuffers::Symplectic {
            pos_xy_pre,
            pos_z_pre,
            velrho_pre,
        },
    )
}

fn validate_request(
    n: usize,
    pini: usize,
    domain_cells: [u32; 3],
    perinc: DVec3,
    list: &[PeriodicSource],
    particles: &ParticleArrays,
    aux: &SchemeBuffers<'_>,
) -> SphResult<()> {
    particles.validate()?;
    check_len("periodic list", list.len(), n)?;

    let end = pini + n;
    if end > particles.len() {
        return Err(invalid_duplication(format!(
            "target slots {}..{} exceed the {} reserved slots",
            pini,
            end,
            particles.len()
        )));
    }
    if pini < particles.count {
        return Err(invalid_duplication(format!(
            "write offset {} overlaps the {} authoritative particles",
            pini, particles.count
        )));
    }
    if !perinc.is_finite() || perinc == DVec3::ZERO {
        return Err(invalid_duplication("periodic translation must be finite and nonzero"));
    }
    for axis in 0..3 {
        if perinc[axis] != 0.0 && domain_cells[axis] == 0 {
            return Err(invalid_duplication(format!(
                "axis {} is periodic but spans no cells",
                axis
            )));
        }
        if domain_cells[axis] > CellCode::MAX as u32 {
            return Err(invalid_duplication(format!(
                "axis {} spans {} cells, more than a cell code holds",
                axis, domain_cells[axis]
            )));
        }
    }
    if let Some(bad) = list[..n].iter().find(|s| s.slot() >= pini) {
        return Err(invalid_duplication(format!(
            "source slot {} is not below the write offset {}",
            bad.slot(),
            pini
        )));
    }

    match aux {
        SchemeBuffers::Verlet { velrho_m1 } => check_len("velrho_m1", velrho_m1.len(), end)?,
        SchemeBuffers::Symplectic {
            pos_xy_pre,
            pos_z_pre,
            velrho_pre,
        } => {
            check_len("pos_xy_pre", pos_xy_pre.len(), end)?;
            check_len("pos_z_pre", pos_z_pre.len(), end)?;
            check_len("velrho_pre", velrho_pre.len(), end)?;
        }
    }
    Ok(())
}

/// Copy `column[list[k]]` through `map` into `column[pini + k]`
fn copy_column<T, F>(column: &mut [T], pini: usize, list: &[PeriodicSource], map: F)
where
    T: Copy + Send + Sync,
    F: Fn(T, PeriodicSource) -> T + Sync + Send,
{
    let (sources, targets) = column.split_at_mut(pini);
    let sources = &*sources;
    targets[..list.len()]
        .par_iter_mut()
        .zip(list.par_iter())
        .for_each(|(target, &source)| *target = map(sources[source.slot()], source));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::TypeCode;
    use glam::Vec3;

    fn strip() -> ParticleArrays {
        let mut particles = ParticleArrays::new(8);
        for i in 0..4 {
            let slot = particles.push(
                DVec3::new(0.05 + 0.1 * i as f64, 0.0, 0.2),
                Vec3::new(i as f32, 0.0, 0.0),
                1000.0 + i as f32,
                TypeCode::fluid(0),
                100 + i,
            );
            particles.dcell[slot] = CellCode::from_coords([i as i32, 0, 2]).unwrap();
        }
        particles
    }

    #[test]
    fn test_source_encoding() {
        let s = PeriodicSource::inverse(42);
        assert_eq!(s.slot(), 42);
        assert!(s.is_inverse());
        assert!(!PeriodicSource::forward(42).is_inverse());
    }

    #[test]
    fn test_collect_sources_near_edges() {
        let particles = strip();
        let sources = collect_sources(
            &particles,
            0..particles.count,
            0,
            DVec3::ZERO,
            DVec3::new(0.4, 1.0, 1.0),
            0.1,
        );
        assert_eq!(sources, vec![PeriodicSource::forward(0), PeriodicSource::inverse(3)]);
    }

    #[test]
    fn test_verlet_ghosts_copy_and_shift() {
        let mut particles = strip();
        let mut velrho_m1: Vec<Vec4> = (0..4).map(|i| Vec4::splat(i as f32)).collect();
        let pini = particles.reserve_ghosts(2);
        velrho_m1.resize(particles.len(), Vec4::ZERO);

        let list = [PeriodicSource::forward(0), PeriodicSource::inverse(3)];
        let perinc = DVec3::new(0.4, 0.0, 0.0);
        let written =
            periodic_duplicate_verlet(2, pini, [4, 1, 1], perinc, &list, &mut particles, &mut velrho_m1)
                .unwrap();
        assert_eq!(written, 2);

        assert!((particles.position(4).x - 0.45).abs() < 1e-12);
        assert!((particles.position(5).x - (-0.05)).abs() < 1e-12);
        assert_eq!(particles.idp[4], 100);
        assert_eq!(particles.idp[5], 103);
        assert_eq!(particles.origin[4], 0);
        assert_eq!(particles.origin[5], 3);
        assert!(particles.code[4].is_periodic());
        assert!(!particles.code[0].is_periodic());
        assert_eq!(particles.dcell[4].coords(), [4, 0, 2]);
        assert_eq!(particles.dcell[5].coords(), [-1, 0, 2]);
        assert_eq!(particles.velrho[5], particles.velrho[3]);
        assert_eq!(velrho_m1[4], Vec4::splat(0.0));
        assert_eq!(velrho_m1[5], Vec4::splat(3.0));

        // Sources untouched
        assert!((particles.position(0).x - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_symplectic_ghosts_shift_predictor() {
        let mut particles = strip();
        let pini = particles.reserve_ghosts(1);
        let mut pos_xy_pre: Vec<DVec2> = particles.pos_xy.clone();
        let mut pos_z_pre: Vec<f64> = particles.pos_z.clone();
        let mut velrho_pre: Vec<Vec4> = particles.velrho.clone();
        pos_xy_pre[1].x = 0.16;

        periodic_duplicate_symplectic(
            1,
            pini,
            [4, 1, 1],
            DVec3::new(0.4, 0.0, 0.0),
            &[PeriodicSource::forward(1)],
            &mut particles,
            &mut pos_xy_pre,
            &mut pos_z_pre,
            &mut velrho_pre,
        )
        .unwrap();

        assert!((pos_xy_pre[4].x - 0.56).abs() < 1e-12);
        assert_eq!(pos_z_pre[4], 0.2);
        assert_eq!(velrho_pre[4], velrho_pre[1]);
    }

    #[test]
    fn test_rejects_bad_requests() {
        let mut particles = strip();
        let pini = particles.reserve_ghosts(1);
        let mut velrho_m1 = vec![Vec4::ZERO; particles.len()];
        let perinc = DVec3::new(0.4, 0.0, 0.0);

        // Source at or above the write offset
        let list = [PeriodicSource::forward(pini)];
        assert!(periodic_duplicate_verlet(1, pini, [4, 1, 1], perinc, &list, &mut particles, &mut velrho_m1).is_err());

        // Target range past the reserved slots
        let list = [PeriodicSource::forward(0), PeriodicSource::forward(1)];
        assert!(periodic_duplicate_verlet(2, pini, [4, 1, 1], perinc, &list, &mut particles, &mut velrho_m1).is_err());

        // Auxiliary column too short
        let mut short = vec![Vec4::ZERO; 2];
        let list = [PeriodicSource::forward(0)];
        assert!(periodic_duplicate_verlet(1, pini, [4, 1, 1], perinc, &list, &mut particles, &mut short).is_err());

        // Writing over authoritative particles
        assert!(periodic_duplicate_verlet(1, 2, [4, 1, 1], perinc, &list, &mut particles, &mut velrho_m1).is_err());

        // Domain wider than a cell code
        let huge = [CellCode::MAX as u32 + 1, 1, 1];
        assert!(periodic_duplicate_verlet(1, pini, huge, perinc, &list, &mut particles, &mut velrho_m1).is_err());
    }

    #[test]
    fn test_cell_shift_out_of_range_writes_nothing() {
        let mut particles = strip();
        particles.dcell[3] = CellCode::from_coords([CellCode::MAX - 1, 0, 2]).unwrap();
        let pini = particles.reserve_ghosts(2);
        let mut velrho_m1 = vec![Vec4::ZERO; particles.len()];

        // The second source would be pushed past the last representable cell
        let list = [PeriodicSource::forward(0), PeriodicSource::forward(3)];
        let result = periodic_duplicate_verlet(
            2,
            pini,
            [4, 1, 1],
            DVec3::new(0.4, 0.0, 0.0),
            &list,
            &mut particles,
            &mut velrho_m1,
        );
        assert!(matches!(result, Err(crate::error::SphError::InvalidParameter { .. })));
        assert!(particles.code[pini..].iter().all(|c| *c == TypeCode::UNUSED));
        assert!(particles.pos_xy[pini..].iter().all(|xy| *xy == DVec2::ZERO));
    }
}
