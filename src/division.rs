use glam::DVec3;
use rayon::prelude::*;

use crate::error::{invalid_parameter, SphResult};
use crate::particles::ParticleArrays;

const CELL_BITS: u32 = 21;
const CELL_MASK: u64 = (1 << CELL_BITS) - 1;
const CELL_OFFSET: i64 = 1 << (CELL_BITS - 1);

/// Largest number of cells one division may span
pub const MAX_CELLS: usize = 1 << 28;

/// Packed signed cell coordinate.
///
/// Each axis takes 21 bits with an offset of 2^20, so coordinates in
/// `CellCode::MIN..=CellCode::MAX` round-trip. Ghost particles may sit in
/// negative cells. Coordinates outside that range are rejected, never
/// wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct CellCode(pub u64);

impl CellCode {
    pub const MIN: i32 = -(CELL_OFFSET as i32);
    pub const MAX: i32 = CELL_OFFSET as i32 - 1;

    pub fn from_coords(cell: [i32; 3]) -> SphResult<Self> {
        Self::pack([cell[0] as i64, cell[1] as i64, cell[2] as i64])
    }

    pub fn coords(self) -> [i32; 3] {
        let unpack = |bits: u64| ((bits & CELL_MASK) as i64 - CELL_OFFSET) as i32;
        [
            unpack(self.0 >> (2 * CELL_BITS)),
            unpack(self.0 >> CELL_BITS),
            unpack(self.0),
        ]
    }

    /// Cell moved by a whole number of cells on each axis
    pub fn shifted(self, delta: [i32; 3]) -> SphResult<Self> {
        let c = self.coords();
        Self::pack([
            c[0] as i64 + delta[0] as i64,
            c[1] as i64 + delta[1] as i64,
            c[2] as i64 + delta[2] as i64,
        ])
    }

    fn pack(cell: [i64; 3]) -> SphResult<Self> {
        if let Some(axis) = (0..3).find(|&a| !fits(cell[a])) {
            return Err(invalid_parameter(
                "cell",
                format!(
                    "coordinate {} on axis {} is outside {}..={}",
                    cell[axis],
                    axis,
                    Self::MIN,
                    Self::MAX
                ),
            ));
        }
        let bits = |c: i64| (c + CELL_OFFSET) as u64 & CELL_MASK;
        Ok(Self((bits(cell[0]) << (2 * CELL_BITS)) | (bits(cell[1]) << CELL_BITS) | bits(cell[2])))
    }
}

fn fits(c: i64) -> bool {
    (CellCode::MIN as i64..=CellCode::MAX as i64).contains(&c)
}

/// Read-only spatial division of the particle slots into cubic cells.
///
/// Owned and rebuilt by the step driver; the kernels only query it. The
/// cell size must be at least the kernel support so that the 27 (9 in 2D)
/// cells around a position hold every neighbour.
#[derive(Debug, Clone)]
pub struct DivData {
    cell_size: f64,
    simulate_2d: bool,
    cell_min: [i32; 3],
    ncells: [usize; 3],
    /// Offset of each cell's first entry in `slots`, one extra at the end
    begin: Vec<u32>,
    /// Particle slots grouped by cell
    slots: Vec<u32>,
}

impl DivData {
    /// Reference builder: counting sort of every non-excluded slot into cells.
    ///
    /// `map_pos_min` is the domain minimum corner the cells are measured from.
    /// Every non-excluded slot must have a finite position whose cell fits a
    /// [`CellCode`].
    pub fn build(
        particles: &ParticleArrays,
        map_pos_min: DVec3,
        cell_size: f64,
        simulate_2d: bool,
    ) -> SphResult<Self> {
        if !(cell_size > 0.0) || !cell_size.is_finite() {
            return Err(invalid_parameter("cell_size", format!("{} is not a positive length", cell_size)));
        }
        particles.validate()?;

        let n = particles.len();
        let cells: Vec<Option<[i32; 3]>> = (0..n)
            .into_par_iter()
            .map(|p| -> SphResult<Option<[i32; 3]>> {
                if particles.code[p].is_excluded() {
                    return Ok(None);
                }
                let cell = checked_cell(particles.position(p), map_pos_min, cell_size, simulate_2d)
                    .ok_or_else(|| {
                        invalid_parameter(
                            "position",
                            format!("slot {} at {} lies outside the cell range", p, particles.position(p)),
                        )
                    })?;
                Ok(Some(cell))
            })
            .collect::<SphResult<_>>()?;

        let mut cell_min = [i32::MAX; 3];
        let mut cell_max = [i32::MIN; 3];
        for c in cells.iter().flatten() {
            for axis in 0..3 {
                cell_min[axis] = cell_min[axis].min(c[axis]);
                cell_max[axis] = cell_max[axis].max(c[axis]);
            }
        }
        if cell_min[0] == i32::MAX {
            cell_min = [0; 3];
            cell_max = [-1; 3];
        }

        let ncells = [
            (cell_max[0] - cell_min[0] + 1).max(0) as usize,
            (cell_max[1] - cell_min[1] + 1).max(0) as usize,
            (cell_max[2] - cell_min[2] + 1).max(0) as usize,
        ];
        let total = ncells[0] * ncells[1] * ncells[2];
        if total > MAX_CELLS {
            return Err(invalid_parameter(
                "cell_size",
                format!(
                    "{}x{}x{} cells exceed the limit of {}",
                    ncells[0], ncells[1], ncells[2], MAX_CELLS
                ),
            ));
        }

        let linear = |c: &[i32; 3]| -> usize {
            let x = (c[0] - cell_min[0]) as usize;
            let y = (c[1] - cell_min[1]) as usize;
            let z = (c[2] - cell_min[2]) as usize;
            (z * ncells[1] + y) * ncells[0] + x
        };

        let mut begin = vec![0u32; total + 1];
        for c in cells.iter().flatten() {
            begin[linear(c) + 1] += 1;
        }
        for i in 0..total {
            begin[i + 1] += begin[i];
        }

        let mut cursor = begin.clone();
        let mut slots = vec![0u32; begin[total] as usize];
        for (p, c) in cells.iter().enumerate() {
            if let Some(c) = c {
                let cell = linear(c);
                slots[cursor[cell] as usize] = p as u32;
                cursor[cell] += 1;
            }
        }

        log::trace!(
            "[division] {} slots in {}x{}x{} cells of size {}",
            slots.len(),
            ncells[0],
            ncells[1],
            ncells[2],
            cell_size
        );

        Ok(Self {
            cell_size,
            simulate_2d,
            cell_min,
            ncells,
            begin,
            slots,
        })
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn simulate_2d(&self) -> bool {
        self.simulate_2d
    }

    /// Number of slots registered in the division
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Cell coordinate of an arbitrary position
    pub fn cell_of(&self, pos: DVec3, map_pos_min: DVec3) -> [i32; 3] {
        cell_coords(pos, map_pos_min, self.cell_size, self.simulate_2d)
    }

    /// Write the packed cell of every non-excluded slot into `particles.dcell`
    pub fn assign_cells(&self, particles: &mut ParticleArrays, map_pos_min: DVec3) -> SphResult<()> {
        let ParticleArrays {
            pos_xy,
            pos_z,
            code,
            dcell,
            ..
        } = particles;
        let (pos_xy, pos_z, code) = (&*pos_xy, &*pos_z, &*code);
        dcell.par_iter_mut().enumerate().try_for_each(|(p, cell)| -> SphResult<()> {
            if code[p].is_excluded() {
                return Ok(());
            }
            let pos = DVec3::new(pos_xy[p].x, pos_xy[p].y, pos_z[p]);
            let coords = checked_cell(pos, map_pos_min, self.cell_size, self.simulate_2d)
                .ok_or_else(|| invalid_parameter("position", format!("slot {} at {} has no cell", p, pos)))?;
            *cell = CellCode::from_coords(coords)?;
            Ok(())
        })
    }

    /// Visit every slot in the cells adjacent to `pos`.
    ///
    /// Candidates still need a distance check against the kernel support.
    /// Non-finite positions have no candidates.
    pub fn for_each_candidate<F: FnMut(usize)>(&self, pos: DVec3, map_pos_min: DVec3, mut f: F) {
        if self.slots.is_empty() || !pos.is_finite() {
            return;
        }
        // Saturated coordinates of far-away positions stay in range in i64
        let c = self.cell_of(pos, map_pos_min).map(i64::from);
        let min = self.cell_min.map(i64::from);
        let ncells = self.ncells.map(|n| n as i64);
        let y_range = if self.simulate_2d { 0..=0 } else { -1..=1 };
        for dz in -1..=1 {
            let z = c[2] + dz - min[2];
            if z < 0 || z >= ncells[2] {
                continue;
            }
            for dy in y_range.clone() {
                let y = c[1] + dy - min[1];
                if y < 0 || y >= ncells[1] {
                    continue;
                }
                let row = (z as usize * self.ncells[1] + y as usize) * self.ncells[0];
                // Cells along x are contiguous, so one range covers all three
                let x0 = (c[0] - 1 - min[0]).max(0);
                let x1 = (c[0] + 1 - min[0]).min(ncells[0] - 1);
                if x0 > x1 {
                    continue;
                }
                let start = self.begin[row + x0 as usize] as usize;
                let end = self.begin[row + x1 as usize + 1] as usize;
                for &slot in &self.slots[start..end] {
                    f(slot as usize);
                }
            }
        }
    }
}

/// Cell of a finite position inside the [`CellCode`] range
fn checked_cell(pos: DVec3, map_pos_min: DVec3, cell_size: f64, simulate_2d: bool) -> Option<[i32; 3]> {
    if !pos.is_finite() {
        return None;
    }
    let cell = cell_coords(pos, map_pos_min, cell_size, simulate_2d);
    cell.iter().all(|&c| fits(c as i64)).then_some(cell)
}

fn cell_coords(pos: DVec3, map_pos_min: DVec3, cell_size: f64, simulate_2d: bool) -> [i32; 3] {
    let rel = (pos - map_pos_min) / cell_size;
    [
        rel.x.floor() as i32,
        if simulate_2d { 0 } else { rel.y.floor() as i32 },
        rel.z.floor() as i32,
    ]
}
