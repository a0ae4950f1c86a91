//! Kernel-weighted first-order extrapolation around a ghost node.
//!
//! For every field `f` the unknowns are the value at the node and its
//! gradient. Testing the Taylor expansion `f_j = f + grad f . d_j` against
//! the kernel and its gradient gives a 4x4 system (3x3 in 2D) shared by all
//! fields; only the right hand sides differ.

use glam::{DMat3, DMat4, DVec3, DVec4, Vec3};

/// Density followed by the three velocity components
pub const FIELD_COUNT: usize = 4;

/// Outcome of a solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extrapolation {
    /// Value and gradient of each field at the ghost node
    FirstOrder {
        values: [f64; FIELD_COUNT],
        gradients: [DVec3; FIELD_COUNT],
    },
    /// Shepard-normalised kernel average
    ZerothOrder { values: [f64; FIELD_COUNT] },
    /// No fluid neighbour carries any kernel weight
    NoFluid,
}

#[derive(Debug, Clone, Copy)]
pub struct LeastSquares {
    simulate_2d: bool,
    /// Row-major moment matrix
    a: [[f64; 4]; 4],
    rhs: [[f64; 4]; FIELD_COUNT],
}

impl LeastSquares {
    pub fn new(simulate_2d: bool) -> Self {
        Self {
            simulate_2d,
            a: [[0.0; 4]; 4],
            rhs: [[0.0; 4]; FIELD_COUNT],
        }
    }

    /// Add one neighbour.
    ///
    /// `dr` is node minus neighbour, `w` and `fac` the kernel value and
    /// gradient factor, `fields` the neighbour's density and velocity.
    pub fn add(&mut self, volume: f32, dr: Vec3, w: f32, fac: f32, fields: [f32; FIELD_COUNT]) {
        let volume = volume as f64;
        let d = -dr.as_dvec3();
        let g = dr.as_dvec3() * fac as f64;
        let test = [w as f64, g.x, g.y, g.z];
        let trial = [1.0, d.x, d.y, d.z];

        for r in 0..4 {
            let vt = volume * test[r];
            for c in 0..4 {
                self.a[r][c] += vt * trial[c];
            }
            for (f, value) in fields.iter().enumerate() {
                self.rhs[f][r] += vt * *value as f64;
            }
        }
    }

    /// Kernel sum of the neighbourhood
    pub fn kernel_sum(&self) -> f64 {
        self.a[0][0]
    }

    /// Determinant of the moment matrix
    pub fn determinant(&self) -> f64 {
        if self.simulate_2d {
            self.matrix_2d().determinant()
        } else {
            self.matrix_3d().determinant()
        }
    }

    /// First order when `|det| >= threshold`, Shepard otherwise
    pub fn solve(&self, threshold: f64) -> Extrapolation {
        let a11 = self.kernel_sum();
        if !(a11 > 0.0) {
            return Extrapolation::NoFluid;
        }

        let det = self.determinant();
        if det.is_finite() && det.abs() >= threshold && det != 0.0 {
            let mut values = [0.0; FIELD_COUNT];
            let mut gradients = [DVec3::ZERO; FIELD_COUNT];
            if self.simulate_2d {
                let inv = self.matrix_2d().inverse();
                for f in 0..FIELD_COUNT {
                    let b = self.rhs[f];
                    let x = inv * DVec3::new(b[0], b[1], b[3]);
                    values[f] = x.x;
                    gradients[f] = DVec3::new(x.y, 0.0, x.z);
                }
            } else {
                let inv = self.matrix_3d().inverse();
                for f in 0..FIELD_COUNT {
                    let x = inv * DVec4::from_array(self.rhs[f]);
                    values[f] = x.x;
                    gradients[f] = DVec3::new(x.y, x.z, x.w);
                }
            }
            if values.iter().all(|v| v.is_finite()) && gradients.iter().all(|g| g.is_finite()) {
                return Extrapolation::FirstOrder { values, gradients };
            }
        }

        let mut values = [0.0; FIELD_COUNT];
        for f in 0..FIELD_COUNT {
            values[f] = self.rhs[f][0] / a11;
        }
        Extrapolation::ZerothOrder { values }
    }

    fn matrix_3d(&self) -> DMat4 {
        // glam takes columns, the moments are stored by row
        DMat4::from_cols_array_2d(&self.a).transpose()
    }

    /// The X-Z block of the moment matrix
    fn matrix_2d(&self) -> DMat3 {
        let idx = [0, 1, 3];
        let mut rows = [[0.0; 3]; 3];
        for (r, &ri) in idx.iter().enumerate() {
            for (c, &ci) in idx.iter().enumerate() {
                rows[r][c] = self.a[ri][ci];
            }
        }
        DMat3::from_cols_array_2d(&rows).transpose()
    }
}
