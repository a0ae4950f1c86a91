//! Small tensor helpers shared by the kernels.

use glam::Mat3;
use std::ops::{Add, AddAssign, Mul, Sub};

/// Symmetric 3x3 tensor with its 6 independent components.
///
/// Used for strain rates and stresses. Sign convention for stresses is
/// tension positive.
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct SymMatrix3 {
    pub xx: f32,
    pub xy: f32,
    pub xz: f32,
    pub yy: f32,
    pub yz: f32,
    pub zz: f32,
}

impl SymMatrix3 {
    pub const ZERO: Self = Self {
        xx: 0.0,
        xy: 0.0,
        xz: 0.0,
        yy: 0.0,
        yz: 0.0,
        zz: 0.0,
    };

    pub fn new(xx: f32, xy: f32, xz: f32, yy: f32, yz: f32, zz: f32) -> Self {
        Self { xx, xy, xz, yy, yz, zz }
    }

    /// `s * I`
    pub fn diagonal(s: f32) -> Self {
        Self::new(s, 0.0, 0.0, s, 0.0, s)
    }

    /// Symmetric part of a (velocity gradient) matrix
    pub fn symmetric_part(m: Mat3) -> Self {
        // glam is column major: m.col(j)[i] is entry (i, j)
        let a = m.to_cols_array_2d();
        let e = |i: usize, j: usize| a[j][i];
        Self::new(
            e(0, 0),
            0.5 * (e(0, 1) + e(1, 0)),
            0.5 * (e(0, 2) + e(2, 0)),
            e(1, 1),
            0.5 * (e(1, 2) + e(2, 1)),
            e(2, 2),
        )
    }

    pub fn trace(&self) -> f32 {
        self.xx + self.yy + self.zz
    }

    /// Deviatoric part, `self - tr/3 * I`
    pub fn deviatoric(&self) -> Self {
        let mean = self.trace() / 3.0;
        Self::new(
            self.xx - mean,
            self.xy,
            self.xz,
            self.yy - mean,
            self.yz,
            self.zz - mean,
        )
    }

    /// Full contraction `A:B`
    pub fn double_dot(&self, other: &Self) -> f32 {
        self.xx * other.xx
            + self.yy * other.yy
            + self.zz * other.zz
            + 2.0 * (self.xy * other.xy + self.xz * other.xz + self.yz * other.yz)
    }

    /// Second invariant of the deviatoric part, `J2 = s:s / 2`
    pub fn j2(&self) -> f32 {
        let s = self.deviatoric();
        0.5 * s.double_dot(&s)
    }

    /// Tensor times vector
    pub fn mul_vec(&self, v: glam::Vec3) -> glam::Vec3 {
        glam::Vec3::new(
            self.xx * v.x + self.xy * v.y + self.xz * v.z,
            self.xy * v.x + self.yy * v.y + self.yz * v.z,
            self.xz * v.x + self.yz * v.y + self.zz * v.z,
        )
    }

    pub fn is_finite(&self) -> bool {
        [self.xx, self.xy, self.xz, self.yy, self.yz, self.zz]
            .iter()
            .all(|c| c.is_finite())
    }
}

impl Add for SymMatrix3 {
    type Output = Self;

    fn add(self, o: Self) -> Self {
        Self::new(
            self.xx + o.xx,
            self.xy + o.xy,
            self.xz + o.xz,
            self.yy + o.yy,
            self.yz + o.yz,
            self.zz + o.zz,
        )
    }
}

impl AddAssign for SymMatrix3 {
    fn add_assign(&mut self, o: Self) {
        *self = *self + o;
    }
}

impl Sub for SymMatrix3 {
    type Output = Self;

    fn sub(self, o: Self) -> Self {
        Self::new(
            self.xx - o.xx,
            self.xy - o.xy,
            self.xz - o.xz,
            self.yy - o.yy,
            self.yz - o.yz,
            self.zz - o.zz,
        )
    }
}

impl Mul<f32> for SymMatrix3 {
    type Output = Self;

    fn mul(self, s: f32) -> Self {
        Self::new(
            self.xx * s,
            self.xy * s,
            self.xz * s,
            self.yy * s,
            self.yz * s,
            self.zz * s,
        )
    }
}
