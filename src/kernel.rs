//! SPH smoothing kernels.
//!
//! Both kernels have support radius `2h`. Evaluation returns the kernel
//! value and a gradient factor `fac` such that `grad W = dr * fac`, where
//! `dr` points from the neighbour to the particle being evaluated.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Squared distances below this are treated as coincident particles
pub const ALMOST_ZERO: f32 = 1.0e-18;

/// Kernel shape selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    Cubic,
    Wendland,
}

/// Kernel with its normalisation constants precomputed for one `h`
#[derive(Debug, Clone, Copy)]
pub struct SphKernel {
    kind: KernelKind,
    h: f32,
    support2: f32,
    // Wendland
    awen: f32,
    bwen: f32,
    // Cubic spline
    cub_a2: f32,
    cub_c1: f32,
    cub_d1: f32,
    cub_c2: f32,
}

impl SphKernel {
    pub fn new(kind: KernelKind, h: f32, simulate_2d: bool) -> Self {
        let (awen, bwen) = if simulate_2d {
            let awen = 7.0 / (4.0 * PI * h * h);
            (awen, -5.0 * awen / h)
        } else {
            let awen = 21.0 / (16.0 * PI * h * h * h);
            (awen, -5.0 * awen / h)
        };

        let (a2, aa) = if simulate_2d {
            let a1 = 10.0 / (7.0 * PI);
            (a1 / (h * h), a1 / (h * h * h))
        } else {
            let a1 = 1.0 / PI;
            (a1 / (h * h * h), a1 / (h * h * h * h))
        };

        Self {
            kind,
            h,
            support2: 4.0 * h * h,
            awen,
            bwen,
            cub_a2: a2,
            cub_c1: -3.0 * aa,
            cub_d1: 2.25 * aa,
            cub_c2: -0.75 * aa,
        }
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    pub fn h(&self) -> f32 {
        self.h
    }

    /// Support radius `2h`
    pub fn support(&self) -> f32 {
        2.0 * self.h
    }

    /// Squared support radius
    pub fn support2(&self) -> f32 {
        self.support2
    }

    /// True when a squared distance lies inside the support and is not degenerate
    #[inline]
    pub fn in_support(&self, rr2: f32) -> bool {
        rr2 <= self.support2 && rr2 >= ALMOST_ZERO
    }

    /// Kernel value and gradient factor for squared distance `rr2`
    #[inline]
    pub fn wab_fac(&self, rr2: f32) -> (f32, f32) {
        let r = rr2.sqrt();
        let q = r / self.h;
        if q >= 2.0 {
            return (0.0, 0.0);
        }
        match self.kind {
            KernelKind::Wendland => {
                let wqq1 = 1.0 - 0.5 * q;
                let wqq2 = wqq1 * wqq1;
                let w = self.awen * (2.0 * q + 1.0) * wqq2 * wqq2;
                let fac = if r > 0.0 { self.bwen * q * wqq2 * wqq1 / r } else { 0.0 };
                (w, fac)
            }
            KernelKind::Cubic => {
                if q < 1.0 {
                    let w = self.cub_a2 * (1.0 - 1.5 * q * q + 0.75 * q * q * q);
                    let fac = if r > 0.0 {
                        (self.cub_c1 * q + self.cub_d1 * q * q) / r
                    } else {
                        0.0
                    };
                    (w, fac)
                } else {
                    let wqq = 2.0 - q;
                    let w = self.cub_a2 * 0.25 * wqq * wqq * wqq;
                    let fac = if r > 0.0 { self.cub_c2 * wqq * wqq / r } else { 0.0 };
                    (w, fac)
                }
            }
        }
    }

    #[inline]
    pub fn wab(&self, rr2: f32) -> f32 {
        self.wab_fac(rr2).0
    }
}
