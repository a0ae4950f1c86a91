use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::rheology;
use crate::error::{invalid_phase, SphResult};

/// Smallest density used by the kernels, as a fraction of the rest density
pub const DENSITY_FLOOR_RATIO: f32 = 1.0e-3;

/// Physical constants of one phase
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PhaseCte {
    /// Phase id as stored in the particle code
    pub phase_id: u32,

    /// Rest density (kg/m³)
    pub rho0: f32,

    /// Particle mass (kg)
    pub mass: f32,

    /// Numerical speed of sound (m/s)
    pub cs0: f32,

    /// Polytropic exponent of the Tait equation of state
    pub gamma: f32,

    /// Tait coefficient `cs0² rho0 / gamma`
    pub cte_b: f32,
}

impl PhaseCte {
    pub fn new(phase_id: u16, rho0: f32, mass: f32, cs0: f32, gamma: f32) -> Self {
        Self {
            phase_id: phase_id as u32,
            rho0,
            mass,
            cs0,
            gamma,
            cte_b: cs0 * cs0 * rho0 / gamma,
        }
    }

    pub fn phase(&self) -> u16 {
        self.phase_id as u16
    }

    /// Density clamped away from zero
    #[inline]
    pub fn floor_density(&self, rho: f32) -> f32 {
        let floor = DENSITY_FLOOR_RATIO * self.rho0;
        if rho > floor {
            rho
        } else {
            floor
        }
    }

    /// Tait equation of state
    #[inline]
    pub fn pressure(&self, rho: f32) -> f32 {
        let rho = self.floor_density(rho);
        self.cte_b * ((rho / self.rho0).powf(self.gamma) - 1.0)
    }

    pub fn validate(&self) -> SphResult<()> {
        let phase = self.phase();
        if self.phase_id > crate::particles::TypeCode::MAX_PHASE as u32 {
            return Err(invalid_phase(phase, format!("phase id {} does not fit in a particle code", self.phase_id)));
        }
        if !(self.rho0 > 0.0) {
            return Err(invalid_phase(phase, "rest density must be positive"));
        }
        if !(self.mass > 0.0) {
            return Err(invalid_phase(phase, "particle mass must be positive"));
        }
        if !(self.cs0 > 0.0) {
            return Err(invalid_phase(phase, "speed of sound must be positive"));
        }
        if !(self.gamma > 0.0) {
            return Err(invalid_phase(phase, "gamma must be positive"));
        }
        Ok(())
    }
}

/// Rheology law of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RheologyLaw {
    Newtonian,
    /// Ostwald power law, `mu = k γ̇^(n-1)`
    PowerLaw,
    /// Bingham with Papanastasiou regularisation
    BinghamPapanastasiou,
    /// Herschel-Bulkley with Papanastasiou regularisation
    HerschelBulkleyPapanastasiou,
}

impl RheologyLaw {
    pub fn as_u32(self) -> u32 {
        match self {
            RheologyLaw::Newtonian => 0,
            RheologyLaw::PowerLaw => 1,
            RheologyLaw::BinghamPapanastasiou => 2,
            RheologyLaw::HerschelBulkleyPapanastasiou => 3,
        }
    }

    pub fn from_u32(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(RheologyLaw::Newtonian),
            1 => Some(RheologyLaw::PowerLaw),
            2 => Some(RheologyLaw::BinghamPapanastasiou),
            3 => Some(RheologyLaw::HerschelBulkleyPapanastasiou),
            _ => None,
        }
    }
}

/// Rheology parameters of one phase, uploaded together with [`PhaseCte`]
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PhaseRheology {
    pub phase_id: u32,

    /// [`RheologyLaw`] tag
    pub law: u32,

    /// Dynamic viscosity, or consistency index for power-law fluids (Pa·s^n)
    pub visco: f32,

    /// Flow behaviour index `n`
    pub flow_index: f32,

    /// Papanastasiou exponent `m` (s)
    pub papanastasiou_m: f32,

    /// Yield stress (Pa)
    pub tau_yield: f32,

    /// Ceiling for the effective viscosity (Pa·s)
    pub visco_max: f32,
}

impl PhaseRheology {
    pub fn newtonian(phase_id: u16, visco: f32) -> Self {
        Self {
            phase_id: phase_id as u32,
            law: RheologyLaw::Newtonian.as_u32(),
            visco,
            flow_index: 1.0,
            papanastasiou_m: 0.0,
            tau_yield: 0.0,
            visco_max: f32::MAX,
        }
    }

    pub fn new(
        phase_id: u16,
        law: RheologyLaw,
        visco: f32,
        flow_index: f32,
        papanastasiou_m: f32,
        tau_yield: f32,
        visco_max: f32,
    ) -> Self {
        Self {
            phase_id: phase_id as u32,
            law: law.as_u32(),
            visco,
            flow_index,
            papanastasiou_m,
            tau_yield,
            visco_max,
        }
    }

    pub fn law(&self) -> RheologyLaw {
        RheologyLaw::from_u32(self.law).unwrap_or(RheologyLaw::Newtonian)
    }

    /// Effective viscosity at shear rate `gamma_dot`
    #[inline]
    pub fn effective_viscosity(&self, gamma_dot: f32) -> f32 {
        rheology::effective_viscosity(self, gamma_dot)
    }

    pub fn validate(&self) -> SphResult<()> {
        let phase = self.phase_id as u16;
        if RheologyLaw::from_u32(self.law).is_none() {
            return Err(invalid_phase(phase, format!("unknown rheology law tag {}", self.law)));
        }
        if !(self.visco >= 0.0) {
            return Err(invalid_phase(phase, "viscosity must not be negative"));
        }
        if !(self.flow_index > 0.0) {
            return Err(invalid_phase(phase, "flow index must be positive"));
        }
        if !(self.papanastasiou_m >= 0.0) || !(self.tau_yield >= 0.0) {
            return Err(invalid_phase(phase, "yield parameters must not be negative"));
        }
        if !(self.visco_max > 0.0) {
            return Err(invalid_phase(phase, "viscosity ceiling must be positive"));
        }
        Ok(())
    }
}
