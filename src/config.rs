//! TOML configuration of kernels and phases.
//!
//! ```toml
//! [kernel]
//! kind = "wendland"
//! h = 0.02
//! simulate_2d = true
//!
//! [interaction]
//! visco_treatment = "laminar"
//! gravity = [0.0, 0.0, -9.81]
//!
//! [mdbc]
//! slip = "no_slip"
//!
//! [[phase]]
//! id = 0
//! rho0 = 1000.0
//! mass = 0.4
//! cs0 = 30.0
//! visco = 0.001
//! ```

use std::collections::HashSet;
use std::path::Path;

use glam::{DVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::division::DivData;
use crate::error::{invalid_parameter, SphResult};
use crate::interaction::{ForceOutput, InteractionParams, ViscoTreatment};
use crate::kernel::KernelKind;
use crate::launch::LaunchConfig;
use crate::mdbc::{MdbcConfig, SlipMode};
use crate::particles::ParticleArrays;
use crate::phases::{
    reload_phase_store, DruckerPragerCte, PhaseCte, PhaseRheology, RheologyLaw, UploadOutcome,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphConfig {
    pub kernel: KernelSection,
    #[serde(default)]
    pub interaction: InteractionSection,
    #[serde(default)]
    pub mdbc: MdbcSection,
    #[serde(default)]
    pub launch: LaunchConfig,
    #[serde(default, rename = "phase")]
    pub phases: Vec<PhaseSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSection {
    pub kind: KernelKind,
    /// Smoothing length
    pub h: f32,
    #[serde(default)]
    pub simulate_2d: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionSection {
    pub visco_treatment: ViscoTreatment,
    /// Artificial viscosity coefficient between fluid particles
    pub visco: f32,
    /// Artificial viscosity coefficient against boundaries
    pub visco_bound: f32,
    pub gravity: [f32; 3],
    /// Density diffusion coefficient, off when absent
    pub delta: Option<f32>,
}

impl Default for InteractionSection {
    fn default() -> Self {
        Self {
            visco_treatment: ViscoTreatment::Laminar,
            visco: 0.01,
            visco_bound: 1.0,
            gravity: [0.0, 0.0, -9.81],
            delta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdbcSection {
    pub slip: SlipMode,
    pub slip_factor: f32,
    pub threshold: f32,
    pub fast_single: bool,
}

impl Default for MdbcSection {
    fn default() -> Self {
        Self {
            slip: SlipMode::NoSlip,
            slip_factor: 0.0,
            threshold: 0.0,
            fast_single: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSection {
    pub id: u16,
    pub rho0: f32,
    pub mass: f32,
    pub cs0: f32,
    #[serde(default = "default_gamma")]
    pub gamma: f32,
    #[serde(default = "default_law")]
    pub rheology: RheologyLaw,
    /// Viscosity, or consistency index for power-law phases
    pub visco: f32,
    #[serde(default = "default_flow_index")]
    pub flow_index: f32,
    #[serde(default)]
    pub papanastasiou_m: f32,
    #[serde(default)]
    pub tau_yield: f32,
    #[serde(default = "default_visco_max")]
    pub visco_max: f32,
    #[serde(default)]
    pub drucker_prager: Option<DruckerPragerSection>,
}

/// Plasticity block of a phase, angles in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DruckerPragerSection {
    pub cohesion: f32,
    pub friction_angle: f32,
    #[serde(default)]
    pub dilatancy_angle: f32,
    pub young_modulus: f32,
    pub poisson_ratio: f32,
}

fn default_gamma() -> f32 {
    7.0
}

fn default_law() -> RheologyLaw {
    RheologyLaw::Newtonian
}

fn default_flow_index() -> f32 {
    1.0
}

fn default_visco_max() -> f32 {
    1.0e9
}

impl PhaseSection {
    pub fn constants(&self) -> PhaseCte {
        PhaseCte::new(self.id, self.rho0, self.mass, self.cs0, self.gamma)
    }

    pub fn rheology(&self) -> PhaseRheology {
        PhaseRheology::new(
            self.id,
            self.rheology,
            self.visco,
            self.flow_index,
            self.papanastasiou_m,
            self.tau_yield,
            self.visco_max,
        )
    }

    pub fn plasticity(&self) -> Option<DruckerPragerCte> {
        self.drucker_prager.as_ref().map(|dp| {
            DruckerPragerCte::new(
                self.id,
                dp.cohesion,
                dp.friction_angle.to_radians(),
                dp.dilatancy_angle.to_radians(),
                dp.young_modulus,
                dp.poisson_ratio,
            )
        })
    }
}

/// Phase tables ready for upload
#[derive(Debug, Clone, Default)]
pub struct PhaseTables {
    pub constants: Vec<PhaseCte>,
    pub rheology: Vec<PhaseRheology>,
    pub plasticity: Vec<DruckerPragerCte>,
}

impl SphConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> SphResult<Self> {
        let config: SphConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> SphResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("[config] loaded {} phases from {}", config.phases.len(), path.display());
        Ok(config)
    }

    pub fn to_toml_string(&self) -> SphResult<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> SphResult<()> {
        if !(self.kernel.h > 0.0) || !self.kernel.h.is_finite() {
            return Err(invalid_parameter("kernel.h", format!("{} is not a positive length", self.kernel.h)));
        }
        let it = &self.interaction;
        if !(it.visco >= 0.0) || !(it.visco_bound >= 0.0) {
            return Err(invalid_parameter("interaction.visco", "artificial viscosity must not be negative"));
        }
        if it.gravity.iter().any(|g| !g.is_finite()) {
            return Err(invalid_parameter("interaction.gravity", "components must be finite"));
        }
        if let Some(delta) = it.delta {
            if !(delta >= 0.0) {
                return Err(invalid_parameter("interaction.delta", format!("{} must not be negative", delta)));
            }
        }
        if !(0.0..=1.0).contains(&self.mdbc.slip_factor) {
            return Err(invalid_parameter(
                "mdbc.slip_factor",
                format!("{} is outside [0, 1]", self.mdbc.slip_factor),
            ));
        }
        if !(self.mdbc.threshold >= 0.0) {
            return Err(invalid_parameter("mdbc.threshold", "must not be negative"));
        }
        if self.phases.is_empty() {
            return Err(invalid_parameter("phase", "at least one phase is required"));
        }

        let mut seen = HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.id) {
                return Err(crate::error::SphError::DuplicatePhase {
                    table: "config",
                    phase: phase.id,
                });
            }
            phase.constants().validate()?;
            phase.rheology().validate()?;
            if let Some(dp) = phase.plasticity() {
                dp.validate()?;
            }
        }
        Ok(())
    }

    pub fn phase_tables(&self) -> PhaseTables {
        PhaseTables {
            constants: self.phases.iter().map(PhaseSection::constants).collect(),
            rheology: self.phases.iter().map(PhaseSection::rheology).collect(),
            plasticity: self.phases.iter().filter_map(PhaseSection::plasticity).collect(),
        }
    }

    /// Configuration reload: validate and swap both phase tables at once.
    ///
    /// Waits for in-flight kernels holding the tables.
    pub fn apply(&self) -> SphResult<(UploadOutcome, UploadOutcome)> {
        self.validate()?;
        let tables = self.phase_tables();
        reload_phase_store(&tables.constants, &tables.rheology, &tables.plasticity)
    }

    pub fn gravity(&self) -> Vec3 {
        Vec3::from_array(self.interaction.gravity)
    }

    /// Parameter bundle for one force launch
    pub fn interaction_params<'a>(
        &self,
        map_pos_min: DVec3,
        div: &'a DivData,
        particles: &'a ParticleArrays,
        npb: usize,
        out: &'a mut ForceOutput,
    ) -> InteractionParams<'a> {
        InteractionParams {
            kernel: self.kernel.kind,
            simulate_2d: self.kernel.simulate_2d,
            h: self.kernel.h,
            visco_treatment: self.interaction.visco_treatment,
            visco: self.interaction.visco,
            visco_bound: self.interaction.visco_bound,
            delta: self.interaction.delta,
            gravity: self.gravity(),
            map_pos_min,
            div,
            particles,
            npb,
            out,
        }
    }

    pub fn mdbc_config(&self) -> MdbcConfig {
        MdbcConfig {
            kernel: self.kernel.kind,
            simulate_2d: self.kernel.simulate_2d,
            h: self.kernel.h,
            slip_mode: self.mdbc.slip,
            slip_factor: self.mdbc.slip_factor,
            threshold: self.mdbc.threshold,
            fast_single: self.mdbc.fast_single,
        }
    }
}
