//! Per-phase material constants and their process-wide store.

pub mod constants;
pub mod plasticity;
pub mod rheology;
pub mod store;

pub use constants::{PhaseCte, PhaseRheology, RheologyLaw, DENSITY_FLOOR_RATIO};
pub use plasticity::DruckerPragerCte;
pub use store::{
    clear_phase_store, phase_table, plasticity_table, reload_phase_store, upload_phase_constants,
    upload_plasticity_constants, PhaseTable, PlasticityTable, UploadOutcome,
};
