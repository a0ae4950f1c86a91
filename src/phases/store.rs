//! Process-wide phase constant store.
//!
//! Uploads replace a table under its write lock, kernels hold the read lock
//! for the whole launch. An upload therefore waits for in-flight kernels and
//! every kernel sees exactly one version of each table.
//!
//! Readers that need both tables lock the base table first. A reload takes
//! both write locks in that same order, so no kernel ever pairs a new base
//! table with an old plasticity table.

use lazy_static::lazy_static;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use super::{DruckerPragerCte, PhaseCte, PhaseRheology};
use crate::error::{SphError, SphResult};
use crate::particles::TypeCode;

/// Result of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The table was installed or replaced
    Replaced,
    /// An identical table was already installed
    Unchanged,
}

/// Base physical and rheology constants, indexed by phase id
#[derive(Debug, Clone)]
pub struct PhaseTable {
    constants: Vec<PhaseCte>,
    rheology: Vec<PhaseRheology>,
    rows: Vec<Option<u16>>,
    fingerprint: u32,
}

impl PhaseTable {
    fn build(phase_count: usize, constants: &[PhaseCte], rheology: &[PhaseRheology]) -> SphResult<Self> {
        if constants.len() != phase_count {
            return Err(SphError::PhaseCountMismatch {
                table: "phase constants",
                expected: phase_count,
                found: constants.len(),
            });
        }
        if rheology.len() != phase_count {
            return Err(SphError::PhaseCountMismatch {
                table: "phase rheology",
                expected: phase_count,
                found: rheology.len(),
            });
        }

        for (cte, rheo) in constants.iter().zip(rheology) {
            cte.validate()?;
            rheo.validate()?;
            if cte.phase_id != rheo.phase_id {
                return Err(crate::error::invalid_phase(
                    cte.phase(),
                    format!("rheology row holds phase {} instead", rheo.phase_id),
                ));
            }
        }

        let rows = row_index("phase constants", constants.iter().map(|c| c.phase()))?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(bytemuck::cast_slice(constants));
        hasher.update(bytemuck::cast_slice(rheology));

        Ok(Self {
            constants: constants.to_vec(),
            rheology: rheology.to_vec(),
            rows,
            fingerprint: hasher.finalize(),
        })
    }

    pub fn phase_count(&self) -> usize {
        self.constants.len()
    }

    pub fn row(&self, phase: u16) -> Option<usize> {
        self.rows.get(phase as usize).copied().flatten().map(|r| r as usize)
    }

    pub fn get(&self, phase: u16) -> Option<(&PhaseCte, &PhaseRheology)> {
        self.row(phase).map(|r| (&self.constants[r], &self.rheology[r]))
    }

    /// Constants of a phase already checked with [`PhaseTable::validate_codes`]
    #[inline]
    pub fn constants(&self, phase: u16) -> &PhaseCte {
        &self.constants[self.rows[phase as usize].unwrap_or(0) as usize]
    }

    #[inline]
    pub fn rheology(&self, phase: u16) -> &PhaseRheology {
        &self.rheology[self.rows[phase as usize].unwrap_or(0) as usize]
    }

    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    /// Reject any non-excluded slot whose phase is not in the table
    pub fn validate_codes(&self, codes: &[TypeCode]) -> SphResult<()> {
        for (slot, code) in codes.iter().enumerate() {
            if code.is_excluded() {
                continue;
            }
            if self.row(code.phase()).is_none() {
                return Err(SphError::UnknownPhase {
                    slot,
                    phase: code.phase(),
                });
            }
        }
        Ok(())
    }
}

/// Drucker-Prager constants for the plastic subset of phases
#[derive(Debug, Clone)]
pub struct PlasticityTable {
    entries: Vec<DruckerPragerCte>,
    rows: Vec<Option<u16>>,
    fingerprint: u32,
}

impl PlasticityTable {
    fn build(phase_count: usize, entries: &[DruckerPragerCte]) -> SphResult<Self> {
        if entries.len() != phase_count {
            return Err(SphError::PhaseCountMismatch {
                table: "drucker-prager",
                expected: phase_count,
                found: entries.len(),
            });
        }
        for entry in entries {
            entry.validate()?;
        }
        let rows = row_index("drucker-prager", entries.iter().map(|e| e.phase()))?;
        Ok(Self {
            entries: entries.to_vec(),
            rows,
            fingerprint: crc32fast::hash(bytemuck::cast_slice(entries)),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drucker-Prager entry of a phase, `None` when the phase is not plastic
    pub fn get(&self, phase: u16) -> Option<&DruckerPragerCte> {
        self.rows
            .get(phase as usize)
            .copied()
            .flatten()
            .map(|r| &self.entries[r as usize])
    }

    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }
}

fn row_index(table: &'static str, phases: impl Iterator<Item = u16>) -> SphResult<Vec<Option<u16>>> {
    let mut rows: Vec<Option<u16>> = Vec::new();
    for (row, phase) in phases.enumerate() {
        let idx = phase as usize;
        if idx >= rows.len() {
            rows.resize(idx + 1, None);
        }
        if rows[idx].is_some() {
            return Err(SphError::DuplicatePhase { table, phase });
        }
        rows[idx] = Some(row as u16);
    }
    Ok(rows)
}

lazy_static! {
    static ref PHASES: RwLock<Option<PhaseTable>> = RwLock::new(None);
    static ref PLASTICITY: RwLock<Option<PlasticityTable>> = RwLock::new(None);
}

/// Upload the base physical and rheology constants.
///
/// Both slices must hold exactly `phase_count` rows describing the same
/// phases in the same order. Uploading an identical table is a no-op.
pub fn upload_phase_constants(
    phase_count: usize,
    constants: &[PhaseCte],
    rheology: &[PhaseRheology],
) -> SphResult<UploadOutcome> {
    let table = PhaseTable::build(phase_count, constants, rheology)?;

    let mut slot = PHASES.write();
    if slot.as_ref().map(|t| t.fingerprint) == Some(table.fingerprint) {
        log::debug!("[phases] constants unchanged ({} phases)", phase_count);
        return Ok(UploadOutcome::Unchanged);
    }
    log::info!(
        "[phases] uploaded constants for {} phases (fingerprint {:08x})",
        phase_count,
        table.fingerprint
    );
    *slot = Some(table);
    Ok(UploadOutcome::Replaced)
}

/// Upload the Drucker-Prager constants of the plastic phases.
pub fn upload_plasticity_constants(
    phase_count: usize,
    entries: &[DruckerPragerCte],
) -> SphResult<UploadOutcome> {
    let table = PlasticityTable::build(phase_count, entries)?;

    let mut slot = PLASTICITY.write();
    if slot.as_ref().map(|t| t.fingerprint) == Some(table.fingerprint) {
        log::debug!("[phases] plasticity unchanged ({} phases)", phase_count);
        return Ok(UploadOutcome::Unchanged);
    }
    log::info!("[phases] uploaded Drucker-Prager constants for {} phases", phase_count);
    *slot = Some(table);
    Ok(UploadOutcome::Replaced)
}

/// Replace both tables as one update.
///
/// Both tables are validated before any lock is taken; on error neither
/// table changes. Waits for every in-flight kernel holding either table.
pub fn reload_phase_store(
    constants: &[PhaseCte],
    rheology: &[PhaseRheology],
    plasticity: &[DruckerPragerCte],
) -> SphResult<(UploadOutcome, UploadOutcome)> {
    let base = PhaseTable::build(constants.len(), constants, rheology)?;
    let plastic = PlasticityTable::build(plasticity.len(), plasticity)?;

    let mut phases = PHASES.write();
    let mut plastic_slot = PLASTICITY.write();
    let base_outcome = if phases.as_ref().map(|t| t.fingerprint) == Some(base.fingerprint) {
        UploadOutcome::Unchanged
    } else {
        *phases = Some(base);
        UploadOutcome::Replaced
    };
    let plastic_outcome = if plastic_slot.as_ref().map(|t| t.fingerprint) == Some(plastic.fingerprint) {
        UploadOutcome::Unchanged
    } else {
        *plastic_slot = Some(plastic);
        UploadOutcome::Replaced
    };

    if base_outcome == UploadOutcome::Unchanged && plastic_outcome == UploadOutcome::Unchanged {
        log::debug!("[phases] reload unchanged ({} phases)", constants.len());
    } else {
        log::info!(
            "[phases] reloaded {} phases, {} plastic (base {:?}, plasticity {:?})",
            constants.len(),
            plasticity.len(),
            base_outcome,
            plastic_outcome
        );
    }
    Ok((base_outcome, plastic_outcome))
}

/// Read access to the base table for the duration of a kernel
pub fn phase_table() -> SphResult<MappedRwLockReadGuard<'static, PhaseTable>> {
    RwLockReadGuard::try_map(PHASES.read(), |t| t.as_ref()).map_err(|_| SphError::PhaseTableNotUploaded)
}

/// Read access to the plasticity table, `None` until one is uploaded
pub fn plasticity_table() -> RwLockReadGuard<'static, Option<PlasticityTable>> {
    PLASTICITY.read()
}

/// Tear down both tables
pub fn clear_phase_store() {
    let mut phases = PHASES.write();
    let mut plasticity = PLASTICITY.write();
    *phases = None;
    *plasticity = None;
    log::debug!("[phases] store cleared");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::RheologyLaw;

    #[test]
    fn test_table_lookup_by_phase_id() {
        let constants = [
            PhaseCte::new(3, 1000.0, 0.1, 20.0, 7.0),
            PhaseCte::new(0, 1500.0, 0.15, 25.0, 7.0),
        ];
        let rheology = [
            PhaseRheology::newtonian(3, 1.0e-3),
            PhaseRheology::new(0, RheologyLaw::PowerLaw, 1.0, 0.6, 0.0, 0.0, 100.0),
        ];
        let table = PhaseTable::build(2, &constants, &rheology).unwrap();

        assert_eq!(table.phase_count(), 2);
        assert_eq!(table.row(3), Some(0));
        assert_eq!(table.row(0), Some(1));
        assert_eq!(table.row(1), None);
        assert_eq!(table.row(999), None);
        assert_eq!(table.constants(0).rho0, 1500.0);
        assert_eq!(table.rheology(3).law(), RheologyLaw::Newtonian);

        assert!(table.validate_codes(&[TypeCode::fluid(3), TypeCode::fixed(0)]).is_ok());
        match table.validate_codes(&[TypeCode::fluid(3), TypeCode::fluid(1)]) {
            Err(SphError::UnknownPhase { slot, phase }) => {
                assert_eq!(slot, 1);
                assert_eq!(phase, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // Excluded particles are not checked
        let out = TypeCode::fluid(9).with_special(TypeCode::OUT_IGNORE);
        assert!(table.validate_codes(&[out]).is_ok());
    }

    #[test]
    fn test_count_mismatch_and_duplicates() {
        let constants = [PhaseCte::new(0, 1000.0, 0.1, 20.0, 7.0)];
        let rheology = [PhaseRheology::newtonian(0, 1.0e-3)];
        assert!(matches!(
            PhaseTable::build(2, &constants, &rheology),
            Err(SphError::PhaseCountMismatch { .. })
        ));

        let constants = [
            PhaseCte::new(0, 1000.0, 0.1, 20.0, 7.0),
            PhaseCte::new(0, 1000.0, 0.1, 20.0, 7.0),
        ];
        let rheology = [PhaseRheology::newtonian(0, 1.0e-3), PhaseRheology::newtonian(0, 1.0e-3)];
        assert!(matches!(
            PhaseTable::build(2, &constants, &rheology),
            Err(SphError::DuplicatePhase { phase: 0, .. })
        ));
    }

    #[test]
    fn test_mismatched_parallel_rows() {
        let constants = [PhaseCte::new(0, 1000.0, 0.1, 20.0, 7.0)];
        let rheology = [PhaseRheology::newtonian(1, 1.0e-3)];
        assert!(matches!(
            PhaseTable::build(1, &constants, &rheology),
            Err(SphError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn test_rejected_reload_builds_nothing() {
        let constants = [PhaseCte::new(0, 1000.0, 0.1, 20.0, 7.0)];
        let rheology = [PhaseRheology::newtonian(0, 1.0e-3)];
        let entries = [
            DruckerPragerCte::new(0, 0.0, 0.6, 0.0, 1.0e6, 0.3),
            DruckerPragerCte::new(0, 0.0, 0.6, 0.0, 1.0e6, 0.3),
        ];
        assert!(matches!(
            reload_phase_store(&constants, &rheology, &entries),
            Err(SphError::DuplicatePhase { table: "drucker-prager", phase: 0 })
        ));
    }

    #[test]
    fn test_plasticity_subset() {
        let entries = [DruckerPragerCte::new(2, 0.0, 0.6, 0.0, 1.0e6, 0.3)];
        let table = PlasticityTable::build(1, &entries).unwrap();
        assert!(table.get(2).is_some());
        assert!(table.get(0).is_none());
        assert!(table.get(500).is_none());
        assert_eq!(table.fingerprint(), crc32fast::hash(bytemuck::cast_slice(&entries)));
    }
}
