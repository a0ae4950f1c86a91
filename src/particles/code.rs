/// Packed particle code.
///
/// Layout (16 bits):
/// - Bits 0-10: value, the phase id of the particle
/// - Bits 11-12: particle type (fixed, moving, floating, fluid)
/// - Bits 13-15: special state (normal, periodic ghost, excluded variants)
///
/// The type and value never change after case setup, the special bits are
/// flipped by the periodic duplicator and by the external driver when a
/// particle leaves the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub struct TypeCode(pub u16);

/// Particle type stored in bits 11-12
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleKind {
    Fixed,
    Moving,
    Floating,
    Fluid,
}

impl TypeCode {
    pub const MASK_VALUE: u16 = 0x07ff;
    pub const MASK_TYPE: u16 = 0x1800;
    pub const MASK_SPECIAL: u16 = 0xe000;

    pub const TYPE_FIXED: u16 = 0x0000;
    pub const TYPE_MOVING: u16 = 0x0800;
    pub const TYPE_FLOATING: u16 = 0x1000;
    pub const TYPE_FLUID: u16 = 0x1800;

    pub const NORMAL: u16 = 0x0000;
    pub const PERIODIC: u16 = 0x2000;
    pub const OUT_IGNORE: u16 = 0x4000;
    pub const OUT_MOVE: u16 = 0x6000;
    pub const OUT_POS: u16 = 0x8000;
    pub const OUT_RHO: u16 = 0xa000;

    /// Largest phase id that fits in the value bits
    pub const MAX_PHASE: u16 = Self::MASK_VALUE;

    /// Code of a reserved ghost slot the duplicator has not written yet
    pub const UNUSED: TypeCode = TypeCode(Self::OUT_IGNORE);

    pub fn new(kind: ParticleKind, phase: u16) -> Self {
        debug_assert!(phase <= Self::MAX_PHASE, "phase id {} out of range", phase);
        let kind_bits = match kind {
            ParticleKind::Fixed => Self::TYPE_FIXED,
            ParticleKind::Moving => Self::TYPE_MOVING,
            ParticleKind::Floating => Self::TYPE_FLOATING,
            ParticleKind::Fluid => Self::TYPE_FLUID,
        };
        Self(kind_bits | (phase & Self::MASK_VALUE))
    }

    pub fn fluid(phase: u16) -> Self {
        Self::new(ParticleKind::Fluid, phase)
    }

    pub fn fixed(phase: u16) -> Self {
        Self::new(ParticleKind::Fixed, phase)
    }

    pub fn moving(phase: u16) -> Self {
        Self::new(ParticleKind::Moving, phase)
    }

    pub fn kind(self) -> ParticleKind {
        match self.0 & Self::MASK_TYPE {
            Self::TYPE_FIXED => ParticleKind::Fixed,
            Self::TYPE_MOVING => ParticleKind::Moving,
            Self::TYPE_FLOATING => ParticleKind::Floating,
            _ => ParticleKind::Fluid,
        }
    }

    /// Phase id embedded in the value bits
    pub fn phase(self) -> u16 {
        self.0 & Self::MASK_VALUE
    }

    pub fn is_fluid(self) -> bool {
        (self.0 & Self::MASK_TYPE) == Self::TYPE_FLUID
    }

    /// Fixed, moving and floating particles all act as boundaries
    pub fn is_bound(self) -> bool {
        !self.is_fluid()
    }

    pub fn special(self) -> u16 {
        self.0 & Self::MASK_SPECIAL
    }

    pub fn is_normal(self) -> bool {
        self.special() == Self::NORMAL
    }

    pub fn is_periodic(self) -> bool {
        self.special() == Self::PERIODIC
    }

    /// Excluded particles take no part in any interaction
    pub fn is_excluded(self) -> bool {
        self.special() >= Self::OUT_IGNORE
    }

    /// Returns the same code flagged as a periodic ghost
    pub fn with_periodic(self) -> Self {
        Self((self.0 & !Self::MASK_SPECIAL) | Self::PERIODIC)
    }

    pub fn with_special(self, special: u16) -> Self {
        Self((self.0 & !Self::MASK_SPECIAL) | (special & Self::MASK_SPECIAL))
    }
}
