use std::fmt;

/// An A32 core register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ArmReg {
    R0, R1, R2, R3, R4, R5, R6, R7, R8, R9, R10, R11, R12, Sp, Lr, Pc,
}

impl ArmReg {
    const ALL: [ArmReg; 16] = [
        ArmReg::R0, ArmReg::R1, ArmReg::R2, ArmReg::R3,
        ArmReg::R4, ArmReg::R5, ArmReg::R6, ArmReg::R7,
        ArmReg::R8, ArmReg::R9, ArmReg::R10, ArmReg::R11,
        ArmReg::R12, ArmReg::Sp, ArmReg::Lr, ArmReg::Pc,
    ];

    /// Register number as used in instruction fields.
    #[inline]
    pub const fn num(self) -> u32 {
        self as u32
    }

    /// Convert a 4-bit register field back to a register.
    pub fn from_num(n: u32) -> Self {
        Self::ALL[(n & 0xF) as usize]
    }

    /// Bit for this register in an LDM/STM register list.
    pub const fn mask(self) -> u16 {
        1 << self as u16
    }

    /// Clobbered across a call under the AAPCS.
    pub const fn is_caller_saved(self) -> bool {
        matches!(self, ArmReg::R0 | ArmReg::R1 | ArmReg::R2 | ArmReg::R3 | ArmReg::R12 | ArmReg::Lr)
    }
}

impl fmt::Display for ArmReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmReg::Sp => f.write_str("sp"),
            ArmReg::Lr => f.write_str("lr"),
            ArmReg::Pc => f.write_str("pc"),
            r => write!(f, "r{}", r.num()),
        }
    }
}

/// Holds the guest context pointer for the lifetime of generated code.
pub const CTX_REG: ArmReg = ArmReg::R10;
/// Scratch registers: never handed out by the register cache.
pub const SCRATCH1: ArmReg = ArmReg::R0;
pub const SCRATCH2: ArmReg = ArmReg::R1;
/// Holds the target address of host calls.
pub const CALL_REG: ArmReg = ArmReg::R12;

/// Allocation priority order. Callee-saved registers come first so host
/// calls rarely need to spill.
pub const ALLOCATION_ORDER: [ArmReg; 9] = [
    ArmReg::R4, ArmReg::R5, ArmReg::R6, ArmReg::R7, ArmReg::R8,
    ArmReg::R9, ArmReg::R11, ArmReg::R2, ArmReg::R3,
];

/// Registers the dispatcher prelude preserves for its caller.
pub const CALLEE_SAVED_LIST: u16 = ArmReg::R4.mask()
    | ArmReg::R5.mask()
    | ArmReg::R6.mask()
    | ArmReg::R7.mask()
    | ArmReg::R8.mask()
    | ArmReg::R9.mask()
    | ArmReg::R10.mask()
    | ArmReg::R11.mask();
