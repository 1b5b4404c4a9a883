use std::fmt;

/// Number of guest register slots tracked by the register cache:
/// 32 general-purpose registers plus HI and LO.
pub const NUM_GUEST_REGS: usize = 34;

/// A guest register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MipsReg(u8);

impl MipsReg {
    pub const ZERO: Self = Self(0);
    pub const AT: Self = Self(1);
    pub const V0: Self = Self(2);
    pub const V1: Self = Self(3);
    pub const A0: Self = Self(4);
    pub const A1: Self = Self(5);
    pub const A2: Self = Self(6);
    pub const A3: Self = Self(7);
    pub const T0: Self = Self(8);
    pub const T1: Self = Self(9);
    pub const T2: Self = Self(10);
    pub const T3: Self = Self(11);
    pub const S0: Self = Self(16);
    pub const S1: Self = Self(17);
    pub const T9: Self = Self(25);
    pub const GP: Self = Self(28);
    pub const SP: Self = Self(29);
    pub const FP: Self = Self(30);
    pub const RA: Self = Self(31);
    pub const HI: Self = Self(32);
    pub const LO: Self = Self(33);

    /// General-purpose register `n` (0..=31).
    pub const fn gpr(n: u32) -> Self {
        assert!(n < 32);
        Self(n as u8)
    }

    pub(crate) const fn from_field(bits: u32) -> Self {
        Self((bits & 0x1F) as u8)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Iterate over every register slot, GPRs first.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..NUM_GUEST_REGS as u8).map(Self)
    }
}

const GPR_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3",
    "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7",
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7",
    "t8", "t9", "k0", "k1", "gp", "sp", "fp", "ra",
];

impl fmt::Display for MipsReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            32 => f.write_str("hi"),
            33 => f.write_str("lo"),
            n => f.write_str(GPR_NAMES[n as usize]),
        }
    }
}

/// Three-register ALU operations (`rd = rs OP rt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alu3Op {
    Add, Addu, Sub, Subu, And, Or, Xor, Nor, Slt, Sltu, Max, Min,
}

/// Register-immediate ALU operations (`rt = rs OP imm16`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluImmOp {
    Addi, Addiu, Slti, Sltiu, Andi, Ori, Xori,
}

impl AluImmOp {
    /// Whether the 16-bit immediate is sign-extended.
    pub fn sign_extends(self) -> bool {
        matches!(self, Self::Addi | Self::Addiu | Self::Slti | Self::Sltiu)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Sll, Srl, Sra, Rotr,
}

/// Single-source bit manipulation (`rd = f(src)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Clz, Clo, Seb, Seh, Wsbh, Wsbw, Bitrev,
}

/// Operations writing the HI/LO pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MulDivOp {
    Mult, Multu, Madd, Maddu, Msub, Msubu, Div, Divu,
}

impl MulDivOp {
    pub fn is_signed(self) -> bool {
        matches!(self, Self::Mult | Self::Madd | Self::Msub | Self::Div)
    }

    pub fn is_divide(self) -> bool {
        matches!(self, Self::Div | Self::Divu)
    }

    /// MADD/MSUB style operations that read HI/LO.
    pub fn accumulates(self) -> bool {
        matches!(self, Self::Madd | Self::Maddu | Self::Msub | Self::Msubu)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HiLoOp {
    Mfhi, Mflo, Mthi, Mtlo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemWidth {
    Byte, Half, Word,
}

impl MemWidth {
    pub fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
        }
    }
}

/// Guest branch conditions. `Eq`/`Ne` compare `rs` with `rt`; the rest
/// compare `rs` with zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCond {
    Eq, Ne, Lez, Gtz, Ltz, Gez,
}
