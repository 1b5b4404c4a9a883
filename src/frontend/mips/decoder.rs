use std::fmt;

use crate::frontend::mips::types::*;

/// A decoded guest instruction.
///
/// Every opcode category carries exactly the fields its handler needs.
/// Encodings without a fast path decode to [`MipsInst::Interpret`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipsInst {
    Nop,
    Alu3 { op: Alu3Op, rd: MipsReg, rs: MipsReg, rt: MipsReg },
    AluImm { op: AluImmOp, rt: MipsReg, rs: MipsReg, imm: u16 },
    Lui { rt: MipsReg, imm: u16 },
    Shift { op: ShiftOp, rd: MipsReg, rt: MipsReg, sa: u8 },
    ShiftVar { op: ShiftOp, rd: MipsReg, rt: MipsReg, rs: MipsReg },
    /// MOVZ (`on_zero`) / MOVN.
    CondMove { on_zero: bool, rd: MipsReg, rs: MipsReg, rt: MipsReg },
    Unary { op: UnaryOp, rd: MipsReg, src: MipsReg },
    Ext { rt: MipsReg, rs: MipsReg, pos: u8, size: u8 },
    Ins { rt: MipsReg, rs: MipsReg, pos: u8, size: u8 },
    MulDiv { op: MulDivOp, rs: MipsReg, rt: MipsReg },
    HiLo { op: HiLoOp, reg: MipsReg },
    Load { width: MemWidth, signed: bool, rt: MipsReg, base: MipsReg, offset: i16 },
    Store { width: MemWidth, rt: MipsReg, base: MipsReg, offset: i16 },
    Branch { cond: BranchCond, rs: MipsReg, rt: MipsReg, offset: i16, likely: bool, link: bool },
    /// J/JAL; `index` is the 26-bit word index.
    Jump { index: u32, link: bool },
    /// JR/JALR; `rd` is ZERO for JR.
    JumpReg { rs: MipsReg, rd: MipsReg },
    Syscall { code: u32 },
    Break { code: u32 },
    Interpret,
}

impl MipsInst {
    pub fn is_branch(&self) -> bool {
        matches!(self, Self::Branch { .. } | Self::Jump { .. } | Self::JumpReg { .. })
    }

    /// Whether executing this instruction may change `reg`.
    ///
    /// Instructions without a fast path are assumed to write anything.
    pub fn writes(&self, reg: MipsReg) -> bool {
        if reg.is_zero() {
            return false;
        }
        match *self {
            Self::Nop | Self::Store { .. } | Self::Syscall { .. } | Self::Break { .. } => false,
            Self::Alu3 { rd, .. }
            | Self::Shift { rd, .. }
            | Self::ShiftVar { rd, .. }
            | Self::CondMove { rd, .. }
            | Self::Unary { rd, .. } => rd == reg,
            Self::AluImm { rt, .. }
            | Self::Lui { rt, .. }
            | Self::Ext { rt, .. }
            | Self::Ins { rt, .. }
            | Self::Load { rt, .. } => rt == reg,
            Self::MulDiv { .. } => reg == MipsReg::HI || reg == MipsReg::LO,
            Self::HiLo { op, reg: r } => match op {
                HiLoOp::Mfhi | HiLoOp::Mflo => r == reg,
                HiLoOp::Mthi => reg == MipsReg::HI,
                HiLoOp::Mtlo => reg == MipsReg::LO,
            },
            Self::Branch { link, .. } | Self::Jump { link, .. } => link && reg == MipsReg::RA,
            Self::JumpReg { rd, .. } => rd == reg,
            Self::Interpret => true,
        }
    }
}

/// Coprocessor branches (BC1x, and the VFPU's BVF/BVT family on COP2).
///
/// These decode to [`MipsInst::Interpret`] but still have a delay slot, so
/// the translator must hand the slot to the interpreter along with them.
pub fn is_interpreted_branch(w: u32) -> bool {
    matches!(w >> 26, 0x11 | 0x12) && (w >> 21) & 0x1F == 0x08
}

#[inline]
fn rs(w: u32) -> MipsReg { MipsReg::from_field(w >> 21) }
#[inline]
fn rt(w: u32) -> MipsReg { MipsReg::from_field(w >> 16) }
#[inline]
fn rd(w: u32) -> MipsReg { MipsReg::from_field(w >> 11) }
#[inline]
fn sa(w: u32) -> u8 { ((w >> 6) & 0x1F) as u8 }
#[inline]
fn imm16(w: u32) -> u16 { (w & 0xFFFF) as u16 }

/// Decode a 32-bit guest instruction word.
pub fn decode(w: u32) -> MipsInst {
    let opcode = w >> 26;
    match opcode {
        0x00 => decode_special(w),
        0x01 => decode_regimm(w),
        0x02 | 0x03 => MipsInst::Jump { index: w & 0x03FF_FFFF, link: opcode == 0x03 },
        0x04 | 0x05 | 0x06 | 0x07 | 0x14 | 0x15 | 0x16 | 0x17 => {
            let cond = match opcode & 0x3 {
                0 => BranchCond::Eq,
                1 => BranchCond::Ne,
                2 => BranchCond::Lez,
                _ => BranchCond::Gtz,
            };
            let rt = if matches!(cond, BranchCond::Eq | BranchCond::Ne) { rt(w) } else { MipsReg::ZERO };
            MipsInst::Branch {
                cond,
                rs: rs(w),
                rt,
                offset: imm16(w) as i16,
                likely: opcode >= 0x14,
                link: false,
            }
        }
        0x08..=0x0E => {
            let op = match opcode {
                0x08 => AluImmOp::Addi,
                0x09 => AluImmOp::Addiu,
                0x0A => AluImmOp::Slti,
                0x0B => AluImmOp::Sltiu,
                0x0C => AluImmOp::Andi,
                0x0D => AluImmOp::Ori,
                _ => AluImmOp::Xori,
            };
            MipsInst::AluImm { op, rt: rt(w), rs: rs(w), imm: imm16(w) }
        }
        0x0F => MipsInst::Lui { rt: rt(w), imm: imm16(w) },
        0x1F => decode_special3(w),
        0x20 | 0x21 | 0x23 | 0x24 | 0x25 => {
            let (width, signed) = match opcode {
                0x20 => (MemWidth::Byte, true),
                0x21 => (MemWidth::Half, true),
                0x23 => (MemWidth::Word, false),
                0x24 => (MemWidth::Byte, false),
                _ => (MemWidth::Half, false),
            };
            MipsInst::Load { width, signed, rt: rt(w), base: rs(w), offset: imm16(w) as i16 }
        }
        0x28 | 0x29 | 0x2B => {
            let width = match opcode {
                0x28 => MemWidth::Byte,
                0x29 => MemWidth::Half,
                _ => MemWidth::Word,
            };
            MipsInst::Store { width, rt: rt(w), base: rs(w), offset: imm16(w) as i16 }
        }
        _ => MipsInst::Interpret,
    }
}

fn decode_special(w: u32) -> MipsInst {
    let funct = w & 0x3F;
    let alu3 = |op| MipsInst::Alu3 { op, rd: rd(w), rs: rs(w), rt: rt(w) };
    let muldiv = |op| MipsInst::MulDiv { op, rs: rs(w), rt: rt(w) };
    match funct {
        0x00 if w == 0 => MipsInst::Nop,
        0x00 => MipsInst::Shift { op: ShiftOp::Sll, rd: rd(w), rt: rt(w), sa: sa(w) },
        0x02 => {
            let op = match (w >> 21) & 0x1F {
                0 => ShiftOp::Srl,
                1 => ShiftOp::Rotr,
                _ => return MipsInst::Interpret,
            };
            MipsInst::Shift { op, rd: rd(w), rt: rt(w), sa: sa(w) }
        }
        0x03 => MipsInst::Shift { op: ShiftOp::Sra, rd: rd(w), rt: rt(w), sa: sa(w) },
        0x04 => MipsInst::ShiftVar { op: ShiftOp::Sll, rd: rd(w), rt: rt(w), rs: rs(w) },
        0x06 => {
            let op = match sa(w) {
                0 => ShiftOp::Srl,
                1 => ShiftOp::Rotr,
                _ => return MipsInst::Interpret,
            };
            MipsInst::ShiftVar { op, rd: rd(w), rt: rt(w), rs: rs(w) }
        }
        0x07 => MipsInst::ShiftVar { op: ShiftOp::Sra, rd: rd(w), rt: rt(w), rs: rs(w) },
        0x08 => MipsInst::JumpReg { rs: rs(w), rd: MipsReg::ZERO },
        0x09 => MipsInst::JumpReg { rs: rs(w), rd: rd(w) },
        0x0A => MipsInst::CondMove { on_zero: true, rd: rd(w), rs: rs(w), rt: rt(w) },
        0x0B => MipsInst::CondMove { on_zero: false, rd: rd(w), rs: rs(w), rt: rt(w) },
        0x0C => MipsInst::Syscall { code: (w >> 6) & 0x000F_FFFF },
        0x0D => MipsInst::Break { code: (w >> 6) & 0x000F_FFFF },
        0x0F => MipsInst::Nop,
        0x10 => MipsInst::HiLo { op: HiLoOp::Mfhi, reg: rd(w) },
        0x11 => MipsInst::HiLo { op: HiLoOp::Mthi, reg: rs(w) },
        0x12 => MipsInst::HiLo { op: HiLoOp::Mflo, reg: rd(w) },
        0x13 => MipsInst::HiLo { op: HiLoOp::Mtlo, reg: rs(w) },
        0x16 => MipsInst::Unary { op: UnaryOp::Clz, rd: rd(w), src: rs(w) },
        0x17 => MipsInst::Unary { op: UnaryOp::Clo, rd: rd(w), src: rs(w) },
        0x18 => muldiv(MulDivOp::Mult),
        0x19 => muldiv(MulDivOp::Multu),
        0x1A => muldiv(MulDivOp::Div),
        0x1B => muldiv(MulDivOp::Divu),
        0x1C => muldiv(MulDivOp::Madd),
        0x1D => muldiv(MulDivOp::Maddu),
        0x2E => muldiv(MulDivOp::Msub),
        0x2F => muldiv(MulDivOp::Msubu),
        0x20 => alu3(Alu3Op::Add),
        0x21 => alu3(Alu3Op::Addu),
        0x22 => alu3(Alu3Op::Sub),
        0x23 => alu3(Alu3Op::Subu),
        0x24 => alu3(Alu3Op::And),
        0x25 => alu3(Alu3Op::Or),
        0x26 => alu3(Alu3Op::Xor),
        0x27 => alu3(Alu3Op::Nor),
        0x2A => alu3(Alu3Op::Slt),
        0x2B => alu3(Alu3Op::Sltu),
        0x2C => alu3(Alu3Op::Max),
        0x2D => alu3(Alu3Op::Min),
        _ => MipsInst::Interpret,
    }
}

fn decode_regimm(w: u32) -> MipsInst {
    let sel = (w >> 16) & 0x1F;
    let cond = match sel & 0x1 {
        0 => BranchCond::Ltz,
        _ => BranchCond::Gez,
    };
    match sel {
        0x00 | 0x01 | 0x02 | 0x03 | 0x10 | 0x11 | 0x12 | 0x13 => MipsInst::Branch {
            cond,
            rs: rs(w),
            rt: MipsReg::ZERO,
            offset: imm16(w) as i16,
            likely: sel & 0x2 != 0,
            link: sel & 0x10 != 0,
        },
        _ => MipsInst::Interpret,
    }
}

fn decode_special3(w: u32) -> MipsInst {
    let msb = ((w >> 11) & 0x1F) as u8;
    let lsb = sa(w);
    match w & 0x3F {
        0x00 => MipsInst::Ext { rt: rt(w), rs: rs(w), pos: lsb, size: msb + 1 },
        0x04 if msb >= lsb => MipsInst::Ins { rt: rt(w), rs: rs(w), pos: lsb, size: msb - lsb + 1 },
        0x20 => {
            let op = match lsb {
                0x02 => UnaryOp::Wsbh,
                0x03 => UnaryOp::Wsbw,
                0x10 => UnaryOp::Seb,
                0x14 => UnaryOp::Bitrev,
                0x18 => UnaryOp::Seh,
                _ => return MipsInst::Interpret,
            };
            MipsInst::Unary { op, rd: rd(w), src: rt(w) }
        }
        _ => MipsInst::Interpret,
    }
}

impl fmt::Display for MipsInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Nop => f.write_str("nop"),
            Self::Alu3 { op, rd, rs, rt } => write!(f, "{op:?} {rd}, {rs}, {rt}"),
            Self::AluImm { op, rt, rs, imm } => write!(f, "{op:?} {rt}, {rs}, {imm:#x}"),
            Self::Lui { rt, imm } => write!(f, "lui {rt}, {imm:#x}"),
            Self::Shift { op, rd, rt, sa } => write!(f, "{op:?} {rd}, {rt}, {sa}"),
            Self::ShiftVar { op, rd, rt, rs } => write!(f, "{op:?}v {rd}, {rt}, {rs}"),
            Self::CondMove { on_zero, rd, rs, rt } => {
                write!(f, "{} {rd}, {rs}, {rt}", if on_zero { "movz" } else { "movn" })
            }
            Self::Unary { op, rd, src } => write!(f, "{op:?} {rd}, {src}"),
            Self::Ext { rt, rs, pos, size } => write!(f, "ext {rt}, {rs}, {pos}, {size}"),
            Self::Ins { rt, rs, pos, size } => write!(f, "ins {rt}, {rs}, {pos}, {size}"),
            Self::MulDiv { op, rs, rt } => write!(f, "{op:?} {rs}, {rt}"),
            Self::HiLo { op, reg } => write!(f, "{op:?} {reg}"),
            Self::Load { width, signed, rt, base, offset } => {
                write!(f, "load.{width:?}{} {rt}, {offset}({base})", if signed { "s" } else { "" })
            }
            Self::Store { width, rt, base, offset } => write!(f, "store.{width:?} {rt}, {offset}({base})"),
            Self::Branch { cond, rs, rt, offset, likely, link } => write!(
                f,
                "b{cond:?}{}{} {rs}, {rt}, {offset}",
                if link { "al" } else { "" },
                if likely { "l" } else { "" }
            ),
            Self::Jump { index, link } => write!(f, "{} {:#x}", if link { "jal" } else { "j" }, index << 2),
            Self::JumpReg { rs, rd } => write!(f, "jalr {rd}, {rs}"),
            Self::Syscall { code } => write!(f, "syscall {code:#x}"),
            Self::Break { code } => write!(f, "break {code:#x}"),
            Self::Interpret => f.write_str("<interpret>"),
        }
    }
}
