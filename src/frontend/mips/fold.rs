//! Compile-time evaluation of guest operations on known register values.

use crate::frontend::mips::types::*;

/// Results of DIV/DIVU with a zero divisor.
///
/// The hardware leaves the dividend in HI and a sign-dependent saturated
/// quotient in LO. Compiled code and folded constants both produce exactly
/// these values.
pub mod div_by_zero {
    /// LO for DIV when the dividend is non-negative.
    pub const SIGNED_QUOTIENT_NON_NEGATIVE: u32 = 0xFFFF_FFFF;
    /// LO for DIV when the dividend is negative.
    pub const SIGNED_QUOTIENT_NEGATIVE: u32 = 1;
    /// LO for DIVU.
    pub const UNSIGNED_QUOTIENT: u32 = 0xFFFF_FFFF;
}

pub fn alu3(op: Alu3Op, a: u32, b: u32) -> u32 {
    match op {
        Alu3Op::Add | Alu3Op::Addu => a.wrapping_add(b),
        Alu3Op::Sub | Alu3Op::Subu => a.wrapping_sub(b),
        Alu3Op::And => a & b,
        Alu3Op::Or => a | b,
        Alu3Op::Xor => a ^ b,
        Alu3Op::Nor => !(a | b),
        Alu3Op::Slt => ((a as i32) < (b as i32)) as u32,
        Alu3Op::Sltu => (a < b) as u32,
        Alu3Op::Max => (a as i32).max(b as i32) as u32,
        Alu3Op::Min => (a as i32).min(b as i32) as u32,
    }
}

/// The operand an immediate-form instruction actually uses.
pub fn extend_imm(op: AluImmOp, imm: u16) -> u32 {
    if op.sign_extends() {
        imm as i16 as i32 as u32
    } else {
        imm as u32
    }
}

pub fn alu_imm(op: AluImmOp, a: u32, imm: u16) -> u32 {
    let b = extend_imm(op, imm);
    match op {
        AluImmOp::Addi | AluImmOp::Addiu => a.wrapping_add(b),
        AluImmOp::Slti => ((a as i32) < (b as i32)) as u32,
        AluImmOp::Sltiu => (a < b) as u32,
        AluImmOp::Andi => a & b,
        AluImmOp::Ori => a | b,
        AluImmOp::Xori => a ^ b,
    }
}

/// Shift by the low five bits of `amount`.
pub fn shift(op: ShiftOp, v: u32, amount: u32) -> u32 {
    let n = amount & 0x1F;
    match op {
        ShiftOp::Sll => v << n,
        ShiftOp::Srl => v >> n,
        ShiftOp::Sra => ((v as i32) >> n) as u32,
        ShiftOp::Rotr => v.rotate_right(n),
    }
}

/// Leading zero count, scanning from bit 31 down.
pub fn count_leading_zeros(v: u32) -> u32 {
    let mut count = 0;
    for bit in (0..32).rev() {
        if v & (1 << bit) != 0 {
            break;
        }
        count += 1;
    }
    count
}

pub fn count_leading_ones(v: u32) -> u32 {
    count_leading_zeros(!v)
}

pub fn unary(op: UnaryOp, v: u32) -> u32 {
    match op {
        UnaryOp::Clz => count_leading_zeros(v),
        UnaryOp::Clo => count_leading_ones(v),
        UnaryOp::Seb => v as u8 as i8 as i32 as u32,
        UnaryOp::Seh => v as u16 as i16 as i32 as u32,
        UnaryOp::Wsbh => ((v & 0x00FF_00FF) << 8) | ((v >> 8) & 0x00FF_00FF),
        UnaryOp::Wsbw => v.swap_bytes(),
        UnaryOp::Bitrev => v.reverse_bits(),
    }
}

fn field_mask(size: u32) -> u32 {
    if size >= 32 { u32::MAX } else { (1u32 << size) - 1 }
}

pub fn ext(v: u32, pos: u32, size: u32) -> u32 {
    (v >> pos) & field_mask(size)
}

pub fn ins(old: u32, v: u32, pos: u32, size: u32) -> u32 {
    let mask = field_mask(size) << pos;
    (old & !mask) | ((v << pos) & mask)
}

/// Evaluate a HI/LO operation. Returns the new `(hi, lo)`.
pub fn mul_div(op: MulDivOp, a: u32, b: u32, hi: u32, lo: u32) -> (u32, u32) {
    let acc = ((hi as u64) << 32) | lo as u64;
    let signed_product = || (a as i32 as i64).wrapping_mul(b as i32 as i64) as u64;
    let unsigned_product = || (a as u64) * (b as u64);
    let split = |v: u64| ((v >> 32) as u32, v as u32);
    match op {
        MulDivOp::Mult => split(signed_product()),
        MulDivOp::Multu => split(unsigned_product()),
        MulDivOp::Madd => split(acc.wrapping_add(signed_product())),
        MulDivOp::Maddu => split(acc.wrapping_add(unsigned_product())),
        MulDivOp::Msub => split(acc.wrapping_sub(signed_product())),
        MulDivOp::Msubu => split(acc.wrapping_sub(unsigned_product())),
        MulDivOp::Div => {
            if b == 0 {
                let quotient = if (a as i32) < 0 {
                    div_by_zero::SIGNED_QUOTIENT_NEGATIVE
                } else {
                    div_by_zero::SIGNED_QUOTIENT_NON_NEGATIVE
                };
                (a, quotient)
            } else {
                let (x, y) = (a as i32, b as i32);
                (x.wrapping_rem(y) as u32, x.wrapping_div(y) as u32)
            }
        }
        MulDivOp::Divu => {
            if b == 0 {
                (a, div_by_zero::UNSIGNED_QUOTIENT)
            } else {
                (a % b, a / b)
            }
        }
    }
}

pub fn branch_taken(cond: BranchCond, a: u32, b: u32) -> bool {
    let s = a as i32;
    match cond {
        BranchCond::Eq => a == b,
        BranchCond::Ne => a != b,
        BranchCond::Lez => s <= 0,
        BranchCond::Gtz => s > 0,
        BranchCond::Ltz => s < 0,
        BranchCond::Gez => s >= 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_leading_bit_scan() {
        assert_eq!(count_leading_zeros(0), 32);
        assert_eq!(count_leading_zeros(1), 31);
        assert_eq!(count_leading_zeros(0x8000_0000), 0);
        assert_eq!(count_leading_ones(0xFFFF_FFFF), 32);
        assert_eq!(count_leading_ones(0xF0F0_0000), 4);
        for v in [0u32, 1, 0x1234, 0x00FF_0000, u32::MAX] {
            assert_eq!(count_leading_zeros(v), v.leading_zeros());
        }
    }

    #[test]
    fn test_divide_by_zero_results() {
        assert_eq!(mul_div(MulDivOp::Div, 7, 0, 0, 0), (7, 0xFFFF_FFFF));
        assert_eq!(mul_div(MulDivOp::Div, (-7i32) as u32, 0, 0, 0), ((-7i32) as u32, 1));
        assert_eq!(mul_div(MulDivOp::Divu, 0x8000_0000, 0, 0, 0), (0x8000_0000, 0xFFFF_FFFF));
    }

    #[test]
    fn test_divide_overflow() {
        assert_eq!(
            mul_div(MulDivOp::Div, 0x8000_0000, u32::MAX, 0, 0),
            (0, 0x8000_0000)
        );
        assert_eq!(mul_div(MulDivOp::Div, (-7i32) as u32, 2, 0, 0), ((-1i32) as u32, (-3i32) as u32));
    }

    #[test]
    fn test_multiply_accumulate() {
        assert_eq!(mul_div(MulDivOp::Mult, u32::MAX, 2, 0, 0), (u32::MAX, (-2i32) as u32));
        assert_eq!(mul_div(MulDivOp::Multu, u32::MAX, 2, 0, 0), (1, 0xFFFF_FFFE));
        assert_eq!(mul_div(MulDivOp::Madd, 3, 4, 0, u32::MAX), (1, 11));
        assert_eq!(mul_div(MulDivOp::Msubu, 1, 1, 0, 0), (u32::MAX, u32::MAX));
    }

    #[test]
    fn test_bitfields() {
        assert_eq!(ext(0x1234_5678, 4, 8), 0x67);
        assert_eq!(ext(0xFFFF_FFFF, 0, 32), 0xFFFF_FFFF);
        assert_eq!(ins(0xFFFF_FFFF, 0, 8, 8), 0xFFFF_00FF);
        assert_eq!(ins(0, 0x1FF, 0, 8), 0xFF);
    }

    #[test]
    fn test_unary_ops() {
        assert_eq!(unary(UnaryOp::Seb, 0x80), 0xFFFF_FF80);
        assert_eq!(unary(UnaryOp::Seh, 0x7FFF), 0x7FFF);
        assert_eq!(unary(UnaryOp::Wsbh, 0x1122_3344), 0x2211_4433);
        assert_eq!(unary(UnaryOp::Wsbw, 0x1122_3344), 0x4433_2211);
        assert_eq!(unary(UnaryOp::Bitrev, 1), 0x8000_0000);
    }
}
