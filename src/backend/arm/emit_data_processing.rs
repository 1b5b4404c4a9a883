//! Integer data processing: ALU, shifts, compares, bit manipulation and
//! the HI/LO multiply/divide unit.

use crate::backend::arm::emitter::{Cond, DpOp, ShiftType, ShifterOperand};
use crate::backend::arm::hostloc::{ArmReg, SCRATCH1, SCRATCH2};
use crate::backend::arm::operand::Operand2;
use crate::backend::arm::ArmBackend;
use crate::backend::{AluOp, MapFlags, Operand};
use crate::error::CompileError;
use crate::frontend::mips::fold::div_by_zero;
use crate::frontend::mips::types::{MemWidth, MipsReg, MulDivOp, ShiftOp};

fn alu_opcode(op: AluOp) -> DpOp {
    match op {
        AluOp::Add => DpOp::Add,
        AluOp::Sub => DpOp::Sub,
        AluOp::And => DpOp::And,
        AluOp::Or | AluOp::Nor => DpOp::Orr,
        AluOp::Xor => DpOp::Eor,
    }
}

fn shift_type(op: ShiftOp) -> ShiftType {
    match op {
        ShiftOp::Sll => ShiftType::Lsl,
        ShiftOp::Srl => ShiftType::Lsr,
        ShiftOp::Sra => ShiftType::Asr,
        ShiftOp::Rotr => ShiftType::Ror,
    }
}

impl ArmBackend {
    /// Replace a register operand by its value when the cache knows it.
    fn resolve_operand(&self, operand: Operand) -> Operand {
        match operand {
            Operand::Reg(r) => self.regs.known(r).map_or(operand, Operand::Imm),
            imm => imm,
        }
    }

    fn map_binary(&mut self, dst: MipsReg, src: MipsReg) -> Result<(ArmReg, ArmReg), CompileError> {
        self.regs.map_binary(&mut self.code.emitter, dst, src)
    }

    fn map_ternary(&mut self, dst: MipsReg, a: MipsReg, b: MipsReg) -> Result<(ArmReg, ArmReg, ArmReg), CompileError> {
        self.regs.map_ternary(&mut self.code.emitter, dst, a, b)
    }

    // ---- ALU ----

    pub(super) fn emit_alu(&mut self, op: AluOp, dst: MipsReg, lhs: MipsReg, rhs: Operand) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let opcode = alu_opcode(op);
        let d = match self.resolve_operand(rhs) {
            Operand::Imm(value) => {
                let (d, s) = self.map_binary(dst, lhs)?;
                self.code.emitter.alu_imm(opcode, d, s, value, SCRATCH1);
                d
            }
            Operand::Reg(r) => {
                let (d, a, b) = self.map_ternary(dst, lhs, r)?;
                self.code.emitter.dp(Cond::Al, opcode, false, d, a, b.into());
                d
            }
        };
        if op == AluOp::Nor {
            self.code.emitter.mvn(d, d);
        }
        Ok(())
    }

    pub(super) fn emit_sub_from_imm(&mut self, dst: MipsReg, lhs: u32, rhs: MipsReg) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let (d, s) = self.map_binary(dst, rhs)?;
        let e = &mut self.code.emitter;
        match Operand2::encode(lhs) {
            Some(imm) => e.rsb(d, s, imm),
            None => {
                e.materialize(SCRATCH1, lhs);
                e.rsb(d, s, SCRATCH1);
            }
        }
        Ok(())
    }

    pub(super) fn emit_mov(&mut self, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        if dst.is_zero() || dst == src {
            return Ok(());
        }
        if let Some(value) = self.regs.known(src) {
            self.regs.set_imm(dst, value);
            return Ok(());
        }
        let (d, s) = self.map_binary(dst, src)?;
        self.code.emitter.mov(d, s);
        Ok(())
    }

    pub(super) fn emit_shift(&mut self, op: ShiftOp, dst: MipsReg, src: MipsReg, amount: Operand) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let ty = shift_type(op);
        match self.resolve_operand(amount) {
            Operand::Imm(n) => {
                let n = n & 0x1F;
                let (d, s) = self.map_binary(dst, src)?;
                if n != 0 {
                    self.code.emitter.mov(d, ShifterOperand::shifted(s, ty, n));
                } else if d != s {
                    self.code.emitter.mov(d, s);
                }
            }
            Operand::Reg(r) => {
                let (d, s, a) = self.map_ternary(dst, src, r)?;
                let e = &mut self.code.emitter;
                e.and(SCRATCH1, a, Operand2::byte(0x1F));
                e.mov(d, ShifterOperand::ShiftReg(s, ty, SCRATCH1));
            }
        }
        Ok(())
    }

    // ---- Comparisons and selects ----

    pub(super) fn emit_set_less_than(&mut self, signed: bool, dst: MipsReg, lhs: Operand, rhs: Operand) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let (less, greater) = if signed { (Cond::Lt, Cond::Gt) } else { (Cond::Cc, Cond::Hi) };
        let (d, taken) = match (self.resolve_operand(lhs), self.resolve_operand(rhs)) {
            (Operand::Imm(a), Operand::Imm(b)) => {
                let result = if signed { (a as i32) < (b as i32) } else { a < b };
                self.regs.set_imm(dst, result as u32);
                return Ok(());
            }
            (Operand::Reg(a), Operand::Imm(b)) => {
                let (d, ra) = self.map_binary(dst, a)?;
                self.code.emitter.cmp_imm(ra, b, SCRATCH1);
                (d, less)
            }
            (Operand::Imm(a), Operand::Reg(b)) => {
                // a < b  <=>  b > a
                let (d, rb) = self.map_binary(dst, b)?;
                self.code.emitter.cmp_imm(rb, a, SCRATCH1);
                (d, greater)
            }
            (Operand::Reg(a), Operand::Reg(b)) => {
                let (d, ra, rb) = self.map_ternary(dst, a, b)?;
                self.code.emitter.cmp(ra, rb);
                (d, less)
            }
        };
        let e = &mut self.code.emitter;
        e.mov(d, Operand2::byte(0));
        e.mov_cond(taken, d, Operand2::byte(1));
        Ok(())
    }

    pub(super) fn emit_cond_move(&mut self, on_zero: bool, dst: MipsReg, src: MipsReg, test: MipsReg) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let s = self.regs.map_pinned(&mut self.code.emitter, src, MapFlags::LOAD)?;
        let t = self.regs.map_pinned(&mut self.code.emitter, test, MapFlags::LOAD)?;
        let d = self.regs.map_pinned(&mut self.code.emitter, dst, MapFlags::LOAD | MapFlags::DIRTY)?;
        self.regs.unpin_all();
        let e = &mut self.code.emitter;
        e.cmp_imm(t, 0, SCRATCH1);
        e.mov_cond(if on_zero { Cond::Eq } else { Cond::Ne }, d, s);
        Ok(())
    }

    pub(super) fn emit_min_max(&mut self, max: bool, dst: MipsReg, lhs: MipsReg, rhs: MipsReg) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let (d, a, b) = self.map_ternary(dst, lhs, rhs)?;
        let e = &mut self.code.emitter;
        e.cmp(a, b);
        if dst == rhs && dst != lhs {
            // d holds b; take a when it wins.
            e.mov_cond(if max { Cond::Gt } else { Cond::Lt }, d, a);
        } else {
            if d != a {
                e.mov(d, a);
            }
            e.mov_cond(if max { Cond::Lt } else { Cond::Gt }, d, b);
        }
        Ok(())
    }

    // ---- Bit manipulation ----

    pub(super) fn emit_count_leading(&mut self, ones: bool, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let (d, s) = self.map_binary(dst, src)?;
        let e = &mut self.code.emitter;
        if ones {
            e.mvn(SCRATCH1, s);
            e.clz(d, SCRATCH1);
        } else {
            e.clz(d, s);
        }
        Ok(())
    }

    pub(super) fn emit_sign_extend(&mut self, width: MemWidth, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let (d, s) = self.map_binary(dst, src)?;
        let e = &mut self.code.emitter;
        match width {
            MemWidth::Byte => e.sxtb(d, s),
            MemWidth::Half => e.sxth(d, s),
            MemWidth::Word if d != s => e.mov(d, s),
            MemWidth::Word => {}
        }
        Ok(())
    }

    pub(super) fn emit_byte_swap(&mut self, halves: bool, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let (d, s) = self.map_binary(dst, src)?;
        if halves {
            self.code.emitter.rev16(d, s);
        } else {
            self.code.emitter.rev(d, s);
        }
        Ok(())
    }

    pub(super) fn emit_bit_reverse(&mut self, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        let (d, s) = self.map_binary(dst, src)?;
        self.code.emitter.rbit(d, s);
        Ok(())
    }

    pub(super) fn emit_extract(&mut self, dst: MipsReg, src: MipsReg, pos: u32, size: u32) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        debug_assert!(size >= 1 && pos + size <= 32);
        let (d, s) = self.map_binary(dst, src)?;
        self.code.emitter.ubfx(d, s, pos, size);
        Ok(())
    }

    pub(super) fn emit_insert(&mut self, dst: MipsReg, src: MipsReg, pos: u32, size: u32) -> Result<(), CompileError> {
        if dst.is_zero() {
            return Ok(());
        }
        debug_assert!(size >= 1 && pos + size <= 32);
        let s = self.regs.map_pinned(&mut self.code.emitter, src, MapFlags::LOAD)?;
        let d = self.regs.map_pinned(&mut self.code.emitter, dst, MapFlags::LOAD | MapFlags::DIRTY)?;
        self.regs.unpin_all();
        self.code.emitter.bfi(d, s, pos, size);
        Ok(())
    }

    // ---- HI/LO ----

    /// Map `rs`, `rt`, HI and LO, pinned together. Returns `(hi, lo, a, b)`.
    fn map_hilo(&mut self, rs: MipsReg, rt: MipsReg, accumulate: bool) -> Result<[ArmReg; 4], CompileError> {
        let e = &mut self.code.emitter;
        let a = self.regs.map_pinned(e, rs, MapFlags::LOAD)?;
        let b = self.regs.map_pinned(e, rt, MapFlags::LOAD)?;
        let flags = if accumulate { MapFlags::LOAD | MapFlags::DIRTY } else { MapFlags::DIRTY };
        let hi = self.regs.map_pinned(e, MipsReg::HI, flags)?;
        let lo = self.regs.map_pinned(e, MipsReg::LO, flags)?;
        self.regs.unpin_all();
        Ok([hi, lo, a, b])
    }

    pub(super) fn emit_multiply(&mut self, op: MulDivOp, rs: MipsReg, rt: MipsReg) -> Result<(), CompileError> {
        if op.is_divide() {
            return self.emit_divide(op.is_signed(), rs, rt);
        }
        let [hi, lo, a, b] = self.map_hilo(rs, rt, op.accumulates())?;
        let e = &mut self.code.emitter;
        match op {
            MulDivOp::Mult => e.smull(lo, hi, a, b),
            MulDivOp::Multu => e.umull(lo, hi, a, b),
            MulDivOp::Madd => e.smlal(lo, hi, a, b),
            MulDivOp::Maddu => e.umlal(lo, hi, a, b),
            MulDivOp::Msub | MulDivOp::Msubu => {
                if op == MulDivOp::Msub {
                    e.smull(SCRATCH1, SCRATCH2, a, b);
                } else {
                    e.umull(SCRATCH1, SCRATCH2, a, b);
                }
                e.dp(Cond::Al, DpOp::Sub, true, lo, lo, SCRATCH1.into());
                e.dp(Cond::Al, DpOp::Sbc, false, hi, hi, SCRATCH2.into());
            }
            MulDivOp::Div | MulDivOp::Divu => unreachable!("divide handled above"),
        }
        Ok(())
    }

    /// Division by a run-time divisor. A zero divisor leaves the dividend
    /// in HI and a sign-dependent quotient in LO.
    pub(super) fn emit_divide(&mut self, signed: bool, rs: MipsReg, rt: MipsReg) -> Result<(), CompileError> {
        debug_assert!(self.config.capabilities.hw_divide);
        let [hi, lo, a, b] = self.map_hilo(rs, rt, false)?;
        let e = &mut self.code.emitter;

        e.cmp_imm(b, 0, SCRATCH1);
        let by_zero = e.branch_placeholder(Cond::Eq);
        if signed {
            e.sdiv(SCRATCH1, a, b);
        } else {
            e.udiv(SCRATCH1, a, b);
        }
        e.mul(SCRATCH2, SCRATCH1, b);
        e.sub(hi, a, SCRATCH2);
        e.mov(lo, SCRATCH1);
        let done = e.branch_placeholder(Cond::Al);

        e.resolve_here(by_zero)?;
        e.mov(hi, a);
        if signed {
            e.materialize(lo, div_by_zero::SIGNED_QUOTIENT_NON_NEGATIVE);
            e.materialize(SCRATCH2, div_by_zero::SIGNED_QUOTIENT_NEGATIVE);
            e.cmp_imm(a, 0, SCRATCH1);
            e.mov_cond(Cond::Lt, lo, SCRATCH2);
        } else {
            e.materialize(lo, div_by_zero::UNSIGNED_QUOTIENT);
        }
        e.resolve_here(done)
    }

    /// Division by `1 << shift`. Signed quotients round toward zero.
    pub(super) fn emit_divide_pow2(&mut self, signed: bool, rs: MipsReg, shift: u32) -> Result<(), CompileError> {
        debug_assert!(shift < 32 && (!signed || shift < 31));
        let e = &mut self.code.emitter;
        let a = self.regs.map_pinned(e, rs, MapFlags::LOAD)?;
        let hi = self.regs.map_pinned(e, MipsReg::HI, MapFlags::DIRTY)?;
        let lo = self.regs.map_pinned(e, MipsReg::LO, MapFlags::DIRTY)?;
        self.regs.unpin_all();

        if shift == 0 {
            e.mov(lo, a);
            e.mov(hi, Operand2::byte(0));
        } else if signed {
            // Bias negative dividends by (2^k - 1) before the arithmetic shift.
            e.mov(SCRATCH1, ShifterOperand::shifted(a, ShiftType::Asr, 31));
            e.add(SCRATCH1, a, ShifterOperand::shifted(SCRATCH1, ShiftType::Lsr, 32 - shift));
            e.mov(lo, ShifterOperand::shifted(SCRATCH1, ShiftType::Asr, shift));
            e.sub(hi, a, ShifterOperand::shifted(lo, ShiftType::Lsl, shift));
        } else {
            e.mov(lo, ShifterOperand::shifted(a, ShiftType::Lsr, shift));
            e.alu_imm(DpOp::And, hi, a, (1u32 << shift) - 1, SCRATCH1);
        }
        Ok(())
    }
}
