//! Integer ALU, shifts, conditional moves and the Allegrex bit-manipulation
//! extensions.

use crate::backend::{AluOp, Backend, FastPath, Operand};
use crate::error::CompileError;
use crate::frontend::mips::fold;
use crate::frontend::mips::translate::{Flow, Translator};
use crate::frontend::mips::types::{Alu3Op, AluImmOp, MemWidth, MipsReg, ShiftOp, UnaryOp};

fn backend_op(op: Alu3Op) -> Option<AluOp> {
    match op {
        Alu3Op::Add | Alu3Op::Addu => Some(AluOp::Add),
        Alu3Op::Sub | Alu3Op::Subu => Some(AluOp::Sub),
        Alu3Op::And => Some(AluOp::And),
        Alu3Op::Or => Some(AluOp::Or),
        Alu3Op::Xor => Some(AluOp::Xor),
        Alu3Op::Nor => Some(AluOp::Nor),
        Alu3Op::Slt | Alu3Op::Sltu | Alu3Op::Max | Alu3Op::Min => None,
    }
}

impl<B: Backend> Translator<'_, B> {
    pub(super) fn alu3(&mut self, op: Alu3Op, rd: MipsReg, rs: MipsReg, rt: MipsReg) -> Result<Flow, CompileError> {
        if rd.is_zero() {
            return Ok(Flow::Next);
        }
        if let (Some(a), Some(b)) = (self.known(rs), self.known(rt)) {
            self.set_const(rd, fold::alu3(op, a, b));
            return Ok(Flow::Next);
        }
        match op {
            Alu3Op::Slt | Alu3Op::Sltu => {
                let (lhs, rhs) = (self.operand(rs), self.operand(rt));
                self.backend.set_less_than(op == Alu3Op::Slt, rd, lhs, rhs)?;
            }
            Alu3Op::Max | Alu3Op::Min => self.backend.min_max(op == Alu3Op::Max, rd, rs, rt)?,
            _ => {
                let Some(alu) = backend_op(op) else {
                    return self.interpret();
                };
                self.alu_regs(alu, rd, rs, rt)?;
            }
        }
        Ok(Flow::Next)
    }

    /// Two-register ALU op with at most one known operand.
    fn alu_regs(&mut self, op: AluOp, rd: MipsReg, rs: MipsReg, rt: MipsReg) -> Result<(), CompileError> {
        let commutative = matches!(op, AluOp::Add | AluOp::And | AluOp::Or | AluOp::Xor | AluOp::Nor);
        match (self.known(rs), self.known(rt)) {
            // x + 0, x | 0, x ^ 0, x - 0
            (_, Some(0)) if matches!(op, AluOp::Add | AluOp::Or | AluOp::Xor | AluOp::Sub) => {
                self.backend.mov(rd, rs)
            }
            (Some(0), _) if matches!(op, AluOp::Add | AluOp::Or | AluOp::Xor) => self.backend.mov(rd, rt),
            (Some(0), _) if op == AluOp::And => {
                self.set_const(rd, 0);
                Ok(())
            }
            (_, Some(0)) if op == AluOp::And => {
                self.set_const(rd, 0);
                Ok(())
            }
            (Some(a), None) if commutative => self.backend.alu(op, rd, rt, Operand::Imm(a)),
            (Some(a), None) => self.backend.sub_from_imm(rd, a, rt),
            (_, Some(b)) => self.backend.alu(op, rd, rs, Operand::Imm(b)),
            (None, None) => self.backend.alu(op, rd, rs, Operand::Reg(rt)),
        }
    }

    pub(super) fn alu_imm(&mut self, op: AluImmOp, rt: MipsReg, rs: MipsReg, imm: u16) -> Result<Flow, CompileError> {
        if rt.is_zero() {
            return Ok(Flow::Next);
        }
        if let Some(a) = self.known(rs) {
            self.set_const(rt, fold::alu_imm(op, a, imm));
            return Ok(Flow::Next);
        }
        let value = fold::extend_imm(op, imm);
        let alu = match op {
            AluImmOp::Slti | AluImmOp::Sltiu => {
                self.backend.set_less_than(op == AluImmOp::Slti, rt, Operand::Reg(rs), Operand::Imm(value))?;
                return Ok(Flow::Next);
            }
            AluImmOp::Addi | AluImmOp::Addiu => AluOp::Add,
            AluImmOp::Andi => AluOp::And,
            AluImmOp::Ori => AluOp::Or,
            AluImmOp::Xori => AluOp::Xor,
        };
        if value == 0 && alu != AluOp::And {
            self.backend.mov(rt, rs)?;
        } else {
            self.backend.alu(alu, rt, rs, Operand::Imm(value))?;
        }
        Ok(Flow::Next)
    }

    pub(super) fn lui(&mut self, rt: MipsReg, imm: u16) -> Result<Flow, CompileError> {
        self.set_const(rt, (imm as u32) << 16);
        Ok(Flow::Next)
    }

    pub(super) fn shift_imm(&mut self, op: ShiftOp, rd: MipsReg, rt: MipsReg, sa: u8) -> Result<Flow, CompileError> {
        if rd.is_zero() {
            return Ok(Flow::Next);
        }
        match self.known(rt) {
            Some(v) => self.set_const(rd, fold::shift(op, v, sa as u32)),
            None if sa == 0 => self.backend.mov(rd, rt)?,
            None => self.backend.shift(op, rd, rt, Operand::Imm(sa as u32))?,
        }
        Ok(Flow::Next)
    }

    pub(super) fn shift_var(&mut self, op: ShiftOp, rd: MipsReg, rt: MipsReg, rs: MipsReg) -> Result<Flow, CompileError> {
        if rd.is_zero() {
            return Ok(Flow::Next);
        }
        match (self.known(rt), self.known(rs)) {
            (Some(v), Some(n)) => self.set_const(rd, fold::shift(op, v, n)),
            (_, Some(n)) => return self.shift_imm(op, rd, rt, (n & 0x1F) as u8),
            _ => self.backend.shift(op, rd, rt, Operand::Reg(rs))?,
        }
        Ok(Flow::Next)
    }

    pub(super) fn cond_move(&mut self, on_zero: bool, rd: MipsReg, rs: MipsReg, rt: MipsReg) -> Result<Flow, CompileError> {
        if rd.is_zero() {
            return Ok(Flow::Next);
        }
        match self.known(rt) {
            Some(t) if (t == 0) == on_zero => self.move_reg(rd, rs)?,
            Some(_) => {}
            None => self.backend.cond_move(on_zero, rd, rs, rt)?,
        }
        Ok(Flow::Next)
    }

    /// `rd = rs`, keeping a known value known.
    fn move_reg(&mut self, rd: MipsReg, rs: MipsReg) -> Result<(), CompileError> {
        match self.known(rs) {
            Some(v) => {
                self.set_const(rd, v);
                Ok(())
            }
            None => self.backend.mov(rd, rs),
        }
    }

    pub(super) fn unary(&mut self, op: UnaryOp, rd: MipsReg, src: MipsReg) -> Result<Flow, CompileError> {
        if rd.is_zero() {
            return Ok(Flow::Next);
        }
        if let Some(v) = self.known(src) {
            self.set_const(rd, fold::unary(op, v));
            return Ok(Flow::Next);
        }
        match op {
            UnaryOp::Clz => self.backend.count_leading(false, rd, src)?,
            UnaryOp::Clo => self.backend.count_leading(true, rd, src)?,
            UnaryOp::Seb => self.backend.sign_extend(MemWidth::Byte, rd, src)?,
            UnaryOp::Seh => self.backend.sign_extend(MemWidth::Half, rd, src)?,
            UnaryOp::Wsbh => self.backend.byte_swap(true, rd, src)?,
            UnaryOp::Wsbw => self.backend.byte_swap(false, rd, src)?,
            UnaryOp::Bitrev if self.backend.has_fast_path(FastPath::BitReverse) => {
                self.backend.bit_reverse(rd, src)?
            }
            UnaryOp::Bitrev => return self.interpret(),
        }
        Ok(Flow::Next)
    }

    pub(super) fn ext(&mut self, rt: MipsReg, rs: MipsReg, pos: u8, size: u8) -> Result<Flow, CompileError> {
        let (pos, size) = (pos as u32, size as u32);
        if pos + size > 32 {
            return self.interpret();
        }
        if rt.is_zero() {
            return Ok(Flow::Next);
        }
        if let Some(v) = self.known(rs) {
            self.set_const(rt, fold::ext(v, pos, size));
            return Ok(Flow::Next);
        }
        if size == 32 {
            self.backend.mov(rt, rs)?;
        } else if self.backend.has_fast_path(FastPath::BitField) {
            self.backend.extract(rt, rs, pos, size)?;
        } else {
            // Shift the field to the top, then back down.
            let left = 32 - pos - size;
            if left == 0 {
                self.backend.shift(ShiftOp::Srl, rt, rs, Operand::Imm(32 - size))?;
            } else {
                self.backend.shift(ShiftOp::Sll, rt, rs, Operand::Imm(left))?;
                self.backend.shift(ShiftOp::Srl, rt, rt, Operand::Imm(32 - size))?;
            }
        }
        Ok(Flow::Next)
    }

    pub(super) fn ins(&mut self, rt: MipsReg, rs: MipsReg, pos: u8, size: u8) -> Result<Flow, CompileError> {
        let (pos, size) = (pos as u32, size as u32);
        if pos + size > 32 {
            return self.interpret();
        }
        if rt.is_zero() {
            return Ok(Flow::Next);
        }
        if let (Some(old), Some(v)) = (self.known(rt), self.known(rs)) {
            self.set_const(rt, fold::ins(old, v, pos, size));
            return Ok(Flow::Next);
        }
        if !self.backend.has_fast_path(FastPath::BitField) {
            return self.interpret();
        }
        self.backend.insert(rt, rs, pos, size)?;
        Ok(Flow::Next)
    }
}
