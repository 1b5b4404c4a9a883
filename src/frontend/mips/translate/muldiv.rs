//! Multiply, divide and HI/LO transfers.

use crate::backend::{Backend, FastPath};
use crate::error::CompileError;
use crate::frontend::mips::fold;
use crate::frontend::mips::translate::{Flow, Translator};
use crate::frontend::mips::types::{HiLoOp, MipsReg, MulDivOp};

impl<B: Backend> Translator<'_, B> {
    pub(super) fn mul_div(&mut self, op: MulDivOp, rs: MipsReg, rt: MipsReg) -> Result<Flow, CompileError> {
        let (a, b) = (self.known(rs), self.known(rt));
        let acc = if op.accumulates() {
            self.known(MipsReg::HI).zip(self.known(MipsReg::LO))
        } else {
            Some((0, 0))
        };
        if let (Some(a), Some(b), Some((hi, lo))) = (a, b, acc) {
            let (hi, lo) = fold::mul_div(op, a, b, hi, lo);
            self.set_const(MipsReg::HI, hi);
            self.set_const(MipsReg::LO, lo);
            return Ok(Flow::Next);
        }

        if !op.is_divide() {
            self.backend.multiply(op, rs, rt)?;
            return Ok(Flow::Next);
        }
        let signed = op == MulDivOp::Div;
        if let Some(divisor) = b {
            let pow2 = if signed { divisor as i32 > 0 } else { divisor != 0 } && divisor.is_power_of_two();
            if pow2 {
                self.backend.divide_pow2(signed, rs, divisor.trailing_zeros())?;
                return Ok(Flow::Next);
            }
        }
        if !self.backend.has_fast_path(FastPath::Divide) {
            return self.interpret();
        }
        self.backend.divide(signed, rs, rt)?;
        Ok(Flow::Next)
    }

    pub(super) fn hi_lo(&mut self, op: HiLoOp, reg: MipsReg) -> Result<Flow, CompileError> {
        let (dst, src) = match op {
            HiLoOp::Mfhi => (reg, MipsReg::HI),
            HiLoOp::Mflo => (reg, MipsReg::LO),
            HiLoOp::Mthi => (MipsReg::HI, reg),
            HiLoOp::Mtlo => (MipsReg::LO, reg),
        };
        if dst.is_zero() {
            return Ok(Flow::Next);
        }
        match self.known(src) {
            Some(v) => self.set_const(dst, v),
            None => self.backend.mov(dst, src)?,
        }
        Ok(Flow::Next)
    }
}
