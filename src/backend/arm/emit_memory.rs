//! Guest memory accesses and calls out to the host.
//!
//! Every access goes through a host call. The address is computed into
//! `r0` (and a store value into `r1`) before caller-saved host registers
//! are written back, so those registers may still be read as sources.

use crate::backend::arm::callback::HostCall;
use crate::backend::arm::emitter::DpOp;
use crate::backend::arm::hostloc::{CTX_REG, SCRATCH1, SCRATCH2};
use crate::backend::arm::jit_state::GuestContext;
use crate::backend::arm::ArmBackend;
use crate::backend::{AddrOperand, MapFlags};
use crate::error::CompileError;
use crate::frontend::mips::types::{MemWidth, MipsReg};

fn read_call(width: MemWidth) -> HostCall {
    match width {
        MemWidth::Byte => HostCall::ReadU8,
        MemWidth::Half => HostCall::ReadU16,
        MemWidth::Word => HostCall::ReadU32,
    }
}

fn write_call(width: MemWidth) -> HostCall {
    match width {
        MemWidth::Byte => HostCall::WriteU8,
        MemWidth::Half => HostCall::WriteU16,
        MemWidth::Word => HostCall::WriteU32,
    }
}

impl ArmBackend {
    /// `r0 = effective address`.
    fn emit_address(&mut self, addr: AddrOperand) -> Result<(), CompileError> {
        let addr = match addr {
            AddrOperand::BaseOffset(base, offset) => match self.regs.known(base) {
                Some(value) => AddrOperand::Const(value.wrapping_add(offset as u32)),
                None => addr,
            },
            constant => constant,
        };
        match addr {
            AddrOperand::Const(value) => self.code.emitter.materialize(SCRATCH1, value),
            AddrOperand::BaseOffset(base, offset) => {
                let b = self.map(base, MapFlags::LOAD)?;
                self.code.emitter.alu_imm(DpOp::Add, SCRATCH1, b, offset as u32, SCRATCH2);
            }
        }
        Ok(())
    }

    pub(super) fn emit_load(&mut self, width: MemWidth, signed: bool, dst: MipsReg, addr: AddrOperand) -> Result<(), CompileError> {
        self.emit_address(addr)?;
        // The old value of dst is dead; do not spill it around the call.
        self.regs.discard(dst);
        self.regs.flush_volatile(&mut self.code.emitter);
        read_call(width).emit_call_simple(&mut self.code.emitter);
        if dst.is_zero() {
            return Ok(());
        }
        let d = self.map(dst, MapFlags::DIRTY)?;
        let e = &mut self.code.emitter;
        match (width, signed) {
            (MemWidth::Byte, true) => e.sxtb(d, SCRATCH1),
            (MemWidth::Half, true) => e.sxth(d, SCRATCH1),
            _ => e.mov(d, SCRATCH1),
        }
        Ok(())
    }

    pub(super) fn emit_store(&mut self, width: MemWidth, src: MipsReg, addr: AddrOperand) -> Result<(), CompileError> {
        self.emit_address(addr)?;
        match self.regs.known(src) {
            Some(value) => self.code.emitter.materialize(SCRATCH2, value),
            None => {
                let s = self.map(src, MapFlags::LOAD)?;
                self.code.emitter.mov(SCRATCH2, s);
            }
        }
        self.regs.flush_volatile(&mut self.code.emitter);
        write_call(width).emit_call_simple(&mut self.code.emitter);
        Ok(())
    }

    fn emit_store_pc(&mut self, pc: u32) {
        let e = &mut self.code.emitter;
        e.materialize(SCRATCH1, pc);
        e.str(SCRATCH1, CTX_REG, GuestContext::offset_of_pc() as i32);
    }

    /// Hand one instruction to the interpreter. Every register must
    /// already be written back; the interpreter sees and edits the context.
    pub(super) fn emit_call_interpreter(&mut self, pc: u32, opcode: u32) -> Result<(), CompileError> {
        debug_assert_eq!(self.regs.mapped_count(), 0, "interpreter call with registers mapped");
        self.emit_store_pc(pc);
        HostCall::Interpret.emit_call(&mut self.code.emitter, |e, args| e.materialize(args[0], opcode));
        Ok(())
    }

    pub(super) fn emit_call_syscall(&mut self, pc: u32, code: u32) -> Result<(), CompileError> {
        debug_assert_eq!(self.regs.mapped_count(), 0, "syscall with registers mapped");
        self.emit_store_pc(pc.wrapping_add(4));
        HostCall::Syscall.emit_call(&mut self.code.emitter, |e, args| e.materialize(args[0], code));
        Ok(())
    }

    pub(super) fn emit_call_break(&mut self, pc: u32, code: u32) -> Result<(), CompileError> {
        debug_assert_eq!(self.regs.mapped_count(), 0, "break with registers mapped");
        self.emit_store_pc(pc.wrapping_add(4));
        HostCall::Break.emit_call(&mut self.code.emitter, |e, args| e.materialize(args[0], code));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::arm::test_support::{compile, run, TestMemory};
    use crate::backend::{AluOp, Backend, Operand};
    use crate::jit_config::CpuCapabilities;

    #[test]
    fn test_load_widths_and_sign() {
        let mut b = compile(CpuCapabilities::armv6(), 0x1000, |b| {
            b.load(MemWidth::Byte, true, MipsReg::T1, AddrOperand::BaseOffset(MipsReg::T0, 3))?;
            b.load(MemWidth::Byte, false, MipsReg::T2, AddrOperand::BaseOffset(MipsReg::T0, 3))?;
            b.load(MemWidth::Half, true, MipsReg::T3, AddrOperand::BaseOffset(MipsReg::T0, 2))?;
            b.load(MemWidth::Word, false, MipsReg::S0, AddrOperand::Const(0x100))
        });
        let mut mem = TestMemory::default();
        mem.bytes[0x100..0x104].copy_from_slice(&[0x11, 0x22, 0x80, 0xF0]);
        let mut ctx = GuestContext::new();
        ctx.gpr[8] = 0x100;
        run(&mut b, 0x1000, &mut ctx, &mut mem);
        assert_eq!(ctx.gpr[9], 0xFFFF_FFF0);
        assert_eq!(ctx.gpr[10], 0xF0);
        assert_eq!(ctx.gpr[11], 0xFFFF_F080);
        assert_eq!(ctx.gpr[16], 0xF080_2211);
    }

    #[test]
    fn test_store_survives_volatile_spill() {
        // Enough live registers that r2/r3 are in use across the call.
        let mut b = compile(CpuCapabilities::armv7(), 0x1000, |b| {
            for n in 8..16 {
                b.alu(AluOp::Add, MipsReg::gpr(n), MipsReg::gpr(n), Operand::Imm(1))?;
            }
            b.store(MemWidth::Word, MipsReg::gpr(15), AddrOperand::BaseOffset(MipsReg::gpr(14), -4))?;
            b.store(MemWidth::Half, MipsReg::gpr(9), AddrOperand::BaseOffset(MipsReg::gpr(8), 0))?;
            b.set_imm(MipsReg::S0, 0xAB);
            b.store(MemWidth::Byte, MipsReg::S0, AddrOperand::Const(0x300))
        });
        let mut mem = TestMemory::default();
        let mut ctx = GuestContext::new();
        for n in 8..16 {
            ctx.gpr[n] = 0x100 * n as u32;
        }
        run(&mut b, 0x1000, &mut ctx, &mut mem);
        for n in 8..16 {
            assert_eq!(ctx.gpr[n], 0x100 * n as u32 + 1);
        }
        let word = u32::from_le_bytes(mem.bytes[0xE01 - 4..0xE01].try_into().unwrap());
        assert_eq!(word, 0xF01);
        assert_eq!(&mem.bytes[0x801..0x803], &[0x01, 0x09]);
        assert_eq!(mem.bytes[0x300], 0xAB);
    }

    #[test]
    fn test_load_into_zero_still_reads() {
        let mut b = compile(CpuCapabilities::armv7(), 0x1000, |b| {
            b.load(MemWidth::Word, false, MipsReg::ZERO, AddrOperand::Const(0x40))
        });
        let mut ctx = GuestContext::new();
        run(&mut b, 0x1000, &mut ctx, &mut TestMemory::default());
        assert_eq!(ctx.gpr[0], 0);
    }

    #[test]
    fn test_host_calls_see_pc() {
        let mut b = compile(CpuCapabilities::armv7(), 0x1000, |b| {
            b.call_interpreter(0x1000, 0x7C00_0000)?;
            b.call_syscall(0x1004, 0x42)?;
            b.call_break(0x1008, 7)
        });
        let mut mem = TestMemory::default();
        let mut ctx = GuestContext::new();
        run(&mut b, 0x1000, &mut ctx, &mut mem);
        assert_eq!(
            mem.calls,
            vec![
                (HostCall::Interpret, 0x1000, 0x7C00_0000),
                (HostCall::Syscall, 0x1008, 0x42),
                (HostCall::Break, 0x100C, 7),
            ]
        );
    }
}
