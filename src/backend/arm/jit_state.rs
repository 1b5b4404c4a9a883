use bytemuck::{Pod, Zeroable};

use crate::frontend::mips::types::MipsReg;

/// Guest CPU state shared between the dispatcher and generated code.
///
/// `r10` points to this struct while guest code runs; every field is read
/// and written from generated code at the offsets below.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GuestContext {
    /// General-purpose registers. `gpr[0]` is never written by compiled code.
    pub gpr: [u32; 32],
    pub hi: u32,
    pub lo: u32,
    /// Address of the next guest instruction when outside compiled code.
    pub pc: u32,
    /// Remaining cycle budget. Blocks subtract their cost on exit and the
    /// checked entry bails out to the dispatcher once it is not positive.
    pub downcount: i32,
    /// Target of a JR/JALR, latched before its delay slot runs.
    pub branch_target: u32,
    /// Host condition flags saved across a delay slot.
    pub saved_flags: u32,
}

impl GuestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a register slot (GPRs, HI or LO).
    pub fn reg(&self, reg: MipsReg) -> u32 {
        match reg {
            MipsReg::HI => self.hi,
            MipsReg::LO => self.lo,
            r => self.gpr[r.index()],
        }
    }

    /// Write a register slot. Writes to `zero` are dropped.
    pub fn set_reg(&mut self, reg: MipsReg, value: u32) {
        match reg {
            MipsReg::ZERO => {}
            MipsReg::HI => self.hi = value,
            MipsReg::LO => self.lo = value,
            r => self.gpr[r.index()] = value,
        }
    }

    /// Byte offset of a register slot from the start of the context.
    pub const fn offset_of_reg(reg: MipsReg) -> usize {
        match reg.index() {
            32 => core::mem::offset_of!(GuestContext, hi),
            33 => core::mem::offset_of!(GuestContext, lo),
            i => core::mem::offset_of!(GuestContext, gpr) + i * 4,
        }
    }

    pub const fn offset_of_pc() -> usize {
        core::mem::offset_of!(GuestContext, pc)
    }

    pub const fn offset_of_downcount() -> usize {
        core::mem::offset_of!(GuestContext, downcount)
    }

    pub const fn offset_of_branch_target() -> usize {
        core::mem::offset_of!(GuestContext, branch_target)
    }

    pub const fn offset_of_saved_flags() -> usize {
        core::mem::offset_of!(GuestContext, saved_flags)
    }

    /// The context as raw bytes, in the layout generated code sees.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(self)
    }
}
