use crate::backend::{AddrOperand, Backend};
use crate::error::CompileError;
use crate::frontend::mips::translate::{Flow, Translator};
use crate::frontend::mips::types::{MemWidth, MipsReg};

impl<B: Backend> Translator<'_, B> {
    fn address(&self, base: MipsReg, offset: i16) -> AddrOperand {
        match self.known(base) {
            Some(b) => AddrOperand::Const(b.wrapping_add(offset as i32 as u32)),
            None => AddrOperand::BaseOffset(base, offset as i32),
        }
    }

    /// A load into `$zero` still performs the access.
    pub(super) fn load(
        &mut self,
        width: MemWidth,
        signed: bool,
        rt: MipsReg,
        base: MipsReg,
        offset: i16,
    ) -> Result<Flow, CompileError> {
        let addr = self.address(base, offset);
        self.backend.load(width, signed, rt, addr)?;
        Ok(Flow::Next)
    }

    pub(super) fn store(&mut self, width: MemWidth, rt: MipsReg, base: MipsReg, offset: i16) -> Result<Flow, CompileError> {
        let addr = self.address(base, offset);
        self.backend.store(width, rt, addr)?;
        Ok(Flow::Next)
    }
}
