use tracing::debug;

use crate::backend::Backend;
use crate::error::CompileError;
use crate::frontend::mips::translate::{Flow, Translator};

impl<B: Backend> Translator<'_, B> {
    /// SYSCALL ends the block; the handler may have moved the PC.
    pub(super) fn syscall(&mut self, code: u32) -> Result<Flow, CompileError> {
        self.backend.flush_all()?;
        self.backend.call_syscall(self.pc, code)?;
        self.backend.write_exit_to_pc(self.cycles)?;
        debug!(pc = format_args!("{:#010x}", self.pc), code = format_args!("{code:#x}"), "syscall ends block");
        Ok(Flow::Done)
    }

    pub(super) fn break_(&mut self, code: u32) -> Result<Flow, CompileError> {
        self.backend.flush_all()?;
        self.backend.call_break(self.pc, code)?;
        self.backend.write_exit_to_pc(self.cycles)?;
        Ok(Flow::Done)
    }
}
