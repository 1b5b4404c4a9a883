use tracing::info;

use crate::backend::arm::emitter::ArmEmitter;
use crate::backend::arm::hostloc::{ArmReg, CALLEE_SAVED_LIST, CTX_REG};
use crate::jit_config::CpuCapabilities;

/// Space kept free at the end of the code cache. When less than this is
/// left before a compile, the whole cache is cleared first.
pub const MIN_SPACE_REMAINING: usize = 16 * 1024;

/// Dispatcher entry and exit points recorded during prelude generation.
///
/// These are absolute offsets into the code buffer. Emitted blocks branch
/// to `return_from_run_code` to hand control back to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherLabels {
    /// `run_code(ctx, entry)`: saves host registers, installs the context
    /// pointer and jumps to `entry`.
    pub run_code: usize,
    /// Restores host registers and returns to the caller of `run_code`.
    pub return_from_run_code: usize,
}

/// The code buffer plus the dispatcher stubs living at its start.
///
/// During execution:
/// - r10 points to the [`crate::GuestContext`]
/// - host callee-saved registers are preserved across `run_code`
pub struct BlockOfCode {
    pub emitter: ArmEmitter,
    labels: DispatcherLabels,
    /// Offset where compiled blocks begin (after the prelude).
    code_begin: usize,
}

impl BlockOfCode {
    pub fn new(size: usize, caps: CpuCapabilities, use_literal_pool: bool) -> Self {
        let mut emitter = ArmEmitter::new(size, caps, use_literal_pool);
        let labels = Self::gen_run_code(&mut emitter);
        let code_begin = emitter.offset();
        Self { emitter, labels, code_begin }
    }

    /// Generate the dispatcher prelude.
    ///
    /// Calling convention (AAPCS):
    ///   r0 = guest context pointer
    ///   r1 = code address to jump to
    fn gen_run_code(e: &mut ArmEmitter) -> DispatcherLabels {
        let run_code = e.offset();
        e.push(CALLEE_SAVED_LIST | ArmReg::Lr.mask());
        e.mov(CTX_REG, ArmReg::R0);
        e.bx(ArmReg::R1);

        let return_from_run_code = e.offset();
        e.pop(CALLEE_SAVED_LIST | ArmReg::Pc.mask());

        e.flush_icache(run_code, e.offset());
        DispatcherLabels { run_code, return_from_run_code }
    }

    pub fn labels(&self) -> DispatcherLabels {
        self.labels
    }

    /// Offset of the first compiled block.
    pub fn code_begin(&self) -> usize {
        self.code_begin
    }

    /// Drop every compiled block; the prelude stays intact.
    pub fn clear_cache(&mut self) {
        info!(discarded_bytes = self.emitter.offset() - self.code_begin, "clearing code cache");
        self.emitter.rewind(self.code_begin);
    }

    /// Remaining bytes available for code generation.
    pub fn space_remaining(&self) -> usize {
        self.emitter.space_remaining()
    }

    pub fn code(&self) -> &[u8] {
        self.emitter.code()
    }
}
