//! Block translation: guest instructions in, backend operations out.
//!
//! A block starts at a guest address and runs until an unconditional
//! control transfer, a syscall or break, or the instruction limit. Taken
//! branches and jumps to static targets may be followed within the same
//! block when the corresponding optimization is enabled.
//!
//! Register values known at compile time live in the backend's register
//! cache; [`Translator::known`] is the only place that decides whether a
//! value may be folded.

pub mod alu;
pub mod branch;
pub mod load_store;
pub mod muldiv;
pub mod system;

use tracing::{debug, trace, warn};

use crate::backend::{Backend, Operand};
use crate::error::CompileError;
use crate::frontend::mips::decoder::{decode, is_interpreted_branch, MipsInst};
use crate::frontend::mips::types::MipsReg;
use crate::jit_config::{JitConfig, OptimizationFlag};

/// Translation settings taken from the JIT configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateOptions {
    pub const_prop: bool,
    pub continue_branches: bool,
    pub continue_jumps: bool,
    pub max_block_instructions: usize,
    /// Stop following static targets once this many instructions are in the block.
    pub continue_max_instructions: usize,
}

impl From<&JitConfig> for TranslateOptions {
    fn from(config: &JitConfig) -> Self {
        Self {
            const_prop: config.has_optimization(OptimizationFlag::CONST_PROP),
            continue_branches: config.has_optimization(OptimizationFlag::CONTINUE_BRANCHES),
            continue_jumps: config.has_optimization(OptimizationFlag::CONTINUE_JUMPS),
            max_block_instructions: config.max_block_instructions,
            continue_max_instructions: config.continue_max_instructions,
        }
    }
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            const_prop: true,
            continue_branches: true,
            continue_jumps: true,
            max_block_instructions: JitConfig::DEFAULT_MAX_BLOCK_INSTRUCTIONS,
            continue_max_instructions: JitConfig::DEFAULT_CONTINUE_MAX_INSTRUCTIONS,
        }
    }
}

/// What a translated block covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
    pub start: u32,
    /// Lowest guest address translated into the block.
    pub first: u32,
    /// Highest guest address translated into the block.
    pub last: u32,
    pub instructions: usize,
    pub cycles: u32,
}

/// Where translation goes after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// The next sequential instruction.
    Next,
    /// Continue at another guest address in the same block.
    Goto(u32),
    /// The block has been closed with an exit.
    Done,
}

/// Translate the block at `start` into `backend`.
///
/// On error the partially emitted block is abandoned and nothing is
/// registered.
pub fn translate_block<B: Backend>(
    backend: &mut B,
    fetch: &dyn Fn(u32) -> Option<u32>,
    start: u32,
    opts: &TranslateOptions,
) -> Result<BlockSummary, CompileError> {
    backend.begin_block(start)?;
    let result = Translator::new(&mut *backend, fetch, *opts, start)
        .run()
        .and_then(|summary| backend.finish_block(summary.first, summary.last).map(|()| summary));
    if result.is_err() {
        backend.abandon_block();
    }
    result
}

pub(crate) struct Translator<'a, B: Backend> {
    backend: &'a mut B,
    fetch: &'a dyn Fn(u32) -> Option<u32>,
    opts: TranslateOptions,
    start: u32,
    /// Address of the instruction being translated.
    pc: u32,
    /// Its encoding.
    word: u32,
    count: usize,
    cycles: u32,
    first: u32,
    last: u32,
}

impl<'a, B: Backend> Translator<'a, B> {
    fn new(backend: &'a mut B, fetch: &'a dyn Fn(u32) -> Option<u32>, opts: TranslateOptions, start: u32) -> Self {
        Self { backend, fetch, opts, start, pc: start, word: 0, count: 0, cycles: 0, first: start, last: start }
    }

    fn run(mut self) -> Result<BlockSummary, CompileError> {
        loop {
            if self.count >= self.opts.max_block_instructions {
                self.backend.flush_all()?;
                self.backend.write_exit(self.pc, self.cycles)?;
                break;
            }
            let Some(word) = (self.fetch)(self.pc) else {
                if self.count == 0 {
                    return Err(CompileError::InstructionFetch(self.pc));
                }
                warn!(pc = format_args!("{:#010x}", self.pc), "instruction fetch failed mid-block");
                self.backend.flush_all()?;
                self.backend.write_exit(self.pc, self.cycles)?;
                break;
            };
            self.word = word;
            let inst = decode(word);
            self.note(self.pc);
            trace!(pc = format_args!("{:#010x}", self.pc), %inst, "translate");

            let flow = self.compile(inst)?;
            self.backend.check_locks()?;
            self.backend.flush_literals_if_needed()?;
            match flow {
                Flow::Next => self.pc = self.pc.wrapping_add(4),
                Flow::Goto(target) => self.pc = target,
                Flow::Done => break,
            }
        }
        Ok(BlockSummary {
            start: self.start,
            first: self.first,
            last: self.last,
            instructions: self.count,
            cycles: self.cycles,
        })
    }

    /// Account for one translated instruction at `pc`.
    fn note(&mut self, pc: u32) {
        self.count += 1;
        self.cycles += 1;
        self.first = self.first.min(pc);
        self.last = self.last.max(pc);
    }

    fn compile(&mut self, inst: MipsInst) -> Result<Flow, CompileError> {
        match inst {
            MipsInst::Nop => Ok(Flow::Next),
            MipsInst::Alu3 { op, rd, rs, rt } => self.alu3(op, rd, rs, rt),
            MipsInst::AluImm { op, rt, rs, imm } => self.alu_imm(op, rt, rs, imm),
            MipsInst::Lui { rt, imm } => self.lui(rt, imm),
            MipsInst::Shift { op, rd, rt, sa } => self.shift_imm(op, rd, rt, sa),
            MipsInst::ShiftVar { op, rd, rt, rs } => self.shift_var(op, rd, rt, rs),
            MipsInst::CondMove { on_zero, rd, rs, rt } => self.cond_move(on_zero, rd, rs, rt),
            MipsInst::Unary { op, rd, src } => self.unary(op, rd, src),
            MipsInst::Ext { rt, rs, pos, size } => self.ext(rt, rs, pos, size),
            MipsInst::Ins { rt, rs, pos, size } => self.ins(rt, rs, pos, size),
            MipsInst::MulDiv { op, rs, rt } => self.mul_div(op, rs, rt),
            MipsInst::HiLo { op, reg } => self.hi_lo(op, reg),
            MipsInst::Load { width, signed, rt, base, offset } => self.load(width, signed, rt, base, offset),
            MipsInst::Store { width, rt, base, offset } => self.store(width, rt, base, offset),
            MipsInst::Branch { cond, rs, rt, offset, likely, link } => {
                self.branch(cond, rs, rt, offset, likely, link)
            }
            MipsInst::Jump { index, link } => self.jump(index, link),
            MipsInst::JumpReg { rs, rd } => self.jump_reg(rs, rd),
            MipsInst::Syscall { code } => self.syscall(code),
            MipsInst::Break { code } => self.break_(code),
            MipsInst::Interpret if is_interpreted_branch(self.word) => self.escape_to_interpreter(),
            MipsInst::Interpret => self.interpret(),
        }
    }

    // ---- Helpers shared by the instruction handlers ----

    /// The compile-time value of `reg`, if constant propagation may use it.
    fn known(&self, reg: MipsReg) -> Option<u32> {
        if reg.is_zero() {
            Some(0)
        } else if self.opts.const_prop && self.backend.is_imm(reg) {
            Some(self.backend.get_imm(reg))
        } else {
            None
        }
    }

    fn operand(&self, reg: MipsReg) -> Operand {
        match self.known(reg) {
            Some(value) => Operand::Imm(value),
            None => Operand::Reg(reg),
        }
    }

    /// Record a compile-time result. Writes to `$zero` are dropped.
    fn set_const(&mut self, reg: MipsReg, value: u32) {
        if !reg.is_zero() {
            self.backend.set_imm(reg, value);
        }
    }

    /// Run the current instruction in the interpreter.
    fn interpret(&mut self) -> Result<Flow, CompileError> {
        self.backend.flush_all()?;
        self.backend.call_interpreter(self.pc, self.word)?;
        debug!(pc = format_args!("{:#010x}", self.pc), word = format_args!("{:#010x}", self.word), "interpreter fallback");
        Ok(Flow::Next)
    }

    /// Hand the current branch and its delay slot to the interpreter, then
    /// leave the block for wherever it put the PC.
    fn escape_to_interpreter(&mut self) -> Result<Flow, CompileError> {
        self.backend.flush_all()?;
        self.backend.call_interpreter(self.pc, self.word)?;
        self.note(self.pc.wrapping_add(4));
        self.backend.write_exit_to_pc(self.cycles)?;
        warn!(pc = format_args!("{:#010x}", self.pc), "branch handed to interpreter with its delay slot");
        Ok(Flow::Done)
    }

    /// Continue translating at a static `target`, or close the block there.
    fn follow(&mut self, target: u32, allowed: bool) -> Result<Flow, CompileError> {
        if allowed && self.count < self.opts.continue_max_instructions {
            trace!(target = format_args!("{target:#010x}"), "following static target");
            return Ok(Flow::Goto(target));
        }
        self.backend.flush_all()?;
        self.backend.write_exit(target, self.cycles)?;
        Ok(Flow::Done)
    }

    fn fetch_delay_slot(&self) -> Result<u32, CompileError> {
        let at = self.pc.wrapping_add(4);
        (self.fetch)(at).ok_or(CompileError::InstructionFetch(at))
    }

    /// Whether the delay slot after the current branch must be interpreted
    /// together with it.
    fn delay_slot_needs_escape(&self) -> Result<bool, CompileError> {
        let word = self.fetch_delay_slot()?;
        let inst = decode(word);
        Ok(inst.is_branch()
            || is_interpreted_branch(word)
            || matches!(inst, MipsInst::Syscall { .. } | MipsInst::Break { .. }))
    }

    /// Translate the delay slot of the current branch in place.
    fn compile_delay_slot(&mut self) -> Result<(), CompileError> {
        let (pc, word) = (self.pc, self.word);
        self.pc = pc.wrapping_add(4);
        self.word = self.fetch_delay_slot()?;
        let inst = decode(self.word);
        self.note(self.pc);
        trace!(pc = format_args!("{:#010x}", self.pc), %inst, "delay slot");
        let flow = self.compile(inst)?;
        debug_assert_eq!(flow, Flow::Next, "delay slot must not end the block");
        self.backend.check_locks()?;
        self.pc = pc;
        self.word = word;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::asm::*;
    use super::test_support::*;
    use super::*;
    use crate::backend::arm::callback::HostCall;
    use crate::backend::arm::jit_state::GuestContext;
    use crate::backend::arm::test_support::TestMemory;
    use crate::jit_config::CpuCapabilities;

    #[test]
    fn test_block_stops_at_instruction_limit() {
        let words = vec![addiu(8, 8, 1); 10];
        let opts = TranslateOptions { max_block_instructions: 4, ..TranslateOptions::default() };
        let mut ctx = GuestContext::new();
        let summary = exec_with(CpuCapabilities::armv7(), opts, &words, &mut ctx, &mut TestMemory::default());
        assert_eq!(summary.instructions, 4);
        assert_eq!(summary.cycles, 4);
        assert_eq!((summary.first, summary.last), (BASE, BASE + 12));
        assert_eq!(ctx.gpr[8], 4);
        assert_eq!(ctx.pc, BASE + 16);
        assert_eq!(ctx.downcount, 1000 - 4);
    }

    #[test]
    fn test_fetch_failure() {
        let mut b = crate::backend::arm::test_support::backend(CpuCapabilities::armv7());
        let fetch = |_pc: u32| None;
        let err = translate_block(&mut b, &fetch, BASE, &TranslateOptions::default()).unwrap_err();
        assert_eq!(err, CompileError::InstructionFetch(BASE));
        assert_eq!(b.block_count(), 0);

        // A block that runs off the end of readable code exits there.
        let mut ctx = GuestContext::new();
        exec(&[addiu(8, 0, 5), addu(9, 8, 8)], &mut ctx);
        assert_eq!(ctx.gpr[9], 10);
        assert_eq!(ctx.pc, BASE + 8);
    }

    #[test]
    fn test_unsupported_instruction_goes_to_interpreter() {
        // lwl t0, 0(zero) has no fast path
        let lwl = 0x8808_0000;
        let mut ctx = GuestContext::new();
        let mut mem = TestMemory::default();
        let words = [addiu(8, 0, 3), lwl, addiu(9, 8, 1), jr(31), NOP];
        ctx.gpr[31] = 0x4000;
        exec_with(CpuCapabilities::armv7(), TranslateOptions::default(), &words, &mut ctx, &mut mem);
        assert_eq!(mem.calls, vec![(HostCall::Interpret, BASE + 4, lwl)]);
        // t0 was flushed before the call and reloaded after it
        assert_eq!(ctx.gpr[9], 4);
        assert_eq!(ctx.pc, 0x4000);
    }

    #[test]
    fn test_coprocessor_branch_escapes_with_delay_slot() {
        let mut ctx = GuestContext::new();
        let mut mem = TestMemory::default();
        let words = [addiu(8, 0, 1), bc1t(4), addiu(9, 0, 2)];
        let summary = exec_with(CpuCapabilities::armv7(), TranslateOptions::default(), &words, &mut ctx, &mut mem);
        assert_eq!(summary.instructions, 3);
        assert_eq!(mem.calls, vec![(HostCall::Interpret, BASE + 4, bc1t(4))]);
        assert_eq!(ctx.gpr[8], 1);
        // The test handler leaves the PC where the call stored it.
        assert_eq!(ctx.pc, BASE + 4);
    }

    #[test]
    fn test_const_prop_disabled_still_correct() {
        let opts = TranslateOptions { const_prop: false, ..TranslateOptions::default() };
        let words = [lui(8, 0x1234), ori(8, 8, 0x5678), addu(9, 8, 8), sll(10, 9, 4)];
        let mut ctx = GuestContext::new();
        exec_with(CpuCapabilities::armv6(), opts, &words, &mut ctx, &mut TestMemory::default());
        assert_eq!(ctx.gpr[8], 0x1234_5678);
        assert_eq!(ctx.gpr[9], 0x2468_ACF0);
        assert_eq!(ctx.gpr[10], 0x468A_CF00);
    }
}
