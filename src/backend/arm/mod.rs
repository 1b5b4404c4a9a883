//! ARM32 code generation backend.

pub mod block_cache;
pub mod block_of_code;
pub mod callback;
pub mod emit_data_processing;
pub mod emit_memory;
pub mod emit_terminal;
pub mod emitter;
pub mod executor;
pub mod hostloc;
pub mod jit_state;
pub mod literal_pool;
pub mod operand;
pub mod patch_info;
pub mod reg_cache;

use crate::backend::arm::block_cache::{BlockCache, BlockExit, CompiledBlock};
use crate::backend::arm::block_of_code::{BlockOfCode, DispatcherLabels};
use crate::backend::arm::emitter::{ArmEmitter, Fixup};
use crate::backend::arm::patch_info::PatchTable;
use crate::backend::arm::reg_cache::RegCache;
use crate::backend::{
    AddrOperand, AluOp, Backend, Condition, FastPath, MapFlags, Operand,
};
use crate::error::CompileError;
use crate::frontend::mips::types::{MemWidth, MipsReg, MulDivOp, ShiftOp};
use crate::jit_config::{CpuCapabilities, JitConfig, OptimizationFlag};

/// Per-block state while a block is being emitted.
#[derive(Debug)]
struct BlockInProgress {
    start: u32,
    checked_entry: usize,
    normal_entry: usize,
    exits: Vec<BlockExit>,
}

/// Code generator settings taken from the JIT configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendConfig {
    pub capabilities: CpuCapabilities,
    pub code_cache_size: usize,
    pub enable_cycle_counting: bool,
    pub block_linking: bool,
    pub literal_pool: bool,
}

impl From<&JitConfig> for BackendConfig {
    fn from(config: &JitConfig) -> Self {
        Self {
            capabilities: config.capabilities,
            code_cache_size: config.code_cache_size,
            enable_cycle_counting: config.enable_cycle_counting,
            block_linking: config.has_optimization(OptimizationFlag::BLOCK_LINKING),
            literal_pool: config.has_optimization(OptimizationFlag::LITERAL_POOL),
        }
    }
}

/// The ARM32 implementation of [`Backend`].
///
/// Owns the code buffer, the register cache and the block registry. The
/// operations themselves live in `emit_data_processing`, `emit_memory`
/// and `emit_terminal`.
pub struct ArmBackend {
    code: BlockOfCode,
    regs: RegCache,
    blocks: BlockCache,
    patches: PatchTable,
    config: BackendConfig,
    current: Option<BlockInProgress>,
}

impl ArmBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            code: BlockOfCode::new(config.code_cache_size, config.capabilities, config.literal_pool),
            regs: RegCache::new(),
            blocks: BlockCache::new(),
            patches: PatchTable::new(),
            config,
            current: None,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn labels(&self) -> DispatcherLabels {
        self.code.labels()
    }

    /// The whole code buffer, prelude included.
    pub fn code(&self) -> &[u8] {
        self.code.code()
    }

    pub fn space_remaining(&self) -> usize {
        self.code.space_remaining()
    }

    /// Dispatcher entry of the block compiled for `pc`.
    pub fn entry_for(&self, pc: u32) -> Option<usize> {
        self.blocks.get(pc).map(|b| b.normal_entry)
    }

    /// Guest address of the block whose checked entry is at `offset`.
    pub fn block_at_checked_entry(&self, offset: usize) -> Option<u32> {
        self.blocks.start_at_checked_entry(offset)
    }

    pub fn block(&self, pc: u32) -> Option<&CompiledBlock> {
        self.blocks.get(pc)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Native code of the block compiled for `pc`.
    pub fn block_code(&self, pc: u32) -> Option<&[u8]> {
        let block = self.blocks.get(pc)?;
        self.code.code().get(block.checked_entry..block.checked_entry + block.size)
    }

    /// Guest register cache, for inspection.
    pub fn reg_cache(&self) -> &RegCache {
        &self.regs
    }

    fn emitter(&mut self) -> &mut ArmEmitter {
        &mut self.code.emitter
    }

    /// Map `reg` through the register cache into a host register.
    fn map(&mut self, reg: MipsReg, flags: MapFlags) -> Result<hostloc::ArmReg, CompileError> {
        self.regs.map(&mut self.code.emitter, reg, flags)
    }
}

impl Backend for ArmBackend {
    type Fixup = Fixup;

    fn begin_block(&mut self, start: u32) -> Result<(), CompileError> {
        self.begin(start)
    }

    fn finish_block(&mut self, first: u32, last: u32) -> Result<(), CompileError> {
        self.finish(first, last)
    }

    fn abandon_block(&mut self) {
        self.abandon();
    }

    fn flush_literals_if_needed(&mut self) -> Result<(), CompileError> {
        self.emitter().flush_literals_if_needed()
    }

    fn block_size(&self) -> usize {
        match &self.current {
            Some(block) => self.code.emitter.offset() - block.checked_entry,
            None => 0,
        }
    }

    fn set_imm(&mut self, reg: MipsReg, value: u32) {
        self.regs.set_imm(reg, value);
    }

    fn is_imm(&self, reg: MipsReg) -> bool {
        self.regs.is_imm(reg)
    }

    fn get_imm(&self, reg: MipsReg) -> u32 {
        self.regs.get_imm(reg)
    }

    fn map_reg(&mut self, reg: MipsReg, flags: MapFlags) -> Result<(), CompileError> {
        self.map(reg, flags).map(|_| ())
    }

    fn lock(&mut self, reg: MipsReg) {
        self.regs.lock(reg);
    }

    fn unlock(&mut self, reg: MipsReg) {
        self.regs.unlock(reg);
    }

    fn flush_all(&mut self) -> Result<(), CompileError> {
        self.regs.flush_all(&mut self.code.emitter);
        Ok(())
    }

    fn flush_reg(&mut self, reg: MipsReg) -> Result<(), CompileError> {
        self.regs.flush_reg(&mut self.code.emitter, reg);
        Ok(())
    }

    fn discard(&mut self, reg: MipsReg) {
        self.regs.discard(reg);
    }

    fn check_locks(&mut self) -> Result<(), CompileError> {
        self.regs.sanity_check()
    }

    fn alu(&mut self, op: AluOp, dst: MipsReg, lhs: MipsReg, rhs: Operand) -> Result<(), CompileError> {
        self.emit_alu(op, dst, lhs, rhs)
    }

    fn sub_from_imm(&mut self, dst: MipsReg, lhs: u32, rhs: MipsReg) -> Result<(), CompileError> {
        self.emit_sub_from_imm(dst, lhs, rhs)
    }

    fn mov(&mut self, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        self.emit_mov(dst, src)
    }

    fn shift(&mut self, op: ShiftOp, dst: MipsReg, src: MipsReg, amount: Operand) -> Result<(), CompileError> {
        self.emit_shift(op, dst, src, amount)
    }

    fn set_less_than(&mut self, signed: bool, dst: MipsReg, lhs: Operand, rhs: Operand) -> Result<(), CompileError> {
        self.emit_set_less_than(signed, dst, lhs, rhs)
    }

    fn cond_move(&mut self, on_zero: bool, dst: MipsReg, src: MipsReg, test: MipsReg) -> Result<(), CompileError> {
        self.emit_cond_move(on_zero, dst, src, test)
    }

    fn min_max(&mut self, max: bool, dst: MipsReg, lhs: MipsReg, rhs: MipsReg) -> Result<(), CompileError> {
        self.emit_min_max(max, dst, lhs, rhs)
    }

    fn count_leading(&mut self, ones: bool, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        self.emit_count_leading(ones, dst, src)
    }

    fn sign_extend(&mut self, width: MemWidth, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        self.emit_sign_extend(width, dst, src)
    }

    fn byte_swap(&mut self, halves: bool, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        self.emit_byte_swap(halves, dst, src)
    }

    fn bit_reverse(&mut self, dst: MipsReg, src: MipsReg) -> Result<(), CompileError> {
        self.emit_bit_reverse(dst, src)
    }

    fn extract(&mut self, dst: MipsReg, src: MipsReg, pos: u32, size: u32) -> Result<(), CompileError> {
        self.emit_extract(dst, src, pos, size)
    }

    fn insert(&mut self, dst: MipsReg, src: MipsReg, pos: u32, size: u32) -> Result<(), CompileError> {
        self.emit_insert(dst, src, pos, size)
    }

    fn multiply(&mut self, op: MulDivOp, rs: MipsReg, rt: MipsReg) -> Result<(), CompileError> {
        self.emit_multiply(op, rs, rt)
    }

    fn divide(&mut self, signed: bool, rs: MipsReg, rt: MipsReg) -> Result<(), CompileError> {
        self.emit_divide(signed, rs, rt)
    }

    fn divide_pow2(&mut self, signed: bool, rs: MipsReg, shift: u32) -> Result<(), CompileError> {
        self.emit_divide_pow2(signed, rs, shift)
    }

    fn has_fast_path(&self, path: FastPath) -> bool {
        let caps = self.config.capabilities;
        match path {
            FastPath::Divide => caps.hw_divide,
            FastPath::BitField | FastPath::BitReverse => caps.armv7,
        }
    }

    fn load(&mut self, width: MemWidth, signed: bool, dst: MipsReg, addr: AddrOperand) -> Result<(), CompileError> {
        self.emit_load(width, signed, dst, addr)
    }

    fn store(&mut self, width: MemWidth, src: MipsReg, addr: AddrOperand) -> Result<(), CompileError> {
        self.emit_store(width, src, addr)
    }

    fn compare(&mut self, lhs: MipsReg, rhs: Operand) -> Result<(), CompileError> {
        self.emit_compare(lhs, rhs)
    }

    fn branch_if(&mut self, cond: Condition) -> Fixup {
        self.emit_branch_if(cond)
    }

    fn resolve_here(&mut self, fixup: Fixup) -> Result<(), CompileError> {
        self.emitter().resolve_here(fixup)
    }

    fn save_flags(&mut self) {
        self.emit_save_flags();
    }

    fn restore_flags(&mut self) {
        self.emit_restore_flags();
    }

    fn store_branch_target(&mut self, src: MipsReg) -> Result<(), CompileError> {
        self.emit_store_branch_target(src)
    }

    fn write_exit(&mut self, target: u32, cycles: u32) -> Result<(), CompileError> {
        self.emit_exit(target, cycles)
    }

    fn write_exit_to_branch_target(&mut self, cycles: u32) -> Result<(), CompileError> {
        self.emit_exit_to_branch_target(cycles)
    }

    fn write_exit_to_pc(&mut self, cycles: u32) -> Result<(), CompileError> {
        self.emit_exit_to_pc(cycles)
    }

    fn call_interpreter(&mut self, pc: u32, opcode: u32) -> Result<(), CompileError> {
        self.emit_call_interpreter(pc, opcode)
    }

    fn call_syscall(&mut self, pc: u32, code: u32) -> Result<(), CompileError> {
        self.emit_call_syscall(pc, code)
    }

    fn call_break(&mut self, pc: u32, code: u32) -> Result<(), CompileError> {
        self.emit_call_break(pc, code)
    }
}
