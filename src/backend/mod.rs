//! Code generation backends.
//!
//! The translator in [`crate::frontend::mips::translate`] is written once
//! against [`Backend`]; [`arm::ArmBackend`] is the one implementation.

pub mod arm;

use bitflags::bitflags;

use crate::error::CompileError;
use crate::frontend::mips::types::{MemWidth, MipsReg, MulDivOp, ShiftOp};

bitflags! {
    /// How a guest register is about to be used when mapped into a host register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u8 {
        /// The current value must be present in the host register.
        const LOAD  = 1 << 0;
        /// The host register will be written.
        const DIRTY = 1 << 1;
    }
}

/// Second operand of a backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(MipsReg),
    Imm(u32),
}

/// Two-operand integer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    /// `!(a | b)`
    Nor,
}

/// Address of a guest memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrOperand {
    /// Known at compile time.
    Const(u32),
    /// `base + offset` at run time.
    BaseOffset(MipsReg, i32),
}

/// Optional host features an operation may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FastPath {
    /// Hardware integer division.
    Divide,
    /// Bitfield extract and insert.
    BitField,
    /// Bit reversal.
    BitReverse,
}

/// Conditions usable after [`Backend::compare`], named after the guest
/// branch they implement. Comparisons are signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Equal,
    NotEqual,
    LessOrEqual,
    Greater,
    Less,
    GreaterOrEqual,
}

impl Condition {
    pub fn negate(self) -> Self {
        match self {
            Condition::Equal => Condition::NotEqual,
            Condition::NotEqual => Condition::Equal,
            Condition::LessOrEqual => Condition::Greater,
            Condition::Greater => Condition::LessOrEqual,
            Condition::Less => Condition::GreaterOrEqual,
            Condition::GreaterOrEqual => Condition::Less,
        }
    }
}

/// Everything the translator needs from a code generator.
///
/// Operations name guest registers; the backend maps them through its
/// register cache. Every operation leaves no register locked.
pub trait Backend {
    /// A forward branch inside the current block.
    type Fixup;

    // ---- Block lifecycle ----

    /// Start emitting a block for guest address `start`.
    fn begin_block(&mut self, start: u32) -> Result<(), CompileError>;
    /// Finish the current block, covering guest addresses `[first, last]`.
    fn finish_block(&mut self, first: u32, last: u32) -> Result<(), CompileError>;
    /// Throw away a partially emitted block.
    fn abandon_block(&mut self);
    /// Give the backend a chance to place pending constants mid-block.
    fn flush_literals_if_needed(&mut self) -> Result<(), CompileError>;
    /// Bytes emitted so far for the current block.
    fn block_size(&self) -> usize;

    // ---- Register cache ----

    fn set_imm(&mut self, reg: MipsReg, value: u32);
    fn is_imm(&self, reg: MipsReg) -> bool;
    fn get_imm(&self, reg: MipsReg) -> u32;
    fn map_reg(&mut self, reg: MipsReg, flags: MapFlags) -> Result<(), CompileError>;
    fn lock(&mut self, reg: MipsReg);
    fn unlock(&mut self, reg: MipsReg);
    fn flush_all(&mut self) -> Result<(), CompileError>;
    fn flush_reg(&mut self, reg: MipsReg) -> Result<(), CompileError>;
    /// Forget the cached value of `reg` without writing it back.
    fn discard(&mut self, reg: MipsReg);
    /// Verify no lock leaked past an instruction boundary.
    fn check_locks(&mut self) -> Result<(), CompileError>;

    // ---- Data processing ----

    fn alu(&mut self, op: AluOp, dst: MipsReg, lhs: MipsReg, rhs: Operand) -> Result<(), CompileError>;
    /// `dst = lhs - rhs` with a constant minuend.
    fn sub_from_imm(&mut self, dst: MipsReg, lhs: u32, rhs: MipsReg) -> Result<(), CompileError>;
    fn mov(&mut self, dst: MipsReg, src: MipsReg) -> Result<(), CompileError>;
    /// Shift `src` by a constant or by the low five bits of a register.
    fn shift(&mut self, op: ShiftOp, dst: MipsReg, src: MipsReg, amount: Operand) -> Result<(), CompileError>;
    /// `dst = (lhs < rhs) ? 1 : 0`.
    fn set_less_than(&mut self, signed: bool, dst: MipsReg, lhs: Operand, rhs: Operand) -> Result<(), CompileError>;
    /// `if (test == 0) == on_zero { dst = src }`.
    fn cond_move(&mut self, on_zero: bool, dst: MipsReg, src: MipsReg, test: MipsReg) -> Result<(), CompileError>;
    fn min_max(&mut self, max: bool, dst: MipsReg, lhs: MipsReg, rhs: MipsReg) -> Result<(), CompileError>;
    fn count_leading(&mut self, ones: bool, dst: MipsReg, src: MipsReg) -> Result<(), CompileError>;
    fn sign_extend(&mut self, width: MemWidth, dst: MipsReg, src: MipsReg) -> Result<(), CompileError>;
    /// WSBH (`halves`) or WSBW.
    fn byte_swap(&mut self, halves: bool, dst: MipsReg, src: MipsReg) -> Result<(), CompileError>;
    fn bit_reverse(&mut self, dst: MipsReg, src: MipsReg) -> Result<(), CompileError>;
    fn extract(&mut self, dst: MipsReg, src: MipsReg, pos: u32, size: u32) -> Result<(), CompileError>;
    fn insert(&mut self, dst: MipsReg, src: MipsReg, pos: u32, size: u32) -> Result<(), CompileError>;
    /// MULT/MADD/MSUB and their unsigned forms, writing HI/LO.
    fn multiply(&mut self, op: MulDivOp, rs: MipsReg, rt: MipsReg) -> Result<(), CompileError>;
    /// DIV/DIVU by a run-time divisor, including the zero-divisor results.
    fn divide(&mut self, signed: bool, rs: MipsReg, rt: MipsReg) -> Result<(), CompileError>;
    /// DIV/DIVU by `1 << shift`.
    fn divide_pow2(&mut self, signed: bool, rs: MipsReg, shift: u32) -> Result<(), CompileError>;
    fn has_fast_path(&self, path: FastPath) -> bool;

    // ---- Memory ----

    fn load(&mut self, width: MemWidth, signed: bool, dst: MipsReg, addr: AddrOperand) -> Result<(), CompileError>;
    fn store(&mut self, width: MemWidth, src: MipsReg, addr: AddrOperand) -> Result<(), CompileError>;

    // ---- Control flow ----

    /// Compare `lhs` with `rhs`, setting the condition for [`Self::branch_if`].
    fn compare(&mut self, lhs: MipsReg, rhs: Operand) -> Result<(), CompileError>;
    /// Branch forward when `cond` holds for the last comparison.
    fn branch_if(&mut self, cond: Condition) -> Self::Fixup;
    fn resolve_here(&mut self, fixup: Self::Fixup) -> Result<(), CompileError>;
    /// Preserve the comparison result across code that clobbers it.
    fn save_flags(&mut self);
    fn restore_flags(&mut self);
    /// Latch `src` as the target of a register jump.
    fn store_branch_target(&mut self, src: MipsReg) -> Result<(), CompileError>;
    /// Leave the block for `target`, charging `cycles`. Registers must be flushed.
    fn write_exit(&mut self, target: u32, cycles: u32) -> Result<(), CompileError>;
    /// Leave the block for the latched register-jump target.
    fn write_exit_to_branch_target(&mut self, cycles: u32) -> Result<(), CompileError>;
    /// Leave the block for whatever address the context's PC holds.
    fn write_exit_to_pc(&mut self, cycles: u32) -> Result<(), CompileError>;
    /// Run one instruction in the interpreter. Registers must be flushed.
    fn call_interpreter(&mut self, pc: u32, opcode: u32) -> Result<(), CompileError>;
    /// Invoke the syscall handler with PC already past the instruction.
    fn call_syscall(&mut self, pc: u32, code: u32) -> Result<(), CompileError>;
    /// Stop the run loop at a BREAK, PC past the instruction.
    fn call_break(&mut self, pc: u32, code: u32) -> Result<(), CompileError>;
}
