use crate::backend::arm::jit_state::GuestContext;
use crate::error::JitError;

/// Callbacks provided by the host for JIT execution.
///
/// These are invoked from generated code (through host-call thunks) for
/// guest memory access, system calls and instructions the JIT has no fast
/// path for, and from the dispatcher for instruction fetch and tick counting.
pub trait JitCallbacks: Send {
    /// Read a 32-bit instruction word from guest memory.
    /// Returns None if the address is unmapped.
    fn read_code(&self, vaddr: u32) -> Option<u32>;

    fn read_8(&self, vaddr: u32) -> u8;
    fn read_16(&self, vaddr: u32) -> u16;
    fn read_32(&self, vaddr: u32) -> u32;

    fn write_8(&mut self, vaddr: u32, value: u8);
    fn write_16(&mut self, vaddr: u32, value: u16);
    fn write_32(&mut self, vaddr: u32, value: u32);

    /// Execute exactly one guest instruction against `ctx`.
    ///
    /// All guest registers have been written back to `ctx` and `ctx.pc`
    /// holds the instruction's address. For ordinary instructions the
    /// compiled code continues afterwards and ignores `ctx.pc`.
    ///
    /// The only branches ever passed here are coprocessor branches and
    /// branches whose delay slot holds another branch, a SYSCALL or a
    /// BREAK. For those the callback must apply the branch (including its
    /// delay slot) and leave `ctx.pc` at the next address to run; the block
    /// exits through the dispatcher using that value.
    fn interpret_instruction(&mut self, ctx: &mut GuestContext, opcode: u32);

    /// Called when SYSCALL is executed. `ctx.pc` already points past the
    /// instruction and may be redirected. Return true to halt the run loop.
    fn call_syscall(&mut self, ctx: &mut GuestContext, code: u32) -> bool;

    /// Add ticks consumed during this execution slice.
    fn add_ticks(&mut self, ticks: u64);

    /// Get the remaining tick budget.
    fn ticks_remaining(&self) -> u64;
}

/// Host CPU features the code generator may use.
///
/// Constructed once by the embedder and injected into the JIT; the
/// compiler only ever reads it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuCapabilities {
    /// ARMv7: MOVW/MOVT, UBFX/BFI, RBIT.
    pub armv7: bool,
    /// Integer divide (SDIV/UDIV).
    pub hw_divide: bool,
}

impl CpuCapabilities {
    pub const fn armv6() -> Self {
        Self { armv7: false, hw_divide: false }
    }

    pub const fn armv7() -> Self {
        Self { armv7: true, hw_divide: false }
    }

    pub const fn armv7_idiv() -> Self {
        Self { armv7: true, hw_divide: true }
    }
}

impl Default for CpuCapabilities {
    fn default() -> Self {
        Self::armv7_idiv()
    }
}

/// Optimization switches.
///
/// None of them may change guest-visible behaviour; disabling any of them
/// only makes the generated code slower.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptimizationFlag(u32);

impl OptimizationFlag {
    /// Direct branches between compiled blocks.
    pub const BLOCK_LINKING: Self = Self(0x0000_0001);
    /// Per-instruction constant folding of known register values.
    pub const CONST_PROP: Self = Self(0x0000_0002);
    /// Compile straight through branches whose outcome is known.
    pub const CONTINUE_BRANCHES: Self = Self(0x0000_0004);
    /// Compile straight through J/JAL.
    pub const CONTINUE_JUMPS: Self = Self(0x0000_0008);
    /// Load wide constants from a per-block literal pool.
    pub const LITERAL_POOL: Self = Self(0x0000_0010);

    /// No optimizations enabled.
    pub const NO_OPTIMIZATIONS: Self = Self(0);
    pub const ALL_OPTIMIZATIONS: Self = Self(0x0000_001F);

    /// Returns true if `flag` is set within `self`.
    #[inline]
    pub fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) == flag.0 && flag.0 != 0
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for OptimizationFlag {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl std::ops::BitOrAssign for OptimizationFlag {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

impl std::ops::BitAnd for OptimizationFlag {
    type Output = Self;
    #[inline]
    fn bitand(self, rhs: Self) -> Self { Self(self.0 & rhs.0) }
}

impl std::ops::Not for OptimizationFlag {
    type Output = Self;
    #[inline]
    fn not(self) -> Self { Self(!self.0) }
}

/// Configuration for creating a [`crate::MipsJit`].
pub struct JitConfig {
    /// Host callbacks for memory access, system calls, and tick counting.
    pub callbacks: Box<dyn JitCallbacks>,
    /// Host CPU features available to the code generator.
    pub capabilities: CpuCapabilities,
    /// Whether the tick budget from the callbacks bounds each `run()`.
    /// When false the loop only stops on a halt.
    pub enable_cycle_counting: bool,
    /// Code cache size in bytes.
    pub code_cache_size: usize,
    /// Which optimizations are enabled.
    pub optimizations: OptimizationFlag,
    /// Upper bound on guest instructions compiled into one block.
    pub max_block_instructions: usize,
    /// Stop following known branches and jumps once a block holds this many
    /// guest instructions.
    pub continue_max_instructions: usize,
}

impl JitConfig {
    /// Default code cache size: 16 MB.
    pub const DEFAULT_CODE_CACHE_SIZE: usize = 16 * 1024 * 1024;
    pub const DEFAULT_MAX_BLOCK_INSTRUCTIONS: usize = 64;
    pub const DEFAULT_CONTINUE_MAX_INSTRUCTIONS: usize = 48;
    /// Hard ceiling on the block instruction limit; keeps every block well
    /// inside the cache's reserved margin.
    pub const MAX_BLOCK_INSTRUCTIONS_LIMIT: usize = 256;

    pub fn new(callbacks: Box<dyn JitCallbacks>) -> Self {
        Self {
            callbacks,
            capabilities: CpuCapabilities::default(),
            enable_cycle_counting: true,
            code_cache_size: Self::DEFAULT_CODE_CACHE_SIZE,
            optimizations: OptimizationFlag::ALL_OPTIMIZATIONS,
            max_block_instructions: Self::DEFAULT_MAX_BLOCK_INSTRUCTIONS,
            continue_max_instructions: Self::DEFAULT_CONTINUE_MAX_INSTRUCTIONS,
        }
    }

    /// Check whether a specific optimization flag is active.
    pub fn has_optimization(&self, flag: OptimizationFlag) -> bool {
        (flag & self.optimizations) != OptimizationFlag::NO_OPTIMIZATIONS
    }

    pub fn validate(&self) -> Result<(), JitError> {
        use crate::backend::arm::block_of_code::MIN_SPACE_REMAINING;

        if self.max_block_instructions == 0
            || self.max_block_instructions > Self::MAX_BLOCK_INSTRUCTIONS_LIMIT
        {
            return Err(JitError::InvalidConfig(format!(
                "max_block_instructions must be in 1..={}, got {}",
                Self::MAX_BLOCK_INSTRUCTIONS_LIMIT,
                self.max_block_instructions
            )));
        }
        if self.code_cache_size < 2 * MIN_SPACE_REMAINING {
            return Err(JitError::InvalidConfig(format!(
                "code_cache_size must be at least {} bytes, got {}",
                2 * MIN_SPACE_REMAINING,
                self.code_cache_size
            )));
        }
        Ok(())
    }
}
