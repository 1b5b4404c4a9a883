use thiserror::Error;

/// Fatal conditions raised while compiling a block.
///
/// None of these depend on guest program data; each one means an invariant
/// of the code generator was violated. The compile pass that hits one is
/// abandoned and the error is logged and surfaced from [`crate::MipsJit::run`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("branch at code offset {from:#x} cannot reach {to:#x}")]
    BranchOutOfRange { from: usize, to: usize },

    #[error("literal load at code offset {load:#x} cannot reach pool slot {slot:#x}")]
    LiteralOutOfRange { load: usize, slot: usize },

    #[error("ran out of host registers")]
    OutOfRegisters,

    #[error("{0} branch fixup(s) left unresolved at block end")]
    UnresolvedFixups(usize),

    #[error("guest register {0} still locked at an instruction boundary")]
    UnbalancedLock(u8),

    #[error("code buffer exhausted ({used} of {capacity} bytes)")]
    CodeBufferFull { used: usize, capacity: usize },

    #[error("cannot fetch guest instruction at {0:#010x}")]
    InstructionFetch(u32),
}

/// Faults raised by the generated-code executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("undefined host instruction {word:#010x} at {pc:#010x}")]
    UndefinedInstruction { pc: u32, word: u32 },

    #[error("unresolved branch placeholder executed at {0:#010x}")]
    UnresolvedFixup(u32),

    #[error("host memory fault at {addr:#010x} (pc {pc:#010x})")]
    MemoryFault { pc: u32, addr: u32 },
}

/// Errors surfaced by the public [`crate::MipsJit`] API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("compilation of block at {pc:#010x} failed: {source}")]
    Compile {
        pc: u32,
        #[source]
        source: CompileError,
    },

    #[error(transparent)]
    Execution(#[from] ExecError),
}
