//! MIPS (PSP Allegrex) to ARM32 dynamic recompiler.
//!
//! Guest code is fetched through [`JitCallbacks`], translated one basic block
//! at a time by the architecture-agnostic driver in [`frontend::mips::translate`],
//! and emitted through the [`backend::Backend`] interface implemented by
//! [`backend::arm::ArmBackend`]. [`MipsJit`] owns the code cache and the
//! dispatcher loop.

pub mod backend;
pub mod error;
pub mod frontend;
pub mod halt_reason;
pub mod jit;
pub mod jit_config;

pub use error::{CompileError, ExecError, JitError};
pub use halt_reason::HaltReason;
pub use jit::{HaltHandle, MipsJit};
pub use jit_config::{CpuCapabilities, JitCallbacks, JitConfig, OptimizationFlag};
pub use backend::arm::jit_state::GuestContext;
