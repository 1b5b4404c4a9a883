use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::backend::arm::block_of_code::MIN_SPACE_REMAINING;
use crate::backend::arm::callback::HostCall;
use crate::backend::arm::executor::{Executor, HostCallHandler, RunExit};
use crate::backend::arm::jit_state::GuestContext;
use crate::backend::arm::{ArmBackend, BackendConfig};
use crate::error::{CompileError, JitError};
use crate::frontend::mips::translate::{translate_block, TranslateOptions};
use crate::frontend::mips::types::MipsReg;
use crate::halt_reason::HaltReason;
use crate::jit_config::{JitCallbacks, JitConfig};

/// Requests a halt from another thread.
///
/// The running loop notices the request the next time control returns to
/// the dispatcher, or at the next block entry once the executor yields.
#[derive(Debug, Clone)]
pub struct HaltHandle(Arc<AtomicU32>);

impl HaltHandle {
    pub fn halt(&self, reason: HaltReason) {
        self.0.fetch_or(reason.bits(), Ordering::Release);
    }
}

/// Public MIPS JIT.
///
/// Create one per guest CPU, set the registers and PC, then call
/// [`Self::run`] once per time slice.
pub struct MipsJit {
    ctx: GuestContext,
    backend: ArmBackend,
    executor: Executor,
    callbacks: Box<dyn JitCallbacks>,
    opts: TranslateOptions,
    enable_cycle_counting: bool,
    halt: Arc<AtomicU32>,
}

/// Routes host calls from generated code to the embedder's callbacks.
struct HostBridge<'a> {
    callbacks: &'a mut dyn JitCallbacks,
    halt: HaltReason,
}

impl HostCallHandler for HostBridge<'_> {
    fn host_call(&mut self, call: HostCall, ctx: &mut GuestContext, [a, b]: [u32; 2]) -> u32 {
        let cb = &mut *self.callbacks;
        match call {
            HostCall::ReadU8 => cb.read_8(a) as u32,
            HostCall::ReadU16 => cb.read_16(a) as u32,
            HostCall::ReadU32 => cb.read_32(a),
            HostCall::WriteU8 => {
                cb.write_8(a, b as u8);
                0
            }
            HostCall::WriteU16 => {
                cb.write_16(a, b as u16);
                0
            }
            HostCall::WriteU32 => {
                cb.write_32(a, b);
                0
            }
            HostCall::Interpret => {
                cb.interpret_instruction(ctx, a);
                0
            }
            HostCall::Syscall => {
                if cb.call_syscall(ctx, a) {
                    self.halt |= HaltReason::SYSCALL;
                }
                0
            }
            HostCall::Break => {
                debug!(pc = format_args!("{:#010x}", ctx.pc), code = a, "break");
                self.halt |= HaltReason::BREAKPOINT;
                0
            }
        }
    }
}

impl MipsJit {
    pub fn new(config: JitConfig) -> Result<Self, JitError> {
        config.validate()?;
        let backend = ArmBackend::new(BackendConfig::from(&config));
        let opts = TranslateOptions::from(&config);
        Ok(Self {
            ctx: GuestContext::new(),
            backend,
            executor: Executor::new(),
            enable_cycle_counting: config.enable_cycle_counting,
            callbacks: config.callbacks,
            opts,
            halt: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Run guest code from the current PC.
    ///
    /// Stops when the tick budget from [`JitCallbacks::ticks_remaining`] is
    /// spent, or on a halt. An empty result means the budget ran out. With
    /// cycle counting disabled only a halt stops the loop.
    pub fn run(&mut self) -> Result<HaltReason, JitError> {
        let budget = if self.enable_cycle_counting {
            self.callbacks.ticks_remaining().min(i32::MAX as u64) as i32
        } else {
            i32::MAX
        };
        self.ctx.downcount = budget;

        let mut halt = take_halt(&self.halt);
        while halt.is_empty() && self.ctx.downcount > 0 {
            let pc = self.ctx.pc;
            let Some(entry) = self.backend.entry_for(pc) else {
                self.compile(pc)?;
                continue;
            };
            let backend = &self.backend;
            let safe_points = |offset: usize| backend.block_at_checked_entry(offset);
            let mut bridge = HostBridge { callbacks: self.callbacks.as_mut(), halt: HaltReason::empty() };
            let mut exit =
                self.executor.run(backend.code(), backend.labels().run_code, entry, &mut self.ctx, &mut bridge, &safe_points)?;
            // A linked chain only comes back by itself when the budget runs
            // out; poll for halt requests whenever the executor yields.
            while let RunExit::Yielded(block_pc) = exit {
                halt = take_halt(&self.halt);
                if !halt.is_empty() {
                    self.ctx.pc = block_pc;
                    debug!(pc = format_args!("{block_pc:#010x}"), ?halt, "halted inside linked code");
                    break;
                }
                exit = self.executor.resume(backend.code(), &mut self.ctx, &mut bridge, &safe_points)?;
            }
            halt |= bridge.halt | take_halt(&self.halt);
        }

        if self.enable_cycle_counting {
            let used = (budget as i64 - self.ctx.downcount as i64).max(0) as u64;
            self.callbacks.add_ticks(used);
        }
        Ok(halt)
    }

    /// Compile the block at `pc`, clearing the cache first if it is nearly
    /// full, and once more if the block overflows it anyway.
    fn compile(&mut self, pc: u32) -> Result<(), JitError> {
        if self.backend.space_remaining() < MIN_SPACE_REMAINING {
            self.backend.clear_cache();
        }
        let callbacks = &self.callbacks;
        let fetch = |addr: u32| callbacks.read_code(addr);
        let mut result = translate_block(&mut self.backend, &fetch, pc, &self.opts);
        if let Err(CompileError::CodeBufferFull { .. }) = result {
            info!(pc = format_args!("{pc:#010x}"), "code cache full, clearing and retrying");
            self.backend.clear_cache();
            result = translate_block(&mut self.backend, &fetch, pc, &self.opts);
        }
        match result {
            Ok(summary) => {
                debug!(
                    pc = format_args!("{pc:#010x}"),
                    instructions = summary.instructions,
                    cycles = summary.cycles,
                    "translated block"
                );
                Ok(())
            }
            Err(source) => {
                error!(pc = format_args!("{pc:#010x}"), %source, "block compilation failed");
                Err(JitError::Compile { pc, source })
            }
        }
    }

    // ---- Halting ----

    /// Request a halt; the current or next [`Self::run`] returns `reason`.
    pub fn halt_execution(&self, reason: HaltReason) {
        self.halt.fetch_or(reason.bits(), Ordering::Release);
    }

    /// Withdraw a pending halt request.
    pub fn clear_halt(&self, reason: HaltReason) {
        self.halt.fetch_and(!reason.bits(), Ordering::Release);
    }

    pub fn halt_handle(&self) -> HaltHandle {
        HaltHandle(Arc::clone(&self.halt))
    }

    // ---- Guest state ----

    pub fn register(&self, reg: MipsReg) -> u32 {
        self.ctx.reg(reg)
    }

    /// Writes to `zero` are ignored.
    pub fn set_register(&mut self, reg: MipsReg, value: u32) {
        self.ctx.set_reg(reg, value);
    }

    pub fn pc(&self) -> u32 {
        self.ctx.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.ctx.pc = pc;
    }

    pub fn context(&self) -> &GuestContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut GuestContext {
        &mut self.ctx
    }

    // ---- Code cache ----

    /// Drop compiled code overlapping `[addr, addr + size)`.
    pub fn invalidate_cache_range(&mut self, addr: u32, size: u32) {
        self.backend.invalidate_range(addr, size);
    }

    pub fn clear_cache(&mut self) {
        self.backend.clear_cache();
    }

    pub fn block_count(&self) -> usize {
        self.backend.block_count()
    }

    /// Native code compiled for the block at `pc`.
    pub fn block_code(&self, pc: u32) -> Option<&[u8]> {
        self.backend.block_code(pc)
    }
}

fn take_halt(halt: &AtomicU32) -> HaltReason {
    HaltReason::from_bits_truncate(halt.swap(0, Ordering::Acquire))
}
