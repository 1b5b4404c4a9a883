use crate::backend::arm::emitter::ArmEmitter;
use crate::backend::arm::hostloc::{ArmReg, CALL_REG};

/// Base of the host-call thunk table. Each thunk is one word apart.
pub const HOST_CALL_BASE: u32 = 0xF000_0000;

/// Registers holding host-call arguments, in order.
pub const ARG_REGS: [ArmReg; 2] = [ArmReg::R0, ArmReg::R1];

/// Register holding a host-call result.
pub const RESULT_REG: ArmReg = ArmReg::R0;

/// A host function callable from generated code.
///
/// Generated code reaches these through `BLX` to a fixed thunk address; the
/// embedder side dispatches on the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HostCall {
    /// `r0 = read_8(r0)`
    ReadU8 = 0,
    ReadU16 = 1,
    ReadU32 = 2,
    /// `write_8(r0, r1)`
    WriteU8 = 3,
    WriteU16 = 4,
    WriteU32 = 5,
    /// Run the instruction word in `r0` at `ctx.pc`.
    Interpret = 6,
    /// Syscall with code in `r0`.
    Syscall = 7,
    /// Break with code in `r0`.
    Break = 8,
}

impl HostCall {
    const ALL: [HostCall; 9] = [
        HostCall::ReadU8,
        HostCall::ReadU16,
        HostCall::ReadU32,
        HostCall::WriteU8,
        HostCall::WriteU16,
        HostCall::WriteU32,
        HostCall::Interpret,
        HostCall::Syscall,
        HostCall::Break,
    ];

    /// Thunk address generated code branches to.
    pub const fn address(self) -> u32 {
        HOST_CALL_BASE + 4 * self as u32
    }

    /// Reverse of [`Self::address`].
    pub fn from_address(addr: u32) -> Option<Self> {
        let offset = addr.checked_sub(HOST_CALL_BASE)?;
        if offset % 4 != 0 {
            return None;
        }
        Self::ALL.get((offset / 4) as usize).copied()
    }

    /// Whether the call observes or changes the guest context, so every
    /// guest register has to be written back first.
    pub fn touches_context(self) -> bool {
        matches!(self, HostCall::Interpret | HostCall::Syscall | HostCall::Break)
    }

    /// Emit a call. `setup` receives the argument registers and places the
    /// arguments before the branch.
    pub fn emit_call(self, e: &mut ArmEmitter, setup: impl FnOnce(&mut ArmEmitter, &[ArmReg])) {
        setup(e, &ARG_REGS);
        e.materialize(CALL_REG, self.address());
        e.blx(CALL_REG);
    }

    /// Emit a call with no arguments to set up.
    pub fn emit_call_simple(self, e: &mut ArmEmitter) {
        self.emit_call(e, |_, _| {});
    }
}
