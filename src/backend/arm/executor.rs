//! Interpreter for the A32 subset the code generator emits.
//!
//! Generated code is run here rather than natively, so the JIT behaves the
//! same on every host. The executor sees a small flat address space:
//!
//! | Region            | Contents                                  |
//! |-------------------|-------------------------------------------|
//! | [`CODE_BASE`]     | the code buffer (read-only)               |
//! | [`CTX_BASE`]      | the [`GuestContext`]                      |
//! | [`STACK_BASE`]    | a private stack                           |
//! | [`HOST_CALL_BASE`]| host-call thunks, one word each           |
//! | [`RETURN_SENTINEL`] | returning here ends the run             |
//!
//! A run that goes on for more than the yield interval hands control back
//! at the next block checked entry. All guest registers are in the context
//! at that point, so the caller may either stop there or [`Executor::resume`].

use tracing::trace;

use crate::backend::arm::callback::{HostCall, HOST_CALL_BASE};
use crate::backend::arm::emitter::{Cond, DpOp, ShiftType};
use crate::backend::arm::jit_state::GuestContext;
use crate::error::ExecError;

pub const CODE_BASE: u32 = 0x1000_0000;
pub const CTX_BASE: u32 = 0x2000_0000;
pub const STACK_BASE: u32 = 0x3000_0000;
pub const STACK_SIZE: usize = 64 * 1024;
pub const RETURN_SENTINEL: u32 = 0xFFFF_FFF0;

/// Host instructions executed before the run looks for a place to yield.
pub const DEFAULT_YIELD_INTERVAL: u64 = 100_000;

/// Value written to registers a host call is allowed to clobber.
const CLOBBERED: u32 = 0xDEAD_C0DE;

const SP: usize = 13;
const LR: usize = 14;
const PC: usize = 15;

/// Receives host calls made by generated code.
pub trait HostCallHandler {
    /// Perform `call` with the argument registers `r0`/`r1`. The return
    /// value is placed in `r0`.
    fn host_call(&mut self, call: HostCall, ctx: &mut GuestContext, args: [u32; 2]) -> u32;
}

/// Maps a code offset to the guest address of the block whose checked
/// entry sits there.
pub type SafePoints<'a> = &'a dyn Fn(usize) -> Option<u32>;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The dispatcher returned.
    Returned,
    /// Stopped before entering the block at this guest address.
    Yielded(u32),
}

/// Result of evaluating a shifter operand.
struct Shifted {
    value: u32,
    carry: bool,
}

/// A32 register file and flags.
pub struct Executor {
    regs: [u32; 16],
    n: bool,
    z: bool,
    c: bool,
    v: bool,
    stack: Vec<u8>,
    yield_interval: u64,
    steps: u64,
}

impl Executor {
    pub fn new() -> Self {
        Self::with_yield_interval(DEFAULT_YIELD_INTERVAL)
    }

    pub fn with_yield_interval(yield_interval: u64) -> Self {
        Self {
            regs: [0; 16],
            n: false,
            z: false,
            c: false,
            v: false,
            stack: vec![0; STACK_SIZE],
            yield_interval,
            steps: 0,
        }
    }

    /// Host instructions executed since the last [`Self::run`].
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Call the dispatcher at `run_code` with the context pointer and
    /// `entry` as arguments, and run until it returns or yields.
    pub fn run(
        &mut self,
        code: &[u8],
        run_code: usize,
        entry: usize,
        ctx: &mut GuestContext,
        handler: &mut dyn HostCallHandler,
        safe_points: SafePoints<'_>,
    ) -> Result<RunExit, ExecError> {
        for (i, r) in self.regs.iter_mut().enumerate() {
            *r = 0xBAD0_0000 | i as u32;
        }
        self.regs[0] = CTX_BASE;
        self.regs[1] = CODE_BASE + entry as u32;
        self.regs[SP] = STACK_BASE + STACK_SIZE as u32;
        self.regs[LR] = RETURN_SENTINEL;
        self.regs[PC] = CODE_BASE + run_code as u32;
        self.steps = 0;
        self.resume(code, ctx, handler, safe_points)
    }

    /// Continue a run that yielded. The code buffer must not have changed
    /// in between.
    pub fn resume(
        &mut self,
        code: &[u8],
        ctx: &mut GuestContext,
        handler: &mut dyn HostCallHandler,
        safe_points: SafePoints<'_>,
    ) -> Result<RunExit, ExecError> {
        let mut slice = 0u64;
        loop {
            let pc = self.regs[PC];
            if pc == RETURN_SENTINEL {
                return Ok(RunExit::Returned);
            }
            if slice >= self.yield_interval {
                if let Some(guest_pc) = pc.checked_sub(CODE_BASE).and_then(|at| safe_points(at as usize)) {
                    trace!(steps = self.steps, guest_pc = format_args!("{guest_pc:#010x}"), "yield");
                    return Ok(RunExit::Yielded(guest_pc));
                }
            }
            slice += 1;
            self.steps += 1;
            if let Some(call) = HostCall::from_address(pc) {
                self.host_call(call, ctx, handler);
                continue;
            }
            let word = self.fetch(code, pc)?;
            self.step(code, ctx, pc, word)?;
        }
    }

    fn host_call(&mut self, call: HostCall, ctx: &mut GuestContext, handler: &mut dyn HostCallHandler) {
        let args = [self.regs[0], self.regs[1]];
        trace!(?call, r0 = args[0], r1 = args[1], "host call");
        self.regs[0] = handler.host_call(call, ctx, args);
        for r in [1, 2, 3, 12] {
            self.regs[r] = CLOBBERED;
        }
        // Flags do not survive a call either.
        self.n = !self.n;
        self.z = !self.z;
        self.c = !self.c;
        self.v = !self.v;
        self.regs[PC] = self.regs[LR];
    }

    fn fetch(&self, code: &[u8], pc: u32) -> Result<u32, ExecError> {
        let fault = ExecError::MemoryFault { pc, addr: pc };
        let offset = pc.checked_sub(CODE_BASE).ok_or_else(|| fault.clone())? as usize;
        match code.get(offset..offset + 4) {
            Some(b) if pc % 4 == 0 => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            _ => Err(fault),
        }
    }

    // ---- Memory ----

    fn read32(&self, code: &[u8], ctx: &GuestContext, addr: u32) -> Result<u32, ExecError> {
        let pc = self.regs[PC];
        let fault = ExecError::MemoryFault { pc, addr };
        if addr % 4 != 0 {
            return Err(fault);
        }
        let bytes: &[u8] = if addr >= STACK_BASE && addr < STACK_BASE + STACK_SIZE as u32 {
            &self.stack[(addr - STACK_BASE) as usize..]
        } else if addr >= CTX_BASE && addr - CTX_BASE < ctx.as_bytes().len() as u32 {
            &ctx.as_bytes()[(addr - CTX_BASE) as usize..]
        } else if addr >= CODE_BASE && addr - CODE_BASE < code.len() as u32 {
            &code[(addr - CODE_BASE) as usize..]
        } else {
            return Err(fault);
        };
        match bytes.get(..4) {
            Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            None => Err(fault),
        }
    }

    fn write32(&mut self, ctx: &mut GuestContext, addr: u32, value: u32) -> Result<(), ExecError> {
        let pc = self.regs[PC];
        let fault = ExecError::MemoryFault { pc, addr };
        if addr % 4 != 0 {
            return Err(fault);
        }
        let bytes: &mut [u8] = if addr >= STACK_BASE && addr < STACK_BASE + STACK_SIZE as u32 {
            &mut self.stack[(addr - STACK_BASE) as usize..]
        } else if addr >= CTX_BASE && addr - CTX_BASE < ctx.as_bytes().len() as u32 {
            &mut ctx.as_bytes_mut()[(addr - CTX_BASE) as usize..]
        } else {
            return Err(fault);
        };
        match bytes.get_mut(..4) {
            Some(b) => {
                b.copy_from_slice(&value.to_le_bytes());
                Ok(())
            }
            None => Err(fault),
        }
    }

    // ---- Registers and flags ----

    /// Register read as an operand: the PC reads eight bytes ahead.
    fn reg(&self, r: u32) -> u32 {
        let r = (r & 0xF) as usize;
        if r == PC { self.regs[PC].wrapping_add(8) } else { self.regs[r] }
    }

    fn set_nz(&mut self, value: u32) {
        self.n = value >> 31 != 0;
        self.z = value == 0;
    }

    fn cond_passed(&self, cond: Cond) -> bool {
        match cond {
            Cond::Eq => self.z,
            Cond::Ne => !self.z,
            Cond::Cs => self.c,
            Cond::Cc => !self.c,
            Cond::Mi => self.n,
            Cond::Pl => !self.n,
            Cond::Vs => self.v,
            Cond::Vc => !self.v,
            Cond::Hi => self.c && !self.z,
            Cond::Ls => !self.c || self.z,
            Cond::Ge => self.n == self.v,
            Cond::Lt => self.n != self.v,
            Cond::Gt => !self.z && self.n == self.v,
            Cond::Le => self.z || self.n != self.v,
            Cond::Al => true,
        }
    }

    fn flags_word(&self) -> u32 {
        ((self.n as u32) << 31) | ((self.z as u32) << 30) | ((self.c as u32) << 29) | ((self.v as u32) << 28)
    }

    fn set_flags_word(&mut self, value: u32) {
        self.n = value & (1 << 31) != 0;
        self.z = value & (1 << 30) != 0;
        self.c = value & (1 << 29) != 0;
        self.v = value & (1 << 28) != 0;
    }

    // ---- Decode and execute ----

    fn step(&mut self, code: &[u8], ctx: &mut GuestContext, pc: u32, w: u32) -> Result<(), ExecError> {
        let undefined = ExecError::UndefinedInstruction { pc, word: w };
        if w & 0x0FFF_FFFF == 0x0AFF_FFFE {
            return Err(ExecError::UnresolvedFixup(pc));
        }
        let cond = Cond::from_bits(w >> 28).ok_or_else(|| undefined.clone())?;
        let next = pc.wrapping_add(4);
        if !self.cond_passed(cond) {
            self.regs[PC] = next;
            return Ok(());
        }

        let rd = ((w >> 12) & 0xF) as usize;
        let rm = w & 0xF;

        if w & 0x0FFF_FFD0 == 0x012F_FF10 {
            // BX / BLX
            let target = self.reg(rm);
            if w & 0x20 != 0 {
                self.regs[LR] = next;
            }
            self.regs[PC] = target;
            return Ok(());
        }
        if w & 0x0FFF_0FF0 == 0x016F_0F10 {
            self.regs[rd] = self.reg(rm).leading_zeros();
        } else if w & 0x0FFF_0FFF == 0x010F_0000 {
            self.regs[rd] = self.flags_word();
        } else if w & 0x0FFF_FFF0 == 0x0128_F000 {
            let value = self.reg(rm);
            self.set_flags_word(value);
        } else if w & 0x0F00_00F0 == 0x0000_0090 {
            self.multiply(w)?;
        } else if w & 0x0E00_0010 == 0x0600_0010 {
            self.media(w, undefined)?;
        } else if w & 0x0FB0_0000 == 0x0300_0000 {
            // MOVW / MOVT
            let imm16 = ((w >> 4) & 0xF000) | (w & 0xFFF);
            self.regs[rd] = if w & 0x0040_0000 != 0 {
                (self.regs[rd] & 0xFFFF) | (imm16 << 16)
            } else {
                imm16
            };
        } else if w & 0x0C00_0000 == 0 {
            return self.data_processing(w, next, undefined);
        } else if w & 0x0E00_0000 == 0x0400_0000 {
            self.single_transfer(code, ctx, w, undefined)?;
        } else if w & 0x0E00_0000 == 0x0800_0000 {
            return self.block_transfer(code, ctx, w, next);
        } else if w & 0x0E00_0000 == 0x0A00_0000 {
            let offset = (((w & 0x00FF_FFFF) << 8) as i32 >> 6) as u32;
            if w & (1 << 24) != 0 {
                self.regs[LR] = next;
            }
            self.regs[PC] = pc.wrapping_add(8).wrapping_add(offset);
            return Ok(());
        } else {
            return Err(undefined);
        }
        self.regs[PC] = next;
        Ok(())
    }

    fn multiply(&mut self, w: u32) -> Result<(), ExecError> {
        let hi = ((w >> 16) & 0xF) as usize;
        let lo = ((w >> 12) & 0xF) as usize;
        let rs = self.reg(w >> 8);
        let rm = self.reg(w);
        let set_flags = w & (1 << 20) != 0;
        match (w >> 21) & 0x7 {
            0 | 1 => {
                let acc = if w & (1 << 21) != 0 { self.regs[lo] } else { 0 };
                let result = rm.wrapping_mul(rs).wrapping_add(acc);
                self.regs[hi] = result;
                if set_flags {
                    self.set_nz(result);
                }
            }
            op @ 4..=7 => {
                let product = if op >= 6 {
                    (rm as i32 as i64).wrapping_mul(rs as i32 as i64) as u64
                } else {
                    rm as u64 * rs as u64
                };
                let acc = if op & 1 != 0 { ((self.regs[hi] as u64) << 32) | self.regs[lo] as u64 } else { 0 };
                let result = product.wrapping_add(acc);
                self.regs[lo] = result as u32;
                self.regs[hi] = (result >> 32) as u32;
                if set_flags {
                    self.n = result >> 63 != 0;
                    self.z = result == 0;
                }
            }
            _ => {
                return Err(ExecError::UndefinedInstruction { pc: self.regs[PC], word: w });
            }
        }
        Ok(())
    }

    fn media(&mut self, w: u32, undefined: ExecError) -> Result<(), ExecError> {
        let rd = ((w >> 12) & 0xF) as usize;
        let rm = self.reg(w);
        if w & 0x0FD0_F0F0 == 0x0710_F010 {
            // SDIV / UDIV: rd in 19:16, rm in 11:8, rn in 3:0
            let dst = ((w >> 16) & 0xF) as usize;
            let divisor = self.reg(w >> 8);
            let dividend = rm;
            self.regs[dst] = match (w & 0x0020_0000 != 0, divisor) {
                (_, 0) => 0,
                (true, d) => dividend / d,
                (false, d) => (dividend as i32).wrapping_div(d as i32) as u32,
            };
            return Ok(());
        }
        let lsb = (w >> 7) & 0x1F;
        let field = (w >> 16) & 0x1F;
        match w & 0x0FE0_0070 {
            0x07E0_0050 => {
                let width = field + 1;
                let rn = self.reg(w);
                self.regs[rd] = (rn >> lsb) & mask(width);
                return Ok(());
            }
            0x07C0_0010 => {
                if field < lsb {
                    return Err(undefined);
                }
                let width = field - lsb + 1;
                let src = if w & 0xF == 0xF { 0 } else { self.reg(w) };
                let m = mask(width) << lsb;
                self.regs[rd] = (self.regs[rd] & !m) | ((src << lsb) & m);
                return Ok(());
            }
            _ => {}
        }
        let rotation = ((w >> 10) & 0x3) * 8;
        self.regs[rd] = match w & 0x0FFF_0FF0 {
            0x06BF_0F30 => rm.swap_bytes(),
            0x06BF_0FB0 => ((rm & 0x00FF_00FF) << 8) | ((rm >> 8) & 0x00FF_00FF),
            0x06FF_0F30 => rm.reverse_bits(),
            _ => match w & 0x0FFF_03F0 {
                0x06AF_0070 => rm.rotate_right(rotation) as u8 as i8 as i32 as u32,
                0x06BF_0070 => rm.rotate_right(rotation) as u16 as i16 as i32 as u32,
                _ => return Err(undefined),
            },
        };
        Ok(())
    }

    fn shifter_operand(&self, w: u32) -> Shifted {
        if w & (1 << 25) != 0 {
            let rotate = ((w >> 8) & 0xF) * 2;
            let value = (w & 0xFF).rotate_right(rotate);
            let carry = if rotate == 0 { self.c } else { value >> 31 != 0 };
            return Shifted { value, carry };
        }
        let rm = self.reg(w);
        let ty = ShiftType::from_bits(w >> 5);
        if w & (1 << 4) == 0 {
            let amount = (w >> 7) & 0x1F;
            return match (ty, amount) {
                (ShiftType::Lsl, 0) => Shifted { value: rm, carry: self.c },
                (ShiftType::Lsl, n) => Shifted { value: rm << n, carry: (rm >> (32 - n)) & 1 != 0 },
                (ShiftType::Lsr, 0) => Shifted { value: 0, carry: rm >> 31 != 0 },
                (ShiftType::Lsr, n) => Shifted { value: rm >> n, carry: (rm >> (n - 1)) & 1 != 0 },
                (ShiftType::Asr, 0) => Shifted { value: ((rm as i32) >> 31) as u32, carry: rm >> 31 != 0 },
                (ShiftType::Asr, n) => Shifted { value: ((rm as i32) >> n) as u32, carry: (rm >> (n - 1)) & 1 != 0 },
                (ShiftType::Ror, 0) => Shifted { value: ((self.c as u32) << 31) | (rm >> 1), carry: rm & 1 != 0 },
                (ShiftType::Ror, n) => Shifted { value: rm.rotate_right(n), carry: (rm >> (n - 1)) & 1 != 0 },
            };
        }
        let amount = self.reg(w >> 8) & 0xFF;
        if amount == 0 {
            return Shifted { value: rm, carry: self.c };
        }
        match ty {
            ShiftType::Lsl => match amount {
                1..=31 => Shifted { value: rm << amount, carry: (rm >> (32 - amount)) & 1 != 0 },
                32 => Shifted { value: 0, carry: rm & 1 != 0 },
                _ => Shifted { value: 0, carry: false },
            },
            ShiftType::Lsr => match amount {
                1..=31 => Shifted { value: rm >> amount, carry: (rm >> (amount - 1)) & 1 != 0 },
                32 => Shifted { value: 0, carry: rm >> 31 != 0 },
                _ => Shifted { value: 0, carry: false },
            },
            ShiftType::Asr => match amount {
                1..=31 => Shifted { value: ((rm as i32) >> amount) as u32, carry: (rm >> (amount - 1)) & 1 != 0 },
                _ => Shifted { value: ((rm as i32) >> 31) as u32, carry: rm >> 31 != 0 },
            },
            ShiftType::Ror => match amount & 0x1F {
                0 => Shifted { value: rm, carry: rm >> 31 != 0 },
                n => Shifted { value: rm.rotate_right(n), carry: (rm >> (n - 1)) & 1 != 0 },
            },
        }
    }

    fn data_processing(&mut self, w: u32, next: u32, undefined: ExecError) -> Result<(), ExecError> {
        // Extra load/store and multiply space is not data processing.
        if w & (1 << 25) == 0 && w & 0x90 == 0x90 {
            return Err(undefined);
        }
        let op = DpOp::from_bits(w >> 21);
        let set_flags = w & (1 << 20) != 0;
        if op.is_test() && !set_flags {
            return Err(undefined);
        }
        let rd = ((w >> 12) & 0xF) as usize;
        let rn = self.reg(w >> 16);
        let Shifted { value: op2, carry: shifter_carry } = self.shifter_operand(w);

        let (result, carry, overflow) = match op {
            DpOp::And | DpOp::Tst => (rn & op2, shifter_carry, self.v),
            DpOp::Eor | DpOp::Teq => (rn ^ op2, shifter_carry, self.v),
            DpOp::Orr => (rn | op2, shifter_carry, self.v),
            DpOp::Bic => (rn & !op2, shifter_carry, self.v),
            DpOp::Mov => (op2, shifter_carry, self.v),
            DpOp::Mvn => (!op2, shifter_carry, self.v),
            DpOp::Add | DpOp::Cmn => add_with_carry(rn, op2, false),
            DpOp::Adc => add_with_carry(rn, op2, self.c),
            DpOp::Sub | DpOp::Cmp => add_with_carry(rn, !op2, true),
            DpOp::Sbc => add_with_carry(rn, !op2, self.c),
            DpOp::Rsb => add_with_carry(op2, !rn, true),
            DpOp::Rsc => add_with_carry(op2, !rn, self.c),
        };

        if set_flags {
            if rd == PC && !op.is_test() {
                return Err(undefined);
            }
            self.set_nz(result);
            self.c = carry;
            self.v = overflow;
        }
        if op.is_test() {
            self.regs[PC] = next;
        } else {
            self.regs[rd] = result;
            if rd != PC {
                self.regs[PC] = next;
            }
        }
        Ok(())
    }

    fn single_transfer(&mut self, code: &[u8], ctx: &mut GuestContext, w: u32, undefined: ExecError) -> Result<(), ExecError> {
        // Only the immediate-offset word form without writeback is emitted.
        let pre_indexed = w & (1 << 24) != 0;
        let byte = w & (1 << 22) != 0;
        let writeback = w & (1 << 21) != 0;
        if w & (1 << 25) != 0 || !pre_indexed || byte || writeback {
            return Err(undefined);
        }
        let base = self.reg(w >> 16);
        let offset = w & 0xFFF;
        let addr = if w & (1 << 23) != 0 { base.wrapping_add(offset) } else { base.wrapping_sub(offset) };
        let rt = ((w >> 12) & 0xF) as usize;
        if w & (1 << 20) != 0 {
            if rt == PC {
                return Err(undefined);
            }
            self.regs[rt] = self.read32(code, ctx, addr)?;
        } else {
            let value = self.reg(rt as u32);
            self.write32(ctx, addr, value)?;
        }
        Ok(())
    }

    fn block_transfer(&mut self, code: &[u8], ctx: &mut GuestContext, w: u32, next: u32) -> Result<(), ExecError> {
        let list = w & 0xFFFF;
        let count = list.count_ones();
        let rn = ((w >> 16) & 0xF) as usize;
        let base = self.regs[rn];
        let before = w & (1 << 24) != 0;
        let up = w & (1 << 23) != 0;
        let load = w & (1 << 20) != 0;
        let lowest = match (up, before) {
            (true, false) => base,
            (true, true) => base.wrapping_add(4),
            (false, false) => base.wrapping_sub(4 * count).wrapping_add(4),
            (false, true) => base.wrapping_sub(4 * count),
        };
        let mut addr = lowest;
        let mut new_pc = next;
        for r in (0..16).filter(|r| list & (1 << r) != 0) {
            if load {
                let value = self.read32(code, ctx, addr)?;
                if r == PC {
                    new_pc = value;
                } else {
                    self.regs[r] = value;
                }
            } else {
                let value = self.reg(r as u32);
                self.write32(ctx, addr, value)?;
            }
            addr = addr.wrapping_add(4);
        }
        if w & (1 << 21) != 0 {
            self.regs[rn] = if up { base.wrapping_add(4 * count) } else { base.wrapping_sub(4 * count) };
        }
        self.regs[PC] = new_pc;
        Ok(())
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

fn mask(width: u32) -> u32 {
    if width >= 32 { u32::MAX } else { (1 << width) - 1 }
}

/// `x + y + carry_in`, returning the result, carry out and signed overflow.
fn add_with_carry(x: u32, y: u32, carry_in: bool) -> (u32, bool, bool) {
    let unsigned_sum = x as u64 + y as u64 + carry_in as u64;
    let signed_sum = x as i32 as i64 + y as i32 as i64 + carry_in as i64;
    let result = unsigned_sum as u32;
    (result, unsigned_sum >> 32 != 0, result as i32 as i64 != signed_sum)
}
