//! Shared helpers for the integration tests: an assembler, a guest machine
//! behind the JIT callbacks, and a reference MIPS interpreter used both as
//! the interpreter fallback and as the oracle for differential tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use rmipsjit::{GuestContext, HaltReason, JitCallbacks, JitConfig, MipsJit};

/// Where test programs are loaded.
pub const BASE: u32 = 0x0880_0000;
/// Scratch data area inside the guest window.
pub const DATA: u32 = 0x0881_0000;
/// Size of the guest window starting at [`BASE`].
pub const MEM_SIZE: usize = 0x2_0000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ---------------------------------------------------------------------------
// Guest machine
// ---------------------------------------------------------------------------

pub struct Machine {
    pub mem: Vec<u8>,
    /// `(code, pc)` of every syscall, `pc` already past the instruction.
    pub syscalls: Vec<(u32, u32)>,
    /// `(pc, opcode)` of every instruction handed to the interpreter.
    pub interpreted: Vec<(u32, u32)>,
    pub halt_on_syscall: bool,
    pub ticks_remaining: u64,
    pub ticks_added: u64,
    /// Condition bit tested by BC1F/BC1T.
    pub fpu_cond: bool,
}

impl Machine {
    pub fn new(program: &[u32]) -> Self {
        let mut m = Self {
            mem: vec![0; MEM_SIZE],
            syscalls: Vec::new(),
            interpreted: Vec::new(),
            halt_on_syscall: true,
            ticks_remaining: 1_000_000,
            ticks_added: 0,
            fpu_cond: false,
        };
        m.load(BASE, program);
        m
    }

    fn offset(addr: u32) -> Option<usize> {
        let off = addr.wrapping_sub(BASE) as usize;
        (off < MEM_SIZE).then_some(off)
    }

    pub fn load(&mut self, at: u32, words: &[u32]) {
        for (i, &w) in words.iter().enumerate() {
            self.write32(at + 4 * i as u32, w);
        }
    }

    pub fn read8(&self, addr: u32) -> u8 {
        Self::offset(addr).map_or(0, |o| self.mem[o])
    }

    pub fn write8(&mut self, addr: u32, value: u8) {
        if let Some(o) = Self::offset(addr) {
            self.mem[o] = value;
        }
    }

    pub fn read16(&self, addr: u32) -> u16 {
        u16::from_le_bytes([self.read8(addr), self.read8(addr.wrapping_add(1))])
    }

    pub fn write16(&mut self, addr: u32, value: u16) {
        let [a, b] = value.to_le_bytes();
        self.write8(addr, a);
        self.write8(addr.wrapping_add(1), b);
    }

    pub fn read32(&self, addr: u32) -> u32 {
        u32::from(self.read16(addr)) | u32::from(self.read16(addr.wrapping_add(2))) << 16
    }

    pub fn write32(&mut self, addr: u32, value: u32) {
        self.write16(addr, value as u16);
        self.write16(addr.wrapping_add(2), (value >> 16) as u16);
    }
}

/// The JIT's view of a [`Machine`], shared with the test body.
pub struct TestCallbacks(pub Arc<Mutex<Machine>>);

impl TestCallbacks {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.0.lock().unwrap()
    }
}

impl JitCallbacks for TestCallbacks {
    fn read_code(&self, vaddr: u32) -> Option<u32> {
        Machine::offset(vaddr).map(|_| self.machine().read32(vaddr))
    }

    fn read_8(&self, vaddr: u32) -> u8 {
        self.machine().read8(vaddr)
    }
    fn read_16(&self, vaddr: u32) -> u16 {
        self.machine().read16(vaddr)
    }
    fn read_32(&self, vaddr: u32) -> u32 {
        self.machine().read32(vaddr)
    }
    fn write_8(&mut self, vaddr: u32, value: u8) {
        self.machine().write8(vaddr, value)
    }
    fn write_16(&mut self, vaddr: u32, value: u16) {
        self.machine().write16(vaddr, value)
    }
    fn write_32(&mut self, vaddr: u32, value: u32) {
        self.machine().write32(vaddr, value)
    }

    fn interpret_instruction(&mut self, ctx: &mut GuestContext, opcode: u32) {
        let mut m = self.machine();
        m.interpreted.push((ctx.pc, opcode));
        reference::interpret(ctx, &mut m, opcode);
    }

    fn call_syscall(&mut self, ctx: &mut GuestContext, code: u32) -> bool {
        let mut m = self.machine();
        m.syscalls.push((code, ctx.pc));
        m.halt_on_syscall
    }

    fn add_ticks(&mut self, ticks: u64) {
        let mut m = self.machine();
        m.ticks_added += ticks;
        m.ticks_remaining = m.ticks_remaining.saturating_sub(ticks);
    }

    fn ticks_remaining(&self) -> u64 {
        self.machine().ticks_remaining
    }
}

pub struct Harness {
    pub jit: MipsJit,
    pub machine: Arc<Mutex<Machine>>,
}

impl Harness {
    pub fn new(program: &[u32], configure: impl FnOnce(&mut JitConfig)) -> Self {
        init_tracing();
        let machine = Arc::new(Mutex::new(Machine::new(program)));
        let mut config = JitConfig::new(Box::new(TestCallbacks(Arc::clone(&machine))));
        config.code_cache_size = 1024 * 1024;
        configure(&mut config);
        let mut jit = MipsJit::new(config).unwrap();
        jit.set_pc(BASE);
        Self { jit, machine }
    }

    pub fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap()
    }

    /// Run until a halt, failing on a budget expiry.
    pub fn run_to_halt(&mut self) -> HaltReason {
        let halt = self.jit.run().unwrap();
        assert!(!halt.is_empty(), "tick budget ran out at {:#010x}", self.jit.pc());
        halt
    }
}

/// Run `program` on the reference interpreter until BREAK (or a syscall).
pub fn reference_run(program: &[u32], ctx: &mut GuestContext, setup: impl FnOnce(&mut Machine)) -> Machine {
    let mut m = Machine::new(program);
    setup(&mut m);
    ctx.pc = BASE;
    for _ in 0..1_000_000 {
        match reference::step(ctx, &mut m) {
            reference::Event::Continue => {}
            reference::Event::Syscall(_) | reference::Event::Break => return m,
        }
    }
    panic!("reference run did not finish");
}

/// Run `program` on the JIT and on the reference interpreter from the same
/// starting state and assert registers, PC and memory agree.
pub fn assert_matches_reference(
    program: &[u32],
    init: impl Fn(&mut GuestContext),
    setup: impl Fn(&mut Machine),
    configure: impl FnOnce(&mut JitConfig),
) -> Harness {
    let mut h = Harness::new(program, configure);
    setup(&mut *h.machine());
    init(h.jit.context_mut());
    h.jit.set_pc(BASE);
    h.run_to_halt();

    let mut expected = GuestContext::new();
    init(&mut expected);
    let reference = reference_run(program, &mut expected, setup);

    let actual = h.jit.context();
    for r in 0..32 {
        assert_eq!(actual.gpr[r], expected.gpr[r], "gpr[{r}] differs");
    }
    assert_eq!((actual.hi, actual.lo), (expected.hi, expected.lo), "hi/lo differ");
    assert_eq!(actual.pc, expected.pc, "pc differs");
    assert!(h.machine().mem == reference.mem, "memory differs");
    h
}

// ---------------------------------------------------------------------------
// Reference interpreter
// ---------------------------------------------------------------------------

pub mod reference {
    use super::Machine;
    use rmipsjit::GuestContext;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Event {
        Continue,
        Syscall(u32),
        Break,
    }

    fn rs(w: u32) -> usize { ((w >> 21) & 0x1F) as usize }
    fn rt(w: u32) -> usize { ((w >> 16) & 0x1F) as usize }
    fn rd(w: u32) -> usize { ((w >> 11) & 0x1F) as usize }
    fn sa(w: u32) -> u32 { (w >> 6) & 0x1F }
    fn simm(w: u32) -> u32 { w as u16 as i16 as i32 as u32 }
    fn zimm(w: u32) -> u32 { w & 0xFFFF }

    fn set(ctx: &mut GuestContext, r: usize, v: u32) {
        if r != 0 {
            ctx.gpr[r] = v;
        }
    }

    pub fn is_branch(w: u32) -> bool {
        match w >> 26 {
            0 => matches!(w & 0x3F, 0x08 | 0x09),
            0x01 => matches!(rt(w), 0x00..=0x03 | 0x10..=0x13),
            0x02..=0x07 | 0x14..=0x17 => true,
            0x11 | 0x12 => rs(w) == 0x08,
            _ => false,
        }
    }

    /// One fetch-execute step at `ctx.pc`, delay slots included.
    pub fn step(ctx: &mut GuestContext, m: &mut Machine) -> Event {
        let pc = ctx.pc;
        let w = m.read32(pc);
        if is_branch(w) {
            branch(ctx, m, pc, w)
        } else {
            let event = exec(ctx, m, w);
            ctx.pc = pc.wrapping_add(4);
            event
        }
    }

    /// The JIT's interpreter fallback: branches are applied with their
    /// delay slot and leave the PC at the next instruction; anything else
    /// leaves the PC alone.
    pub fn interpret(ctx: &mut GuestContext, m: &mut Machine, w: u32) {
        let event = if is_branch(w) {
            let pc = ctx.pc;
            branch(ctx, m, pc, w)
        } else {
            exec(ctx, m, w)
        };
        if let Event::Syscall(code) = event {
            m.syscalls.push((code, ctx.pc));
        }
    }

    fn branch(ctx: &mut GuestContext, m: &mut Machine, pc: u32, w: u32) -> Event {
        let a = ctx.gpr[rs(w)];
        let b = ctx.gpr[rt(w)];
        let next = pc.wrapping_add(8);
        let rel = pc.wrapping_add(4).wrapping_add(simm(w) << 2);
        let (taken, target, link, likely) = match w >> 26 {
            0 if w & 0x3F == 0x08 => (true, a, None, false),
            0 => (true, a, Some(rd(w)), false),
            0x01 => {
                let sel = rt(w);
                let taken = if sel & 1 == 0 { (a as i32) < 0 } else { (a as i32) >= 0 };
                (taken, rel, (sel & 0x10 != 0).then_some(31), sel & 0x2 != 0)
            }
            0x02 | 0x03 => {
                let target = (pc.wrapping_add(4) & 0xF000_0000) | ((w & 0x03FF_FFFF) << 2);
                (true, target, (w >> 26 == 0x03).then_some(31), false)
            }
            0x11 | 0x12 => {
                let cond = if w >> 26 == 0x11 { m.fpu_cond } else { false };
                let want = rt(w) & 1 != 0;
                (cond == want, rel, None, rt(w) & 2 != 0)
            }
            op => {
                let taken = match op & 0x3 {
                    0 => a == b,
                    1 => a != b,
                    2 => (a as i32) <= 0,
                    _ => (a as i32) > 0,
                };
                (taken, rel, None, op >= 0x14)
            }
        };
        if let Some(r) = link {
            set(ctx, r, next);
        }
        if likely && !taken {
            ctx.pc = next;
            return Event::Continue;
        }
        let delay = m.read32(pc.wrapping_add(4));
        // A branch in a delay slot is not executed.
        let event = if is_branch(delay) { Event::Continue } else { exec(ctx, m, delay) };
        ctx.pc = if taken { target } else { next };
        event
    }

    fn exec(ctx: &mut GuestContext, m: &mut Machine, w: u32) -> Event {
        let a = ctx.gpr[rs(w)];
        let b = ctx.gpr[rt(w)];
        match w >> 26 {
            0x00 => return special(ctx, w, a, b),
            0x08 | 0x09 => set(ctx, rt(w), a.wrapping_add(simm(w))),
            0x0A => set(ctx, rt(w), ((a as i32) < (simm(w) as i32)) as u32),
            0x0B => set(ctx, rt(w), (a < simm(w)) as u32),
            0x0C => set(ctx, rt(w), a & zimm(w)),
            0x0D => set(ctx, rt(w), a | zimm(w)),
            0x0E => set(ctx, rt(w), a ^ zimm(w)),
            0x0F => set(ctx, rt(w), zimm(w) << 16),
            0x1F => special3(ctx, w, a, b),
            0x20 => set(ctx, rt(w), m.read8(a.wrapping_add(simm(w))) as i8 as i32 as u32),
            0x21 => set(ctx, rt(w), m.read16(a.wrapping_add(simm(w))) as i16 as i32 as u32),
            0x23 => set(ctx, rt(w), m.read32(a.wrapping_add(simm(w)))),
            0x24 => set(ctx, rt(w), m.read8(a.wrapping_add(simm(w))) as u32),
            0x25 => set(ctx, rt(w), m.read16(a.wrapping_add(simm(w))) as u32),
            0x28 => m.write8(a.wrapping_add(simm(w)), b as u8),
            0x29 => m.write16(a.wrapping_add(simm(w)), b as u16),
            0x2B => m.write32(a.wrapping_add(simm(w)), b),
            // CACHE has no architectural effect here.
            0x2F => {}
            _ => panic!("reference interpreter: unsupported {w:#010x}"),
        }
        Event::Continue
    }

    fn special(ctx: &mut GuestContext, w: u32, a: u32, b: u32) -> Event {
        let d = rd(w);
        let acc = ((ctx.hi as u64) << 32) | ctx.lo as u64;
        let sprod = (a as i32 as i64).wrapping_mul(b as i32 as i64) as u64;
        let uprod = a as u64 * b as u64;
        let hilo = |ctx: &mut GuestContext, v: u64| {
            ctx.hi = (v >> 32) as u32;
            ctx.lo = v as u32;
        };
        match w & 0x3F {
            0x00 => set(ctx, d, b << sa(w)),
            0x02 if rs(w) == 1 => set(ctx, d, b.rotate_right(sa(w))),
            0x02 => set(ctx, d, b >> sa(w)),
            0x03 => set(ctx, d, ((b as i32) >> sa(w)) as u32),
            0x04 => set(ctx, d, b << (a & 31)),
            0x06 if sa(w) == 1 => set(ctx, d, b.rotate_right(a & 31)),
            0x06 => set(ctx, d, b >> (a & 31)),
            0x07 => set(ctx, d, ((b as i32) >> (a & 31)) as u32),
            0x0A => {
                if b == 0 {
                    set(ctx, d, a)
                }
            }
            0x0B => {
                if b != 0 {
                    set(ctx, d, a)
                }
            }
            0x0C => return Event::Syscall((w >> 6) & 0xF_FFFF),
            0x0D => return Event::Break,
            0x0F => {}
            0x10 => set(ctx, d, ctx.hi),
            0x11 => ctx.hi = a,
            0x12 => set(ctx, d, ctx.lo),
            0x13 => ctx.lo = a,
            0x16 => set(ctx, d, a.leading_zeros()),
            0x17 => set(ctx, d, a.leading_ones()),
            0x18 => hilo(ctx, sprod),
            0x19 => hilo(ctx, uprod),
            0x1A => {
                if b == 0 {
                    ctx.hi = a;
                    ctx.lo = if (a as i32) < 0 { 1 } else { 0xFFFF_FFFF };
                } else {
                    ctx.hi = (a as i32).wrapping_rem(b as i32) as u32;
                    ctx.lo = (a as i32).wrapping_div(b as i32) as u32;
                }
            }
            0x1B => {
                if b == 0 {
                    ctx.hi = a;
                    ctx.lo = 0xFFFF_FFFF;
                } else {
                    ctx.hi = a % b;
                    ctx.lo = a / b;
                }
            }
            0x1C => hilo(ctx, acc.wrapping_add(sprod)),
            0x1D => hilo(ctx, acc.wrapping_add(uprod)),
            0x2E => hilo(ctx, acc.wrapping_sub(sprod)),
            0x2F => hilo(ctx, acc.wrapping_sub(uprod)),
            0x20 | 0x21 => set(ctx, d, a.wrapping_add(b)),
            0x22 | 0x23 => set(ctx, d, a.wrapping_sub(b)),
            0x24 => set(ctx, d, a & b),
            0x25 => set(ctx, d, a | b),
            0x26 => set(ctx, d, a ^ b),
            0x27 => set(ctx, d, !(a | b)),
            0x2A => set(ctx, d, ((a as i32) < (b as i32)) as u32),
            0x2B => set(ctx, d, (a < b) as u32),
            0x2C => set(ctx, d, (a as i32).max(b as i32) as u32),
            0x2D => set(ctx, d, (a as i32).min(b as i32) as u32),
            _ => panic!("reference interpreter: unsupported {w:#010x}"),
        }
        Event::Continue
    }

    fn special3(ctx: &mut GuestContext, w: u32, a: u32, b: u32) {
        let msb = rd(w) as u32;
        let lsb = sa(w);
        let mask = |size: u32| if size >= 32 { u32::MAX } else { (1 << size) - 1 };
        match w & 0x3F {
            0x00 => set(ctx, rt(w), (a >> lsb) & mask(msb + 1)),
            0x04 => {
                let m = mask(msb - lsb + 1) << lsb;
                set(ctx, rt(w), (b & !m) | ((a << lsb) & m));
            }
            0x20 => {
                let v = match lsb {
                    0x02 => ((b & 0x00FF_00FF) << 8) | ((b >> 8) & 0x00FF_00FF),
                    0x03 => b.swap_bytes(),
                    0x10 => b as u8 as i8 as i32 as u32,
                    0x14 => b.reverse_bits(),
                    0x18 => b as u16 as i16 as i32 as u32,
                    _ => panic!("reference interpreter: unsupported {w:#010x}"),
                };
                set(ctx, rd(w), v);
            }
            _ => panic!("reference interpreter: unsupported {w:#010x}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

pub mod asm {
    fn r(funct: u32, rs: u32, rt: u32, rd: u32, sa: u32) -> u32 {
        (rs << 21) | (rt << 16) | (rd << 11) | (sa << 6) | funct
    }

    fn i(op: u32, rs: u32, rt: u32, imm: i32) -> u32 {
        (op << 26) | (rs << 21) | (rt << 16) | (imm as u32 & 0xFFFF)
    }

    pub const NOP: u32 = 0;

    pub const ZERO: u32 = 0;
    pub const V0: u32 = 2;
    pub const V1: u32 = 3;
    pub const A0: u32 = 4;
    pub const A1: u32 = 5;
    pub const A2: u32 = 6;
    pub const A3: u32 = 7;
    pub const T0: u32 = 8;
    pub const T1: u32 = 9;
    pub const T2: u32 = 10;
    pub const T3: u32 = 11;
    pub const S0: u32 = 16;
    pub const S1: u32 = 17;
    pub const T9: u32 = 25;
    pub const SP: u32 = 29;
    pub const RA: u32 = 31;

    pub fn addu(rd: u32, rs: u32, rt: u32) -> u32 { r(0x21, rs, rt, rd, 0) }
    pub fn subu(rd: u32, rs: u32, rt: u32) -> u32 { r(0x23, rs, rt, rd, 0) }
    pub fn and(rd: u32, rs: u32, rt: u32) -> u32 { r(0x24, rs, rt, rd, 0) }
    pub fn or(rd: u32, rs: u32, rt: u32) -> u32 { r(0x25, rs, rt, rd, 0) }
    pub fn xor(rd: u32, rs: u32, rt: u32) -> u32 { r(0x26, rs, rt, rd, 0) }
    pub fn nor(rd: u32, rs: u32, rt: u32) -> u32 { r(0x27, rs, rt, rd, 0) }
    pub fn slt(rd: u32, rs: u32, rt: u32) -> u32 { r(0x2A, rs, rt, rd, 0) }
    pub fn sltu(rd: u32, rs: u32, rt: u32) -> u32 { r(0x2B, rs, rt, rd, 0) }
    pub fn max(rd: u32, rs: u32, rt: u32) -> u32 { r(0x2C, rs, rt, rd, 0) }
    pub fn min(rd: u32, rs: u32, rt: u32) -> u32 { r(0x2D, rs, rt, rd, 0) }
    pub fn movz(rd: u32, rs: u32, rt: u32) -> u32 { r(0x0A, rs, rt, rd, 0) }
    pub fn movn(rd: u32, rs: u32, rt: u32) -> u32 { r(0x0B, rs, rt, rd, 0) }
    pub fn sll(rd: u32, rt: u32, sa: u32) -> u32 { r(0x00, 0, rt, rd, sa) }
    pub fn srl(rd: u32, rt: u32, sa: u32) -> u32 { r(0x02, 0, rt, rd, sa) }
    pub fn sra(rd: u32, rt: u32, sa: u32) -> u32 { r(0x03, 0, rt, rd, sa) }
    pub fn rotr(rd: u32, rt: u32, sa: u32) -> u32 { r(0x02, 1, rt, rd, sa) }
    pub fn sllv(rd: u32, rt: u32, rs: u32) -> u32 { r(0x04, rs, rt, rd, 0) }
    pub fn srlv(rd: u32, rt: u32, rs: u32) -> u32 { r(0x06, rs, rt, rd, 0) }
    pub fn srav(rd: u32, rt: u32, rs: u32) -> u32 { r(0x07, rs, rt, rd, 0) }
    pub fn rotrv(rd: u32, rt: u32, rs: u32) -> u32 { r(0x06, rs, rt, rd, 1) }
    pub fn clz(rd: u32, rs: u32) -> u32 { r(0x16, rs, 0, rd, 0) }
    pub fn clo(rd: u32, rs: u32) -> u32 { r(0x17, rs, 0, rd, 0) }
    pub fn seb(rd: u32, rt: u32) -> u32 { (0x1F << 26) | r(0x20, 0, rt, rd, 0x10) }
    pub fn seh(rd: u32, rt: u32) -> u32 { (0x1F << 26) | r(0x20, 0, rt, rd, 0x18) }
    pub fn wsbh(rd: u32, rt: u32) -> u32 { (0x1F << 26) | r(0x20, 0, rt, rd, 0x02) }
    pub fn wsbw(rd: u32, rt: u32) -> u32 { (0x1F << 26) | r(0x20, 0, rt, rd, 0x03) }
    pub fn bitrev(rd: u32, rt: u32) -> u32 { (0x1F << 26) | r(0x20, 0, rt, rd, 0x14) }
    pub fn ext(rt: u32, rs: u32, pos: u32, size: u32) -> u32 { (0x1F << 26) | r(0x00, rs, rt, size - 1, pos) }
    pub fn ins(rt: u32, rs: u32, pos: u32, size: u32) -> u32 { (0x1F << 26) | r(0x04, rs, rt, pos + size - 1, pos) }
    pub fn mult(rs: u32, rt: u32) -> u32 { r(0x18, rs, rt, 0, 0) }
    pub fn multu(rs: u32, rt: u32) -> u32 { r(0x19, rs, rt, 0, 0) }
    pub fn div(rs: u32, rt: u32) -> u32 { r(0x1A, rs, rt, 0, 0) }
    pub fn divu(rs: u32, rt: u32) -> u32 { r(0x1B, rs, rt, 0, 0) }
    pub fn madd(rs: u32, rt: u32) -> u32 { r(0x1C, rs, rt, 0, 0) }
    pub fn maddu(rs: u32, rt: u32) -> u32 { r(0x1D, rs, rt, 0, 0) }
    pub fn msub(rs: u32, rt: u32) -> u32 { r(0x2E, rs, rt, 0, 0) }
    pub fn msubu(rs: u32, rt: u32) -> u32 { r(0x2F, rs, rt, 0, 0) }
    pub fn mfhi(rd: u32) -> u32 { r(0x10, 0, 0, rd, 0) }
    pub fn mflo(rd: u32) -> u32 { r(0x12, 0, 0, rd, 0) }
    pub fn mthi(rs: u32) -> u32 { r(0x11, rs, 0, 0, 0) }
    pub fn mtlo(rs: u32) -> u32 { r(0x13, rs, 0, 0, 0) }
    pub fn jr(rs: u32) -> u32 { r(0x08, rs, 0, 0, 0) }
    pub fn jalr(rd: u32, rs: u32) -> u32 { r(0x09, rs, 0, rd, 0) }
    pub fn syscall(code: u32) -> u32 { (code << 6) | 0x0C }
    pub fn break_() -> u32 { 0x0D }

    pub fn addiu(rt: u32, rs: u32, imm: i32) -> u32 { i(0x09, rs, rt, imm) }
    pub fn slti(rt: u32, rs: u32, imm: i32) -> u32 { i(0x0A, rs, rt, imm) }
    pub fn sltiu(rt: u32, rs: u32, imm: i32) -> u32 { i(0x0B, rs, rt, imm) }
    pub fn andi(rt: u32, rs: u32, imm: u32) -> u32 { i(0x0C, rs, rt, imm as i32) }
    pub fn ori(rt: u32, rs: u32, imm: u32) -> u32 { i(0x0D, rs, rt, imm as i32) }
    pub fn xori(rt: u32, rs: u32, imm: u32) -> u32 { i(0x0E, rs, rt, imm as i32) }
    pub fn lui(rt: u32, imm: u32) -> u32 { i(0x0F, 0, rt, imm as i32) }
    pub fn lb(rt: u32, base: u32, off: i32) -> u32 { i(0x20, base, rt, off) }
    pub fn lh(rt: u32, base: u32, off: i32) -> u32 { i(0x21, base, rt, off) }
    pub fn lw(rt: u32, base: u32, off: i32) -> u32 { i(0x23, base, rt, off) }
    pub fn lbu(rt: u32, base: u32, off: i32) -> u32 { i(0x24, base, rt, off) }
    pub fn lhu(rt: u32, base: u32, off: i32) -> u32 { i(0x25, base, rt, off) }
    pub fn cache(op: u32, base: u32, off: i32) -> u32 { i(0x2F, base, op, off) }
    pub fn sb(rt: u32, base: u32, off: i32) -> u32 { i(0x28, base, rt, off) }
    pub fn sh(rt: u32, base: u32, off: i32) -> u32 { i(0x29, base, rt, off) }
    pub fn sw(rt: u32, base: u32, off: i32) -> u32 { i(0x2B, base, rt, off) }

    pub fn beq(rs: u32, rt: u32, off: i32) -> u32 { i(0x04, rs, rt, off) }
    pub fn bne(rs: u32, rt: u32, off: i32) -> u32 { i(0x05, rs, rt, off) }
    pub fn blez(rs: u32, off: i32) -> u32 { i(0x06, rs, 0, off) }
    pub fn bgtz(rs: u32, off: i32) -> u32 { i(0x07, rs, 0, off) }
    pub fn beql(rs: u32, rt: u32, off: i32) -> u32 { i(0x14, rs, rt, off) }
    pub fn bnel(rs: u32, rt: u32, off: i32) -> u32 { i(0x15, rs, rt, off) }
    pub fn blezl(rs: u32, off: i32) -> u32 { i(0x16, rs, 0, off) }
    pub fn bgtzl(rs: u32, off: i32) -> u32 { i(0x17, rs, 0, off) }
    pub fn bltz(rs: u32, off: i32) -> u32 { i(0x01, rs, 0x00, off) }
    pub fn bgez(rs: u32, off: i32) -> u32 { i(0x01, rs, 0x01, off) }
    pub fn bltzl(rs: u32, off: i32) -> u32 { i(0x01, rs, 0x02, off) }
    pub fn bgezl(rs: u32, off: i32) -> u32 { i(0x01, rs, 0x03, off) }
    pub fn bltzal(rs: u32, off: i32) -> u32 { i(0x01, rs, 0x10, off) }
    pub fn bgezal(rs: u32, off: i32) -> u32 { i(0x01, rs, 0x11, off) }
    pub fn bgezall(rs: u32, off: i32) -> u32 { i(0x01, rs, 0x13, off) }
    pub fn j(target: u32) -> u32 { (0x02 << 26) | ((target >> 2) & 0x03FF_FFFF) }
    pub fn jal(target: u32) -> u32 { (0x03 << 26) | ((target >> 2) & 0x03FF_FFFF) }
    pub fn bc1f(off: i32) -> u32 { i(0x11, 0x08, 0x00, off) }
    pub fn bc1t(off: i32) -> u32 { i(0x11, 0x08, 0x01, off) }

    /// `lui`/`ori` pair loading `value` into `rt`.
    pub fn li(rt: u32, value: u32) -> [u32; 2] {
        [lui(rt, value >> 16), ori(rt, rt, value & 0xFFFF)]
    }
}
