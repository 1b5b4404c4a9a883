//! A32 instruction encoder writing into the code buffer.
//!
//! Every emit method appends one or more little-endian instruction words at
//! the cursor. Writing past the end of the buffer never panics: the cursor
//! keeps advancing so the caller can detect the overflow once at block end
//! through [`ArmEmitter::is_full`].

use crate::backend::arm::hostloc::ArmReg;
use crate::backend::arm::literal_pool::{LiteralPool, LITERAL_FLUSH_DISTANCE, MAX_LITERAL_DISTANCE};
use crate::backend::arm::operand::{encode_with_transform, ByteWindows, Operand2, Transform, TransformKind};
use crate::error::CompileError;
use crate::jit_config::CpuCapabilities;

/// Encoding of `B .` with the condition bits cleared: a branch to itself.
const SELF_BRANCH: u32 = 0x0AFF_FFFE;

/// `MOV r0, r0`.
pub const NOP: u32 = 0xE1A0_0000;

/// Largest forward/backward distance a B/BL can cover.
pub const MAX_BRANCH_DISTANCE: i64 = 1 << 25;

// ---------------------------------------------------------------------------
// Operand types
// ---------------------------------------------------------------------------

/// A32 condition field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cond {
    Eq = 0,
    Ne = 1,
    Cs = 2,
    Cc = 3,
    Mi = 4,
    Pl = 5,
    Vs = 6,
    Vc = 7,
    Hi = 8,
    Ls = 9,
    Ge = 10,
    Lt = 11,
    Gt = 12,
    Le = 13,
    Al = 14,
}

impl Cond {
    const ALL: [Cond; 15] = [
        Cond::Eq, Cond::Ne, Cond::Cs, Cond::Cc, Cond::Mi, Cond::Pl, Cond::Vs, Cond::Vc,
        Cond::Hi, Cond::Ls, Cond::Ge, Cond::Lt, Cond::Gt, Cond::Le, Cond::Al,
    ];

    #[inline]
    pub const fn bits(self) -> u32 {
        (self as u32) << 28
    }

    /// Decode a condition field. `0xF` is the unconditional space, not a condition.
    pub fn from_bits(field: u32) -> Option<Self> {
        Self::ALL.get(field as usize).copied()
    }

    /// The logically opposite condition. `Al` has none and maps to itself.
    pub fn invert(self) -> Self {
        match self {
            Cond::Al => Cond::Al,
            c => Self::ALL[(c as usize) ^ 1],
        }
    }
}

/// Data-processing opcodes (bits 24:21).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DpOp {
    And = 0,
    Eor = 1,
    Sub = 2,
    Rsb = 3,
    Add = 4,
    Adc = 5,
    Sbc = 6,
    Rsc = 7,
    Tst = 8,
    Teq = 9,
    Cmp = 10,
    Cmn = 11,
    Orr = 12,
    Mov = 13,
    Bic = 14,
    Mvn = 15,
}

impl DpOp {
    const ALL: [DpOp; 16] = [
        DpOp::And, DpOp::Eor, DpOp::Sub, DpOp::Rsb, DpOp::Add, DpOp::Adc, DpOp::Sbc, DpOp::Rsc,
        DpOp::Tst, DpOp::Teq, DpOp::Cmp, DpOp::Cmn, DpOp::Orr, DpOp::Mov, DpOp::Bic, DpOp::Mvn,
    ];

    pub fn from_bits(field: u32) -> Self {
        Self::ALL[(field & 0xF) as usize]
    }

    /// TST/TEQ/CMP/CMN: only set flags, no destination.
    pub fn is_test(self) -> bool {
        matches!(self, DpOp::Tst | DpOp::Teq | DpOp::Cmp | DpOp::Cmn)
    }

    /// MOV/MVN: no first operand.
    pub fn is_move(self) -> bool {
        matches!(self, DpOp::Mov | DpOp::Mvn)
    }

    /// The opcode that computes the same result from the transformed
    /// immediate, and which transform that is.
    fn immediate_counterpart(self) -> Option<(DpOp, TransformKind)> {
        match self {
            DpOp::And => Some((DpOp::Bic, TransformKind::Inverse)),
            DpOp::Bic => Some((DpOp::And, TransformKind::Inverse)),
            DpOp::Mov => Some((DpOp::Mvn, TransformKind::Inverse)),
            DpOp::Mvn => Some((DpOp::Mov, TransformKind::Inverse)),
            DpOp::Add => Some((DpOp::Sub, TransformKind::Negation)),
            DpOp::Sub => Some((DpOp::Add, TransformKind::Negation)),
            DpOp::Cmp => Some((DpOp::Cmn, TransformKind::Negation)),
            DpOp::Cmn => Some((DpOp::Cmp, TransformKind::Negation)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShiftType {
    Lsl = 0,
    Lsr = 1,
    Asr = 2,
    Ror = 3,
}

impl ShiftType {
    pub fn from_bits(field: u32) -> Self {
        match field & 3 {
            0 => ShiftType::Lsl,
            1 => ShiftType::Lsr,
            2 => ShiftType::Asr,
            _ => ShiftType::Ror,
        }
    }
}

/// The flexible second operand of a data-processing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShifterOperand {
    Imm(Operand2),
    Reg(ArmReg),
    /// Register shifted by a constant. Built through [`ShifterOperand::shifted`].
    ShiftImm(ArmReg, ShiftType, u8),
    /// Register shifted by the bottom byte of another register.
    ShiftReg(ArmReg, ShiftType, ArmReg),
}

impl ShifterOperand {
    /// `rm <shift> #amount` for amounts 0..=32.
    ///
    /// A zero amount is a plain register. LSR/ASR by 32 use the zero field,
    /// which the architecture reads as 32.
    pub fn shifted(rm: ArmReg, shift: ShiftType, amount: u32) -> Self {
        debug_assert!(amount <= 32);
        debug_assert!(amount < 32 || matches!(shift, ShiftType::Lsr | ShiftType::Asr));
        match amount {
            0 => ShifterOperand::Reg(rm),
            32 => ShifterOperand::ShiftImm(rm, shift, 0),
            n => ShifterOperand::ShiftImm(rm, shift, n as u8),
        }
    }

    fn bits(self) -> u32 {
        match self {
            ShifterOperand::Imm(imm) => (1 << 25) | imm.bits(),
            ShifterOperand::Reg(rm) => rm.num(),
            ShifterOperand::ShiftImm(rm, ty, amount) => {
                ((amount as u32 & 0x1F) << 7) | ((ty as u32) << 5) | rm.num()
            }
            ShifterOperand::ShiftReg(rm, ty, rs) => {
                (rs.num() << 8) | ((ty as u32) << 5) | (1 << 4) | rm.num()
            }
        }
    }
}

impl From<ArmReg> for ShifterOperand {
    fn from(reg: ArmReg) -> Self {
        ShifterOperand::Reg(reg)
    }
}

impl From<Operand2> for ShifterOperand {
    fn from(imm: Operand2) -> Self {
        ShifterOperand::Imm(imm)
    }
}

// ---------------------------------------------------------------------------
// Fixups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupKind {
    Unconditional,
    Conditional,
}

/// A forward branch whose target is not yet known.
///
/// Not `Clone`: the only way to get rid of one is to hand it to
/// [`ArmEmitter::resolve_fixup`], so it cannot be resolved twice.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "every fixup must be resolved before the block is finished"]
pub struct Fixup {
    offset: usize,
    cond: Cond,
}

impl Fixup {
    /// Code buffer offset of the placeholder branch.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn cond(&self) -> Cond {
        self.cond
    }

    pub fn kind(&self) -> FixupKind {
        if self.cond == Cond::Al { FixupKind::Unconditional } else { FixupKind::Conditional }
    }
}

/// Encode `B<cond>`/`BL<cond>` at `from` targeting `to`.
pub fn encode_branch(cond: Cond, link: bool, from: usize, to: usize) -> Result<u32, CompileError> {
    let disp = to as i64 - (from as i64 + 8);
    if disp % 4 != 0 || !(-MAX_BRANCH_DISTANCE..MAX_BRANCH_DISTANCE).contains(&disp) {
        return Err(CompileError::BranchOutOfRange { from, to });
    }
    let imm24 = ((disp >> 2) as u32) & 0x00FF_FFFF;
    Ok(cond.bits() | 0x0A00_0000 | ((link as u32) << 24) | imm24)
}

/// Flush the host instruction cache for `[start, end)`.
///
/// Only matters once the buffer is mapped executable and entered natively.
/// The in-tree [`super::executor::Executor`] decodes straight from the
/// buffer, so for it this is plain cache maintenance with no effect.
#[cfg(all(target_arch = "arm", target_os = "linux"))]
pub fn flush_icache(start: *const u8, end: *const u8) {
    extern "C" {
        fn __clear_cache(start: *mut core::ffi::c_void, end: *mut core::ffi::c_void);
    }
    // SAFETY: `__clear_cache` only performs cache maintenance on the range.
    unsafe { __clear_cache(start as *mut _, end as *mut _) }
}

/// Flush the host instruction cache for `[start, end)`.
///
/// Nothing to do when the generated code is not run natively.
#[cfg(not(all(target_arch = "arm", target_os = "linux")))]
pub fn flush_icache(_start: *const u8, _end: *const u8) {}

// ---------------------------------------------------------------------------
// ArmEmitter
// ---------------------------------------------------------------------------

/// Code buffer plus cursor, with one method per emitted instruction form.
pub struct ArmEmitter {
    buf: Vec<u8>,
    pos: usize,
    caps: CpuCapabilities,
    use_literal_pool: bool,
    pool: LiteralPool,
    pending_fixups: usize,
}

impl ArmEmitter {
    pub fn new(capacity: usize, caps: CpuCapabilities, use_literal_pool: bool) -> Self {
        Self {
            buf: vec![0; capacity],
            pos: 0,
            caps,
            use_literal_pool,
            pool: LiteralPool::new(),
            pending_fixups: 0,
        }
    }

    pub fn capabilities(&self) -> CpuCapabilities {
        self.caps
    }

    // ---- Buffer ----

    /// Current cursor position.
    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Move the cursor back, discarding everything after `offset`.
    pub fn rewind(&mut self, offset: usize) {
        debug_assert!(offset <= self.pos);
        self.pos = offset;
        self.pool.clear();
        self.pending_fixups = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn space_remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Whether the cursor has run past the end of the buffer.
    pub fn is_full(&self) -> bool {
        self.pos > self.buf.len()
    }

    /// The whole code buffer.
    pub fn code(&self) -> &[u8] {
        &self.buf
    }

    /// Number of fixups handed out and not yet resolved.
    pub fn pending_fixups(&self) -> usize {
        self.pending_fixups
    }

    /// Literals emitted as loads but not yet written.
    pub fn pending_literals(&self) -> usize {
        self.pool.len()
    }

    pub fn read32(&self, offset: usize) -> u32 {
        match self.buf.get(offset..offset + 4) {
            Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            None => 0,
        }
    }

    /// Overwrite one instruction word. Offsets past the buffer are ignored.
    pub fn patch32(&mut self, offset: usize, word: u32) {
        if let Some(b) = self.buf.get_mut(offset..offset + 4) {
            b.copy_from_slice(&word.to_le_bytes());
        }
    }

    #[inline]
    pub fn emit32(&mut self, word: u32) {
        let at = self.pos;
        self.patch32(at, word);
        self.pos += 4;
    }

    /// Make `[start, end)` visible to instruction fetch.
    pub fn flush_icache(&self, start: usize, end: usize) {
        let end = end.min(self.buf.len());
        if start < end {
            let range = self.buf[start..end].as_ptr_range();
            flush_icache(range.start, range.end);
        }
    }

    // ---- Data processing ----

    pub fn dp(&mut self, cond: Cond, op: DpOp, s: bool, rd: ArmReg, rn: ArmReg, op2: ShifterOperand) {
        let s = s || op.is_test();
        let rd = if op.is_test() { 0 } else { rd.num() };
        let rn = if op.is_move() { 0 } else { rn.num() };
        self.emit32(
            cond.bits() | ((op as u32) << 21) | ((s as u32) << 20) | (rn << 16) | (rd << 12) | op2.bits(),
        );
    }

    pub fn add(&mut self, rd: ArmReg, rn: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Add, false, rd, rn, op2.into());
    }

    pub fn sub(&mut self, rd: ArmReg, rn: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Sub, false, rd, rn, op2.into());
    }

    pub fn rsb(&mut self, rd: ArmReg, rn: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Rsb, false, rd, rn, op2.into());
    }

    pub fn and(&mut self, rd: ArmReg, rn: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::And, false, rd, rn, op2.into());
    }

    pub fn orr(&mut self, rd: ArmReg, rn: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Orr, false, rd, rn, op2.into());
    }

    pub fn eor(&mut self, rd: ArmReg, rn: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Eor, false, rd, rn, op2.into());
    }

    pub fn bic(&mut self, rd: ArmReg, rn: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Bic, false, rd, rn, op2.into());
    }

    pub fn mov(&mut self, rd: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Mov, false, rd, ArmReg::R0, op2.into());
    }

    pub fn mov_cond(&mut self, cond: Cond, rd: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(cond, DpOp::Mov, false, rd, ArmReg::R0, op2.into());
    }

    pub fn mvn(&mut self, rd: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Mvn, false, rd, ArmReg::R0, op2.into());
    }

    pub fn cmp(&mut self, rn: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Cmp, true, ArmReg::R0, rn, op2.into());
    }

    pub fn tst(&mut self, rn: ArmReg, op2: impl Into<ShifterOperand>) {
        self.dp(Cond::Al, DpOp::Tst, true, ArmReg::R0, rn, op2.into());
    }

    pub fn nop(&mut self) {
        self.emit32(NOP);
    }

    // ---- Multiply / divide ----

    pub fn mul(&mut self, rd: ArmReg, rm: ArmReg, rs: ArmReg) {
        self.emit32(Cond::Al.bits() | (rd.num() << 16) | (rs.num() << 8) | 0x90 | rm.num());
    }

    /// `rd = rm * rs + ra`
    pub fn mla(&mut self, rd: ArmReg, rm: ArmReg, rs: ArmReg, ra: ArmReg) {
        self.emit32(
            Cond::Al.bits() | 0x0020_0090 | (rd.num() << 16) | (ra.num() << 12) | (rs.num() << 8) | rm.num(),
        );
    }

    fn long_multiply(&mut self, base: u32, lo: ArmReg, hi: ArmReg, rm: ArmReg, rs: ArmReg) {
        debug_assert!(lo != hi);
        self.emit32(
            Cond::Al.bits() | base | (hi.num() << 16) | (lo.num() << 12) | (rs.num() << 8) | rm.num(),
        );
    }

    pub fn umull(&mut self, lo: ArmReg, hi: ArmReg, rm: ArmReg, rs: ArmReg) {
        self.long_multiply(0x0080_0090, lo, hi, rm, rs);
    }

    pub fn umlal(&mut self, lo: ArmReg, hi: ArmReg, rm: ArmReg, rs: ArmReg) {
        self.long_multiply(0x00A0_0090, lo, hi, rm, rs);
    }

    pub fn smull(&mut self, lo: ArmReg, hi: ArmReg, rm: ArmReg, rs: ArmReg) {
        self.long_multiply(0x00C0_0090, lo, hi, rm, rs);
    }

    pub fn smlal(&mut self, lo: ArmReg, hi: ArmReg, rm: ArmReg, rs: ArmReg) {
        self.long_multiply(0x00E0_0090, lo, hi, rm, rs);
    }

    /// `rd = rn / rm`, signed. Requires the divide extension.
    pub fn sdiv(&mut self, rd: ArmReg, rn: ArmReg, rm: ArmReg) {
        debug_assert!(self.caps.hw_divide);
        self.emit32(Cond::Al.bits() | 0x0710_F010 | (rd.num() << 16) | (rm.num() << 8) | rn.num());
    }

    pub fn udiv(&mut self, rd: ArmReg, rn: ArmReg, rm: ArmReg) {
        debug_assert!(self.caps.hw_divide);
        self.emit32(Cond::Al.bits() | 0x0730_F010 | (rd.num() << 16) | (rm.num() << 8) | rn.num());
    }

    // ---- Bit manipulation ----

    pub fn clz(&mut self, rd: ArmReg, rm: ArmReg) {
        self.emit32(Cond::Al.bits() | 0x016F_0F10 | (rd.num() << 12) | rm.num());
    }

    pub fn rev(&mut self, rd: ArmReg, rm: ArmReg) {
        self.emit32(Cond::Al.bits() | 0x06BF_0F30 | (rd.num() << 12) | rm.num());
    }

    pub fn rev16(&mut self, rd: ArmReg, rm: ArmReg) {
        self.emit32(Cond::Al.bits() | 0x06BF_0FB0 | (rd.num() << 12) | rm.num());
    }

    pub fn rbit(&mut self, rd: ArmReg, rm: ArmReg) {
        debug_assert!(self.caps.armv7);
        self.emit32(Cond::Al.bits() | 0x06FF_0F30 | (rd.num() << 12) | rm.num());
    }

    pub fn sxtb(&mut self, rd: ArmReg, rm: ArmReg) {
        self.emit32(Cond::Al.bits() | 0x06AF_0070 | (rd.num() << 12) | rm.num());
    }

    pub fn sxth(&mut self, rd: ArmReg, rm: ArmReg) {
        self.emit32(Cond::Al.bits() | 0x06BF_0070 | (rd.num() << 12) | rm.num());
    }

    /// Unsigned bitfield extract of `width` bits starting at `lsb`.
    pub fn ubfx(&mut self, rd: ArmReg, rn: ArmReg, lsb: u32, width: u32) {
        debug_assert!(self.caps.armv7 && width >= 1 && lsb + width <= 32);
        self.emit32(
            Cond::Al.bits()
                | 0x07E0_0050
                | ((width - 1) << 16)
                | (rd.num() << 12)
                | (lsb << 7)
                | rn.num(),
        );
    }

    /// Insert the low `width` bits of `rn` into `rd` at `lsb`.
    pub fn bfi(&mut self, rd: ArmReg, rn: ArmReg, lsb: u32, width: u32) {
        debug_assert!(self.caps.armv7 && width >= 1 && lsb + width <= 32);
        let msb = lsb + width - 1;
        self.emit32(
            Cond::Al.bits() | 0x07C0_0010 | (msb << 16) | (rd.num() << 12) | (lsb << 7) | rn.num(),
        );
    }

    pub fn movw(&mut self, rd: ArmReg, imm16: u32) {
        debug_assert!(self.caps.armv7 && imm16 <= 0xFFFF);
        self.emit32(
            Cond::Al.bits() | 0x0300_0000 | ((imm16 >> 12) << 16) | (rd.num() << 12) | (imm16 & 0xFFF),
        );
    }

    pub fn movt(&mut self, rd: ArmReg, imm16: u32) {
        debug_assert!(self.caps.armv7 && imm16 <= 0xFFFF);
        self.emit32(
            Cond::Al.bits() | 0x0340_0000 | ((imm16 >> 12) << 16) | (rd.num() << 12) | (imm16 & 0xFFF),
        );
    }

    // ---- Status register ----

    /// `MRS rd, CPSR`
    pub fn mrs(&mut self, rd: ArmReg) {
        self.emit32(Cond::Al.bits() | 0x010F_0000 | (rd.num() << 12));
    }

    /// `MSR CPSR_f, rn`: restore N/Z/C/V.
    pub fn msr_flags(&mut self, rn: ArmReg) {
        self.emit32(Cond::Al.bits() | 0x0128_F000 | rn.num());
    }

    // ---- Load / store ----

    fn single_transfer(&mut self, load: bool, rt: ArmReg, rn: ArmReg, offset: i32) {
        let magnitude = offset.unsigned_abs();
        debug_assert!(magnitude <= MAX_LITERAL_DISTANCE as u32);
        let up = (offset >= 0) as u32;
        self.emit32(
            Cond::Al.bits()
                | 0x0500_0000
                | (up << 23)
                | ((load as u32) << 20)
                | (rn.num() << 16)
                | (rt.num() << 12)
                | (magnitude & 0xFFF),
        );
    }

    /// `LDR rt, [rn, #offset]`
    pub fn ldr(&mut self, rt: ArmReg, rn: ArmReg, offset: i32) {
        self.single_transfer(true, rt, rn, offset);
    }

    /// `STR rt, [rn, #offset]`
    pub fn str(&mut self, rt: ArmReg, rn: ArmReg, offset: i32) {
        self.single_transfer(false, rt, rn, offset);
    }

    /// `STMDB sp!, {list}`
    pub fn push(&mut self, list: u16) {
        self.emit32(Cond::Al.bits() | 0x092D_0000 | list as u32);
    }

    /// `LDMIA sp!, {list}`
    pub fn pop(&mut self, list: u16) {
        self.emit32(Cond::Al.bits() | 0x08BD_0000 | list as u32);
    }

    // ---- Branches ----

    pub fn bx(&mut self, rm: ArmReg) {
        self.emit32(Cond::Al.bits() | 0x012F_FF10 | rm.num());
    }

    pub fn blx(&mut self, rm: ArmReg) {
        self.emit32(Cond::Al.bits() | 0x012F_FF30 | rm.num());
    }

    /// `B<cond>` to an already known offset.
    pub fn b(&mut self, cond: Cond, target: usize) -> Result<(), CompileError> {
        let word = encode_branch(cond, false, self.pos, target)?;
        self.emit32(word);
        Ok(())
    }

    /// Emit `B<cond> .` to be patched later by [`Self::resolve_fixup`].
    pub fn branch_placeholder(&mut self, cond: Cond) -> Fixup {
        let offset = self.pos;
        self.emit32(cond.bits() | SELF_BRANCH);
        self.pending_fixups += 1;
        Fixup { offset, cond }
    }

    pub fn resolve_fixup(&mut self, fixup: Fixup, target: usize) -> Result<(), CompileError> {
        debug_assert_eq!(self.read32(fixup.offset) & 0x0FFF_FFFF, SELF_BRANCH, "fixup already patched");
        self.pending_fixups -= 1;
        let word = encode_branch(fixup.cond, false, fixup.offset, target);
        debug_assert!(word.is_ok(), "branch fixup out of range");
        self.patch32(fixup.offset, word?);
        Ok(())
    }

    /// Resolve `fixup` to the current cursor.
    pub fn resolve_here(&mut self, fixup: Fixup) -> Result<(), CompileError> {
        let here = self.pos;
        self.resolve_fixup(fixup, here)
    }

    // ---- Constants ----

    /// Load `value` into `rd` in at most four instructions.
    pub fn materialize(&mut self, rd: ArmReg, value: u32) {
        if let Some(imm) = Operand2::encode(value) {
            self.mov(rd, imm);
            return;
        }
        if let Some(imm) = Operand2::encode(!value) {
            self.mvn(rd, imm);
            return;
        }
        if self.caps.armv7 {
            self.movw(rd, value & 0xFFFF);
            if value >> 16 != 0 {
                self.movt(rd, value >> 16);
            }
            return;
        }
        let windows = ByteWindows::of(value);
        let inverse = ByteWindows::of(!value);
        if windows.len().min(inverse.len()) > 2 && self.use_literal_pool {
            self.ldr_literal(rd, value);
        } else if windows.len() <= inverse.len() {
            self.orr_chain(rd, &windows);
        } else {
            self.bic_chain(rd, &inverse);
        }
    }

    /// `MOV rd, w0; ORR rd, rd, w1; ...`
    fn orr_chain(&mut self, rd: ArmReg, windows: &ByteWindows) {
        let mut chunks = windows.iter();
        if let Some(first) = chunks.next() {
            self.mov(rd, first);
        }
        for chunk in chunks {
            self.orr(rd, rd, chunk);
        }
    }

    /// `MVN rd, w0; BIC rd, rd, w1; ...` where `windows` decompose `!value`.
    fn bic_chain(&mut self, rd: ArmReg, windows: &ByteWindows) {
        let mut chunks = windows.iter();
        if let Some(first) = chunks.next() {
            self.mvn(rd, first);
        }
        for chunk in chunks {
            self.bic(rd, rd, chunk);
        }
    }

    /// `rd = rn <op> value`, choosing the cheapest encoding. `scratch` is
    /// clobbered when the value has to be materialized.
    pub fn alu_imm(&mut self, op: DpOp, rd: ArmReg, rn: ArmReg, value: u32, scratch: ArmReg) {
        if op == DpOp::Mov {
            self.materialize(rd, value);
            return;
        }
        if let Some(imm) = Operand2::encode(value) {
            self.dp(Cond::Al, op, false, rd, rn, imm.into());
            return;
        }
        if let Some((alt, kind)) = op.immediate_counterpart() {
            if let Some((imm, transform)) = encode_with_transform(value, kind) {
                debug_assert_ne!(transform, Transform::None);
                self.dp(Cond::Al, alt, false, rd, rn, imm.into());
                return;
            }
        }
        if let Some((chain_op, windows)) = Self::two_step_split(op, value) {
            let mut src = rn;
            for chunk in windows.iter() {
                self.dp(Cond::Al, chain_op, false, rd, src, chunk.into());
                src = rd;
            }
            return;
        }
        debug_assert_ne!(rn, scratch);
        self.materialize(scratch, value);
        self.dp(Cond::Al, op, false, rd, rn, scratch.into());
    }

    /// Two chained immediate operations that together apply `value`.
    fn two_step_split(op: DpOp, value: u32) -> Option<(DpOp, ByteWindows)> {
        let direct = ByteWindows::of(value);
        match op {
            DpOp::Add | DpOp::Sub | DpOp::Orr | DpOp::Eor | DpOp::Bic if direct.len() == 2 => {
                Some((op, direct))
            }
            DpOp::Add | DpOp::Sub => {
                let negated = ByteWindows::of(value.wrapping_neg());
                let alt = if op == DpOp::Add { DpOp::Sub } else { DpOp::Add };
                (negated.len() == 2).then_some((alt, negated))
            }
            DpOp::And => {
                let inverse = ByteWindows::of(!value);
                (inverse.len() == 2).then_some((DpOp::Bic, inverse))
            }
            _ => None,
        }
    }

    /// Compare `rn` against a constant.
    pub fn cmp_imm(&mut self, rn: ArmReg, value: u32, scratch: ArmReg) {
        if let Some((imm, transform)) = encode_with_transform(value, TransformKind::Negation) {
            let op = if transform == Transform::Negated { DpOp::Cmn } else { DpOp::Cmp };
            self.dp(Cond::Al, op, true, ArmReg::R0, rn, imm.into());
            return;
        }
        debug_assert_ne!(rn, scratch);
        self.materialize(scratch, value);
        self.cmp(rn, scratch);
    }

    // ---- Literal pool ----

    /// `LDR rd, [pc, #?]` against a pooled copy of `value`.
    pub fn ldr_literal(&mut self, rd: ArmReg, value: u32) {
        self.pool.add_load(value, self.pos);
        self.ldr(rd, ArmReg::Pc, 0);
    }

    /// Write every pending literal at the cursor and patch its loads.
    pub fn flush_literals(&mut self) -> Result<(), CompileError> {
        for mut entry in self.pool.take() {
            entry.location = self.pos;
            self.emit32(entry.value);
            for &load in &entry.loads {
                let disp = entry.location as i64 - (load as i64 + 8);
                if disp.unsigned_abs() > MAX_LITERAL_DISTANCE as u64 {
                    return Err(CompileError::LiteralOutOfRange { load, slot: entry.location });
                }
                let word = self.read32(load) & !(0x0080_0FFF);
                let up = ((disp >= 0) as u32) << 23;
                self.patch32(load, word | up | disp.unsigned_abs() as u32);
            }
        }
        Ok(())
    }

    /// Flush the pool in the middle of a block, branching around it, when
    /// its oldest load is about to fall out of range.
    pub fn flush_literals_if_needed(&mut self) -> Result<(), CompileError> {
        match self.pool.first_load() {
            Some(first) if self.pos - first > LITERAL_FLUSH_DISTANCE => {
                let skip = self.branch_placeholder(Cond::Al);
                self.flush_literals()?;
                self.resolve_here(skip)
            }
            _ => Ok(()),
        }
    }
}
