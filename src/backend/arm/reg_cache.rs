use tracing::warn;

use crate::backend::arm::emitter::ArmEmitter;
use crate::backend::arm::hostloc::{ArmReg, ALLOCATION_ORDER, CTX_REG, SCRATCH1};
use crate::backend::arm::jit_state::GuestContext;
use crate::backend::MapFlags;
use crate::error::CompileError;
use crate::frontend::mips::types::{MipsReg, NUM_GUEST_REGS};

const NUM_PHYS: usize = ALLOCATION_ORDER.len();

// ---------------------------------------------------------------------------
// Slot state
// ---------------------------------------------------------------------------

/// Where the current value of a guest register lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegLocation {
    /// Only in the guest context.
    InMemory,
    /// In the physical slot with this index (into [`ALLOCATION_ORDER`]).
    InPhysical(usize),
    /// Known at compile time; written to the context when flushed.
    Immediate(u32),
}

#[derive(Debug, Clone, Copy)]
struct VirtualSlot {
    loc: RegLocation,
    locked: bool,
}

#[derive(Debug, Clone, Copy)]
struct PhysicalSlot {
    reg: ArmReg,
    /// Guest register currently held, if any.
    guest: Option<MipsReg>,
    /// Holds a value newer than the context copy.
    dirty: bool,
    /// Pinned for the current instruction sequence.
    alloc_locked: bool,
}

fn ctx_offset(reg: MipsReg) -> i32 {
    GuestContext::offset_of_reg(reg) as i32
}

// ---------------------------------------------------------------------------
// RegCache
// ---------------------------------------------------------------------------

/// Caches guest registers in host registers for the duration of one block.
///
/// Virtual and physical slots refer to each other by index only. A bit set
/// of free physical slots, lowest bit first, gives the allocation priority
/// of [`ALLOCATION_ORDER`].
pub struct RegCache {
    virt: [VirtualSlot; NUM_GUEST_REGS],
    phys: [PhysicalSlot; NUM_PHYS],
    free: u16,
}

impl RegCache {
    pub fn new() -> Self {
        let phys = ALLOCATION_ORDER.map(|reg| PhysicalSlot {
            reg,
            guest: None,
            dirty: false,
            alloc_locked: false,
        });
        let mut cache = Self {
            virt: [VirtualSlot { loc: RegLocation::InMemory, locked: false }; NUM_GUEST_REGS],
            phys,
            free: 0,
        };
        cache.start();
        cache
    }

    /// Reset every slot for a new block: nothing cached, `zero` known.
    pub fn start(&mut self) {
        for slot in self.virt.iter_mut() {
            *slot = VirtualSlot { loc: RegLocation::InMemory, locked: false };
        }
        self.virt[MipsReg::ZERO.index()].loc = RegLocation::Immediate(0);
        for slot in self.phys.iter_mut() {
            slot.guest = None;
            slot.dirty = false;
            slot.alloc_locked = false;
        }
        self.free = (1 << NUM_PHYS) - 1;
    }

    pub fn location(&self, reg: MipsReg) -> RegLocation {
        self.virt[reg.index()].loc
    }

    /// The compile-time value of `reg`, if it has one.
    pub fn known(&self, reg: MipsReg) -> Option<u32> {
        match self.virt[reg.index()].loc {
            RegLocation::Immediate(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_imm(&self, reg: MipsReg) -> bool {
        self.known(reg).is_some()
    }

    /// Value of an immediate register. Only meaningful when [`Self::is_imm`] holds.
    pub fn get_imm(&self, reg: MipsReg) -> u32 {
        debug_assert!(self.is_imm(reg), "{reg} is not an immediate");
        self.known(reg).unwrap_or(0)
    }

    /// Record that `reg` now holds `value`, dropping any host copy.
    pub fn set_imm(&mut self, reg: MipsReg, value: u32) {
        if reg.is_zero() {
            return;
        }
        if let RegLocation::InPhysical(p) = self.virt[reg.index()].loc {
            self.release(p);
        }
        self.virt[reg.index()].loc = RegLocation::Immediate(value);
    }

    pub fn lock(&mut self, reg: MipsReg) {
        self.virt[reg.index()].locked = true;
    }

    pub fn unlock(&mut self, reg: MipsReg) {
        self.virt[reg.index()].locked = false;
    }

    pub fn is_locked(&self, reg: MipsReg) -> bool {
        self.virt[reg.index()].locked
    }

    /// Number of physical registers currently holding a guest register.
    pub fn mapped_count(&self) -> usize {
        NUM_PHYS - self.free.count_ones() as usize
    }

    // ---- Mapping ----

    /// Bring `reg` into a host register.
    ///
    /// With `LOAD` the host register holds the current value afterwards;
    /// with `DIRTY` the caller is about to write it.
    pub fn map(&mut self, e: &mut ArmEmitter, reg: MipsReg, flags: MapFlags) -> Result<ArmReg, CompileError> {
        let index = reg.index();
        if let RegLocation::InPhysical(p) = self.virt[index].loc {
            self.phys[p].dirty |= flags.contains(MapFlags::DIRTY);
            return Ok(self.phys[p].reg);
        }
        let p = self.allocate(e)?;
        let host = self.phys[p].reg;
        let dirty = match self.virt[index].loc {
            RegLocation::Immediate(value) => {
                if flags.contains(MapFlags::LOAD) {
                    e.materialize(host, value);
                }
                // The context copy is stale unless this is `zero`.
                !reg.is_zero()
            }
            _ => {
                if flags.contains(MapFlags::LOAD) {
                    e.ldr(host, CTX_REG, ctx_offset(reg));
                }
                flags.contains(MapFlags::DIRTY)
            }
        };
        debug_assert!(!(reg.is_zero() && flags.contains(MapFlags::DIRTY)), "zero mapped for writing");
        self.phys[p].guest = Some(reg);
        self.phys[p].dirty = dirty;
        self.virt[index].loc = RegLocation::InPhysical(p);
        Ok(host)
    }

    /// Map `src` for reading and `dst` for writing. `dst` keeps its old
    /// value when it aliases `src`.
    pub fn map_binary(
        &mut self,
        e: &mut ArmEmitter,
        dst: MipsReg,
        src: MipsReg,
    ) -> Result<(ArmReg, ArmReg), CompileError> {
        let s = self.map_pinned(e, src, MapFlags::LOAD)?;
        let d = self.map_pinned(e, dst, Self::dest_flags(dst, &[src]))?;
        self.unpin_all();
        Ok((d, s))
    }

    /// Map `a` and `b` for reading and `dst` for writing.
    pub fn map_ternary(
        &mut self,
        e: &mut ArmEmitter,
        dst: MipsReg,
        a: MipsReg,
        b: MipsReg,
    ) -> Result<(ArmReg, ArmReg, ArmReg), CompileError> {
        let ra = self.map_pinned(e, a, MapFlags::LOAD)?;
        let rb = self.map_pinned(e, b, MapFlags::LOAD)?;
        let rd = self.map_pinned(e, dst, Self::dest_flags(dst, &[a, b]))?;
        self.unpin_all();
        Ok((rd, ra, rb))
    }

    fn dest_flags(dst: MipsReg, sources: &[MipsReg]) -> MapFlags {
        if sources.contains(&dst) {
            MapFlags::LOAD | MapFlags::DIRTY
        } else {
            MapFlags::DIRTY
        }
    }

    /// Map and pin a register so later maps in the same sequence cannot evict it.
    pub fn map_pinned(&mut self, e: &mut ArmEmitter, reg: MipsReg, flags: MapFlags) -> Result<ArmReg, CompileError> {
        let host = self.map(e, reg, flags)?;
        if let RegLocation::InPhysical(p) = self.virt[reg.index()].loc {
            self.phys[p].alloc_locked = true;
        }
        Ok(host)
    }

    /// Release every allocation pin.
    pub fn unpin_all(&mut self) {
        for slot in self.phys.iter_mut() {
            slot.alloc_locked = false;
        }
    }

    /// Take a physical slot, evicting an unlocked register if none is free.
    fn allocate(&mut self, e: &mut ArmEmitter) -> Result<usize, CompileError> {
        if self.free != 0 {
            let p = self.free.trailing_zeros() as usize;
            self.free &= !(1 << p);
            return Ok(p);
        }
        let victim = (0..NUM_PHYS).find(|&p| {
            let slot = &self.phys[p];
            !slot.alloc_locked && slot.guest.is_some_and(|g| !self.virt[g.index()].locked)
        });
        let p = victim.ok_or(CompileError::OutOfRegisters)?;
        if let Some(guest) = self.phys[p].guest {
            self.flush_reg(e, guest);
        }
        self.free &= !(1 << p);
        Ok(p)
    }

    fn release(&mut self, p: usize) {
        let slot = &mut self.phys[p];
        slot.guest = None;
        slot.dirty = false;
        slot.alloc_locked = false;
        self.free |= 1 << p;
    }

    // ---- Write-back ----

    /// Write `reg` back to the context and forget its cached location.
    pub fn flush_reg(&mut self, e: &mut ArmEmitter, reg: MipsReg) {
        let index = reg.index();
        match self.virt[index].loc {
            RegLocation::InMemory => {}
            RegLocation::InPhysical(p) => {
                if self.phys[p].dirty && !reg.is_zero() {
                    e.str(self.phys[p].reg, CTX_REG, ctx_offset(reg));
                }
                self.release(p);
                self.virt[index].loc = Self::resting_location(reg);
            }
            RegLocation::Immediate(value) => {
                if !reg.is_zero() {
                    e.materialize(SCRATCH1, value);
                    e.str(SCRATCH1, CTX_REG, ctx_offset(reg));
                    self.virt[index].loc = RegLocation::InMemory;
                }
            }
        }
    }

    /// Write back every cached register. A second call emits nothing.
    pub fn flush_all(&mut self, e: &mut ArmEmitter) {
        for reg in MipsReg::all() {
            self.flush_reg(e, reg);
        }
    }

    /// Write back registers held in caller-saved host registers.
    pub fn flush_volatile(&mut self, e: &mut ArmEmitter) {
        for p in 0..NUM_PHYS {
            if let (true, Some(guest)) = (self.phys[p].reg.is_caller_saved(), self.phys[p].guest) {
                self.flush_reg(e, guest);
            }
        }
    }

    /// Drop the cached copy of `reg` without writing it back.
    pub fn discard(&mut self, reg: MipsReg) {
        let index = reg.index();
        if let RegLocation::InPhysical(p) = self.virt[index].loc {
            self.release(p);
        }
        self.virt[index].loc = Self::resting_location(reg);
    }

    fn resting_location(reg: MipsReg) -> RegLocation {
        if reg.is_zero() { RegLocation::Immediate(0) } else { RegLocation::InMemory }
    }

    /// Verify no lock leaked past an instruction boundary.
    ///
    /// Debug builds report the first offender; release builds log it and
    /// release every lock so compilation can continue.
    pub fn sanity_check(&mut self) -> Result<(), CompileError> {
        let leaked = MipsReg::all().find(|r| self.virt[r.index()].locked);
        let pinned = self.phys.iter().find(|p| p.alloc_locked).map(|p| p.guest.unwrap_or(MipsReg::ZERO));
        let Some(offender) = leaked.or(pinned) else {
            return Ok(());
        };
        if cfg!(debug_assertions) {
            return Err(CompileError::UnbalancedLock(offender.index() as u8));
        }
        warn!(reg = %offender, "register lock leaked past instruction boundary, releasing");
        for slot in self.virt.iter_mut() {
            slot.locked = false;
        }
        self.unpin_all();
        Ok(())
    }
}

impl Default for RegCache {
    fn default() -> Self {
        Self::new()
    }
}
