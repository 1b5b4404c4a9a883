//! Block entry, exits, linking and invalidation.
//!
//! Block layout:
//!
//! ```text
//! checked_entry:
//!     ldr   r0, [r10, #downcount]
//!     cmp   r0, #0
//!     bgt   normal_entry
//!     <r0 = block start>
//!     str   r0, [r10, #pc]
//!     b     return_from_run_code
//! normal_entry:
//!     <body>
//! exit:
//!     <downcount -= cycles>
//!     nop | b target.checked_entry      ; patch slot
//!     <r0 = target>
//!     str   r0, [r10, #pc]
//!     b     return_from_run_code
//! ```
//!
//! Linked exits enter the next block through its checked entry, so a chain
//! of linked blocks still returns to the dispatcher once the cycle budget
//! runs out. Checked entries are also the only places the executor yields,
//! since no guest register is held in a host register there.

use tracing::{debug, info, trace};

use crate::backend::arm::block_cache::{BlockExit, CompiledBlock};
use crate::backend::arm::emitter::{encode_branch, Cond, DpOp, Fixup, NOP};
use crate::backend::arm::hostloc::{CTX_REG, SCRATCH1, SCRATCH2};
use crate::backend::arm::jit_state::GuestContext;
use crate::backend::arm::{ArmBackend, BlockInProgress};
use crate::backend::{Condition, MapFlags, Operand};
use crate::error::CompileError;
use crate::frontend::mips::types::MipsReg;

fn host_cond(cond: Condition) -> Cond {
    match cond {
        Condition::Equal => Cond::Eq,
        Condition::NotEqual => Cond::Ne,
        Condition::LessOrEqual => Cond::Le,
        Condition::Greater => Cond::Gt,
        Condition::Less => Cond::Lt,
        Condition::GreaterOrEqual => Cond::Ge,
    }
}

impl ArmBackend {
    // ---- Block lifecycle ----

    pub(super) fn begin(&mut self, start: u32) -> Result<(), CompileError> {
        debug_assert!(self.current.is_none(), "block already in progress");
        self.regs.start();
        let labels = self.code.labels();
        let e = &mut self.code.emitter;
        let checked_entry = e.offset();

        e.ldr(SCRATCH1, CTX_REG, GuestContext::offset_of_downcount() as i32);
        e.cmp_imm(SCRATCH1, 0, SCRATCH2);
        let has_budget = e.branch_placeholder(Cond::Gt);
        e.materialize(SCRATCH1, start);
        e.str(SCRATCH1, CTX_REG, GuestContext::offset_of_pc() as i32);
        e.b(Cond::Al, labels.return_from_run_code)?;
        e.resolve_here(has_budget)?;

        let normal_entry = e.offset();
        self.current = Some(BlockInProgress { start, checked_entry, normal_entry, exits: Vec::new() });
        Ok(())
    }

    pub(super) fn finish(&mut self, first: u32, last: u32) -> Result<(), CompileError> {
        if self.current.is_none() {
            return Ok(());
        }
        debug_assert_eq!(self.regs.mapped_count(), 0, "registers still mapped at block end");
        // On failure the block stays in progress so abandon() can rewind it.
        let e = &mut self.code.emitter;
        if e.pending_fixups() != 0 {
            return Err(CompileError::UnresolvedFixups(e.pending_fixups()));
        }
        e.flush_literals()?;
        if e.is_full() {
            return Err(CompileError::CodeBufferFull { used: e.offset(), capacity: e.capacity() });
        }
        let Some(block) = self.current.take() else {
            return Ok(());
        };
        let e = &mut self.code.emitter;
        let end = e.offset();
        e.flush_icache(block.checked_entry, end);

        let compiled = CompiledBlock {
            start: block.start,
            checked_entry: block.checked_entry,
            normal_entry: block.normal_entry,
            size: end - block.checked_entry,
            guest_first: first,
            guest_last: last,
            exits: block.exits,
        };
        debug!(
            start = format_args!("{:#010x}", compiled.start),
            size = compiled.size,
            exits = compiled.exits.len(),
            "compiled block"
        );
        let start = compiled.start;
        let checked_entry = compiled.checked_entry;
        self.blocks.insert(compiled);
        if self.config.block_linking {
            self.link_waiting_exits(start, checked_entry)?;
        }
        Ok(())
    }

    pub(super) fn abandon(&mut self) {
        if let Some(block) = self.current.take() {
            debug!(start = format_args!("{:#010x}", block.start), "abandoning block");
            self.patches.remove_owner(block.start);
            self.code.emitter.rewind(block.checked_entry);
        }
        self.regs.start();
    }

    // ---- Linking ----

    /// Point every exit waiting on `target` at its new checked entry.
    fn link_waiting_exits(&mut self, target: u32, checked_entry: usize) -> Result<(), CompileError> {
        let sites = self.patches.sites_for(target).to_vec();
        for site in sites {
            let word = encode_branch(Cond::Al, false, site.slot, checked_entry)?;
            self.code.emitter.patch32(site.slot, word);
            self.code.emitter.flush_icache(site.slot, site.slot + 4);
            set_linked(self.blocks.get_mut(site.owner).map(|b| &mut b.exits), site.slot, true);
            trace!(slot = site.slot, target = format_args!("{target:#010x}"), "linked exit");
        }
        Ok(())
    }

    /// Drop every block overlapping `[start, start + len)` and unlink the
    /// exits that jumped into them.
    pub fn invalidate_range(&mut self, start: u32, len: u32) {
        let removed = self.blocks.take_overlapping(start, len);
        for block in &removed {
            let sites = self.patches.sites_for(block.start).to_vec();
            for site in sites {
                self.code.emitter.patch32(site.slot, NOP);
                self.code.emitter.flush_icache(site.slot, site.slot + 4);
                set_linked(self.blocks.get_mut(site.owner).map(|b| &mut b.exits), site.slot, false);
            }
            self.patches.remove_owner(block.start);
        }
        if !removed.is_empty() {
            debug!(
                start = format_args!("{start:#010x}"),
                len,
                blocks = removed.len(),
                "invalidated guest code"
            );
        }
    }

    /// Forget every compiled block and reuse the whole code buffer.
    pub fn clear_cache(&mut self) {
        info!(blocks = self.blocks.len(), "clearing block cache");
        self.current = None;
        self.blocks.clear();
        self.patches.clear();
        self.regs.start();
        self.code.clear_cache();
    }

    // ---- Exits ----

    fn emit_charge_cycles(&mut self, cycles: u32) {
        if !self.config.enable_cycle_counting || cycles == 0 {
            return;
        }
        let e = &mut self.code.emitter;
        let offset = GuestContext::offset_of_downcount() as i32;
        e.ldr(SCRATCH1, CTX_REG, offset);
        e.alu_imm(DpOp::Sub, SCRATCH1, SCRATCH1, cycles, SCRATCH2);
        e.str(SCRATCH1, CTX_REG, offset);
    }

    /// `b return_from_run_code`, with `ctx.pc` already set.
    fn emit_return_to_dispatcher(&mut self) -> Result<(), CompileError> {
        let target = self.code.labels().return_from_run_code;
        self.code.emitter.b(Cond::Al, target)
    }

    pub(super) fn emit_exit(&mut self, target: u32, cycles: u32) -> Result<(), CompileError> {
        debug_assert_eq!(self.regs.mapped_count(), 0, "exit with registers still mapped");
        self.emit_charge_cycles(cycles);

        if self.config.block_linking {
            let slot = self.code.emitter.offset();
            let linked = match self.blocks.get(target) {
                Some(block) => {
                    let checked_entry = block.checked_entry;
                    self.code.emitter.b(Cond::Al, checked_entry)?;
                    true
                }
                None => {
                    self.code.emitter.nop();
                    false
                }
            };
            if let Some(block) = self.current.as_mut() {
                block.exits.push(BlockExit { target, slot, linked });
                self.patches.add(target, block.start, slot);
            }
            trace!(target = format_args!("{target:#010x}"), slot, linked, "exit");
        }

        let e = &mut self.code.emitter;
        e.materialize(SCRATCH1, target);
        e.str(SCRATCH1, CTX_REG, GuestContext::offset_of_pc() as i32);
        self.emit_return_to_dispatcher()
    }

    pub(super) fn emit_exit_to_branch_target(&mut self, cycles: u32) -> Result<(), CompileError> {
        self.emit_charge_cycles(cycles);
        let e = &mut self.code.emitter;
        e.ldr(SCRATCH1, CTX_REG, GuestContext::offset_of_branch_target() as i32);
        e.str(SCRATCH1, CTX_REG, GuestContext::offset_of_pc() as i32);
        self.emit_return_to_dispatcher()
    }

    pub(super) fn emit_exit_to_pc(&mut self, cycles: u32) -> Result<(), CompileError> {
        self.emit_charge_cycles(cycles);
        self.emit_return_to_dispatcher()
    }

    // ---- Guest branches ----

    pub(super) fn emit_compare(&mut self, lhs: MipsReg, rhs: Operand) -> Result<(), CompileError> {
        match rhs {
            Operand::Imm(value) => {
                let l = self.map(lhs, MapFlags::LOAD)?;
                self.code.emitter.cmp_imm(l, value, SCRATCH1);
            }
            Operand::Reg(r) => {
                let l = self.regs.map_pinned(&mut self.code.emitter, lhs, MapFlags::LOAD)?;
                let r = self.regs.map_pinned(&mut self.code.emitter, r, MapFlags::LOAD)?;
                self.regs.unpin_all();
                self.code.emitter.cmp(l, r);
            }
        }
        Ok(())
    }

    pub(super) fn emit_branch_if(&mut self, cond: Condition) -> Fixup {
        self.code.emitter.branch_placeholder(host_cond(cond))
    }

    pub(super) fn emit_save_flags(&mut self) {
        let e = &mut self.code.emitter;
        e.mrs(SCRATCH1);
        e.str(SCRATCH1, CTX_REG, GuestContext::offset_of_saved_flags() as i32);
    }

    pub(super) fn emit_restore_flags(&mut self) {
        let e = &mut self.code.emitter;
        e.ldr(SCRATCH1, CTX_REG, GuestContext::offset_of_saved_flags() as i32);
        e.msr_flags(SCRATCH1);
    }

    pub(super) fn emit_store_branch_target(&mut self, src: MipsReg) -> Result<(), CompileError> {
        let offset = GuestContext::offset_of_branch_target() as i32;
        match self.regs.known(src) {
            Some(value) => {
                let e = &mut self.code.emitter;
                e.materialize(SCRATCH1, value);
                e.str(SCRATCH1, CTX_REG, offset);
            }
            None => {
                let s = self.map(src, MapFlags::LOAD)?;
                self.code.emitter.str(s, CTX_REG, offset);
            }
        }
        Ok(())
    }
}

fn set_linked(exits: Option<&mut Vec<BlockExit>>, slot: usize, linked: bool) {
    if let Some(exit) = exits.and_then(|exits| exits.iter_mut().find(|x| x.slot == slot)) {
        exit.linked = linked;
    }
}
