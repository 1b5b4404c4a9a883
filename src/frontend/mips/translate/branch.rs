//! Conditional branches and jumps, with their delay slots.
//!
//! A branch is translated together with the instruction after it. The
//! condition is evaluated before the delay slot runs; when the delay slot
//! overwrites a compared register the host flags are saved across it.
//! Every register is written back before a conditional exit so both paths
//! leave the register cache in the same state.

use tracing::trace;

use crate::backend::{Backend, Condition, Operand};
use crate::error::CompileError;
use crate::frontend::mips::decoder::decode;
use crate::frontend::mips::fold;
use crate::frontend::mips::translate::{Flow, Translator};
use crate::frontend::mips::types::{BranchCond, MipsReg};

fn condition(cond: BranchCond) -> Condition {
    match cond {
        BranchCond::Eq => Condition::Equal,
        BranchCond::Ne => Condition::NotEqual,
        BranchCond::Lez => Condition::LessOrEqual,
        BranchCond::Gtz => Condition::Greater,
        BranchCond::Ltz => Condition::Less,
        BranchCond::Gez => Condition::GreaterOrEqual,
    }
}

impl<B: Backend> Translator<'_, B> {
    pub(super) fn branch(
        &mut self,
        cond: BranchCond,
        rs: MipsReg,
        rt: MipsReg,
        offset: i16,
        likely: bool,
        link: bool,
    ) -> Result<Flow, CompileError> {
        if self.delay_slot_needs_escape()? {
            return self.escape_to_interpreter();
        }
        let next = self.pc.wrapping_add(8);
        let target = self.pc.wrapping_add(4).wrapping_add(((offset as i32) << 2) as u32);

        if let (Some(a), Some(b)) = (self.known(rs), self.known(rt)) {
            let taken = fold::branch_taken(cond, a, b);
            trace!(target = format_args!("{target:#010x}"), taken, "branch resolved at compile time");
            if link {
                self.set_const(MipsReg::RA, next);
            }
            if likely && !taken {
                return Ok(Flow::Goto(next));
            }
            self.compile_delay_slot()?;
            return if taken {
                self.follow(target, self.opts.continue_branches)
            } else {
                Ok(Flow::Goto(next))
            };
        }

        let cond = condition(cond);
        if likely {
            // The delay slot only runs on the taken path.
            self.backend.flush_all()?;
            self.compare(rs, rt)?;
            if link {
                self.set_const(MipsReg::RA, next);
                self.backend.flush_all()?;
            }
            let skip = self.backend.branch_if(cond.negate());
            self.compile_delay_slot()?;
            self.backend.flush_all()?;
            self.backend.write_exit(target, self.cycles)?;
            self.backend.resolve_here(skip)?;
            return Ok(Flow::Goto(next));
        }

        let delay = decode(self.fetch_delay_slot()?);
        let clobbers = delay.writes(rs) || delay.writes(rt) || (link && (rs == MipsReg::RA || rt == MipsReg::RA));
        if clobbers {
            self.compare(rs, rt)?;
            self.backend.save_flags();
            if link {
                self.set_const(MipsReg::RA, next);
            }
            self.compile_delay_slot()?;
            self.backend.flush_all()?;
            self.backend.restore_flags();
        } else {
            if link {
                self.set_const(MipsReg::RA, next);
            }
            self.compile_delay_slot()?;
            self.compare(rs, rt)?;
            self.backend.flush_all()?;
        }
        let skip = self.backend.branch_if(cond.negate());
        self.backend.write_exit(target, self.cycles)?;
        self.backend.resolve_here(skip)?;
        Ok(Flow::Goto(next))
    }

    /// Compare `rs` against `rt`, folding whichever side is known.
    fn compare(&mut self, rs: MipsReg, rt: MipsReg) -> Result<(), CompileError> {
        match (self.known(rs), self.known(rt)) {
            (_, Some(b)) => self.backend.compare(rs, Operand::Imm(b)),
            // Only BEQ/BNE compare two registers, and they are symmetric.
            (Some(a), None) => self.backend.compare(rt, Operand::Imm(a)),
            (None, None) => self.backend.compare(rs, Operand::Reg(rt)),
        }
    }

    pub(super) fn jump(&mut self, index: u32, link: bool) -> Result<Flow, CompileError> {
        if self.delay_slot_needs_escape()? {
            return self.escape_to_interpreter();
        }
        let target = (self.pc.wrapping_add(4) & 0xF000_0000) | (index << 2);
        if link {
            self.set_const(MipsReg::RA, self.pc.wrapping_add(8));
        }
        self.compile_delay_slot()?;
        self.follow(target, self.opts.continue_jumps)
    }

    pub(super) fn jump_reg(&mut self, rs: MipsReg, rd: MipsReg) -> Result<Flow, CompileError> {
        if self.delay_slot_needs_escape()? {
            return self.escape_to_interpreter();
        }
        let next = self.pc.wrapping_add(8);
        match self.known(rs) {
            Some(target) => {
                self.set_const(rd, next);
                self.compile_delay_slot()?;
                self.backend.flush_all()?;
                self.backend.write_exit(target, self.cycles)?;
            }
            None => {
                // Latch the target before the link or the delay slot can change rs.
                self.backend.store_branch_target(rs)?;
                self.set_const(rd, next);
                self.compile_delay_slot()?;
                self.backend.flush_all()?;
                self.backend.write_exit_to_branch_target(self.cycles)?;
            }
        }
        Ok(Flow::Done)
    }
}
