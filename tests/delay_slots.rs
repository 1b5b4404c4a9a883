mod common;

use common::asm::*;
use common::*;
use rmipsjit::{CpuCapabilities, GuestContext, OptimizationFlag};

const CONFIGS: [OptimizationFlag; 3] = [
    OptimizationFlag::ALL_OPTIMIZATIONS,
    OptimizationFlag::BLOCK_LINKING,
    OptimizationFlag::NO_OPTIMIZATIONS,
];

fn check(program: &[u32], init: impl Fn(&mut GuestContext) + Copy, setup: impl Fn(&mut Machine) + Copy) {
    for flags in CONFIGS {
        for caps in [CpuCapabilities::armv6(), CpuCapabilities::armv7_idiv()] {
            assert_matches_reference(program, init, setup, |c| {
                c.optimizations = flags;
                c.capabilities = caps;
            });
        }
    }
}

fn regs(values: &'static [(u32, u32)]) -> impl Fn(&mut GuestContext) + Copy {
    move |ctx| {
        for &(r, v) in values {
            ctx.gpr[r as usize] = v;
        }
    }
}

fn no_setup(_: &mut Machine) {}

#[test]
fn test_delay_slot_overwrites_compared_register() {
    // Taken: t0 == t1 before the delay slot changes t0
    let program = [beq(T0, T1, 2), addiu(T0, T0, 5), addiu(V0, ZERO, 1), addiu(V1, ZERO, 1), break_()];
    check(&program, regs(&[(T0, 3), (T1, 3)]), no_setup);
    // Not taken, even though the delay slot makes them equal
    check(&program, regs(&[(T0, 3), (T1, 8)]), no_setup);
}

#[test]
fn test_delay_slot_with_memory_access() {
    // The load calls out to the host between the compare and the branch
    let program = [bne(A0, A1, 2), lw(A0, S0, 0), addiu(V0, ZERO, 1), addiu(V1, A0, 1), break_()];
    let setup = |m: &mut Machine| m.write32(DATA, 77);
    check(&program, regs(&[(A0, 1), (A1, 2), (S0, DATA)]), setup);
    check(&program, regs(&[(A0, 2), (A1, 2), (S0, DATA)]), setup);
}

#[test]
fn test_delay_slot_falls_back_to_interpreter() {
    // DIV on armv6 without idiv is interpreted inside the delay slot
    let program = [bgez(A0, 2), div(A0, A1), mflo(V0), mfhi(V1), break_()];
    check(&program, regs(&[(A0, 17), (A1, 5)]), no_setup);
    check(&program, regs(&[(A0, (-17i32) as u32), (A1, 5)]), no_setup);
}

#[test]
fn test_likely_branches() {
    let program = [
        beql(A0, A1, 2),
        addiu(V0, V0, 1),
        addiu(V1, ZERO, 1),
        bltzl(A2, 2),
        addiu(V0, V0, 0x10),
        addiu(T0, ZERO, 1),
        blezl(A3, 2),
        addiu(V0, V0, 0x100),
        addiu(T1, ZERO, 1),
        bgtzl(A3, 2),
        addiu(V0, V0, 0x1000),
        addiu(T2, ZERO, 1),
        bgezl(A2, 2),
        addiu(V0, V0, -0x100),
        addiu(T3, ZERO, 1),
        break_(),
    ];
    check(&program, regs(&[(A0, 1), (A1, 1), (A2, 0xFFFF_FFF0), (A3, 0)]), no_setup);
    check(&program, regs(&[(A0, 1), (A1, 2), (A2, 4), (A3, 9)]), no_setup);
}

#[test]
fn test_link_is_visible_in_delay_slot() {
    let mut program = vec![NOP; 20];
    program[..4].copy_from_slice(&[bgezal(A0, 15), addu(V0, RA, ZERO), addiu(V1, ZERO, 1), break_()]);
    program[16] = break_();
    check(&program, regs(&[(A0, 0)]), no_setup);
    check(&program, regs(&[(A0, 0x8000_0000)]), no_setup);

    // jalr links into an arbitrary register
    let mut program = vec![NOP; 20];
    program[..3].copy_from_slice(&[jalr(S1, T9), addu(V0, S1, ZERO), break_()]);
    program[16] = addu(V1, S1, ZERO);
    program[17] = break_();
    check(&program, regs(&[(T9, BASE + 0x40)]), no_setup);
}

#[test]
fn test_jump_register_target_latched_before_delay_slot() {
    let mut program = vec![NOP; 20];
    program[..3].copy_from_slice(&[jr(T0), addiu(T0, ZERO, 0), break_()]);
    program[16] = addiu(V0, T0, 1);
    program[17] = break_();
    check(&program, regs(&[(T0, BASE + 0x40)]), no_setup);
}

#[test]
fn test_branch_in_delay_slot_goes_to_interpreter() {
    let mut program = vec![NOP; 24];
    program[..3].copy_from_slice(&[beq(A0, A1, 7), j(BASE + 0x50), break_()]);
    program[8] = addiu(V0, ZERO, 1);
    program[9] = break_();
    check(&program, regs(&[(A0, 4), (A1, 4)]), no_setup);
    check(&program, regs(&[(A0, 4), (A1, 5)]), no_setup);

    let h = assert_matches_reference(&program, regs(&[(A0, 4), (A1, 4)]), no_setup, |_| {});
    assert_eq!(h.machine().interpreted, vec![(BASE, program[0])]);
}

#[test]
fn test_syscall_in_delay_slot_goes_to_interpreter() {
    let program = [j(BASE + 12), syscall(9), addiu(V0, ZERO, 1), addiu(V1, ZERO, 2), break_()];
    let mut h = Harness::new(&program, |_| {});
    h.run_to_halt();
    let m = h.machine();
    assert_eq!(m.interpreted, vec![(BASE, program[0])]);
    assert_eq!(m.syscalls, vec![(9, BASE + 12)]);
    drop(m);
    assert_eq!(h.jit.context().gpr[V0 as usize], 0);
    assert_eq!(h.jit.context().gpr[V1 as usize], 2);
}

#[test]
fn test_coprocessor_branches() {
    let program = [bc1t(2), addiu(V0, ZERO, 1), addiu(V1, ZERO, 1), bc1f(2), addiu(T0, ZERO, 1), addiu(T1, ZERO, 1), break_()];
    for cond in [false, true] {
        let setup = move |m: &mut Machine| m.fpu_cond = cond;
        check(&program, |_| {}, setup);
    }
    let h = assert_matches_reference(&program, |_| {}, |m| m.fpu_cond = true, |_| {});
    let pcs: Vec<u32> = h.machine().interpreted.iter().map(|&(pc, _)| pc).collect();
    assert_eq!(pcs, vec![BASE, BASE + 12]);
}
