//! Instructions without a fast path on the host go through
//! `JitCallbacks::interpret_instruction` with every register written back.

mod common;

use common::asm::*;
use common::*;
use rmipsjit::{CpuCapabilities, GuestContext};

fn inputs(ctx: &mut GuestContext) {
    ctx.gpr[A0 as usize] = 0x8765_4321;
    ctx.gpr[A1 as usize] = 7;
    ctx.gpr[A2 as usize] = 0x00F0_0F0F;
}

fn interpreted_ops(h: &Harness) -> Vec<u32> {
    h.machine().interpreted.iter().map(|&(_, op)| op).collect()
}

#[test]
fn test_armv6_interprets_divide_and_bit_ops() {
    let program = [
        // Dirty a register right before each fallback
        addiu(T0, A1, 1),
        div(A0, A1),
        mflo(V0),
        mfhi(V1),
        addu(T1, T0, V0),
        ins(A2, T1, 4, 8),
        bitrev(T2, A2),
        divu(A0, T0),
        mflo(T3),
        break_(),
    ];
    let h = assert_matches_reference(&program, inputs, |_| {}, |c| c.capabilities = CpuCapabilities::armv6());
    assert_eq!(interpreted_ops(&h), vec![program[1], program[5], program[6], program[7]]);

    // ARMv7 with idiv handles all of them inline
    let h = assert_matches_reference(&program, inputs, |_| {}, |c| c.capabilities = CpuCapabilities::armv7_idiv());
    assert!(h.machine().interpreted.is_empty());

    // Without idiv only the divides fall back
    let h = assert_matches_reference(&program, inputs, |_| {}, |c| c.capabilities = CpuCapabilities::armv7());
    assert_eq!(interpreted_ops(&h), vec![program[1], program[7]]);
}

#[test]
fn test_interpreter_sees_pc_of_instruction() {
    let program = [addiu(T0, ZERO, 5), cache(0x14, A0, 0), addiu(T1, T0, 1), cache(0x18, A0, 0x40), break_()];
    let h = assert_matches_reference(&program, inputs, |_| {}, |_| {});
    assert_eq!(h.machine().interpreted, vec![(BASE + 4, program[1]), (BASE + 12, program[3])]);
    assert_eq!(h.jit.context().gpr[T1 as usize], 6);
}

#[test]
fn test_interpreter_writes_are_visible_to_compiled_code() {
    // The interpreted INS result feeds the next compiled instruction
    let program = [lui(T0, 0x1234), ins(T0, A1, 0, 4), addiu(V0, T0, 1), break_()];
    let h = assert_matches_reference(&program, inputs, |_| {}, |c| c.capabilities = CpuCapabilities::armv6());
    assert_eq!(h.jit.context().gpr[V0 as usize], 0x1234_0008);
}

#[test]
fn test_known_divisor_avoids_fallback() {
    // A power-of-two divisor compiles to shifts even without idiv
    let program = [addiu(T0, ZERO, 8), div(A0, T0), mflo(V0), mfhi(V1), divu(A0, T0), mflo(T1), mfhi(T2), break_()];
    let h = assert_matches_reference(&program, inputs, |_| {}, |c| c.capabilities = CpuCapabilities::armv6());
    assert!(h.machine().interpreted.is_empty());
}
