//! Whole programs run through the public API and checked against the
//! reference interpreter.

mod common;

use common::asm::*;
use common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rmipsjit::{CpuCapabilities, HaltReason, OptimizationFlag};

const CAPS: [CpuCapabilities; 3] = [CpuCapabilities::armv6(), CpuCapabilities::armv7(), CpuCapabilities::armv7_idiv()];

fn sum_loop() -> Vec<u32> {
    vec![
        addiu(T0, ZERO, 0),
        addu(T0, T0, A0),
        addiu(A0, A0, -1),
        bgtz(A0, -3),
        NOP,
        break_(),
    ]
}

#[test]
fn test_sum_loop() {
    for caps in CAPS {
        let h = assert_matches_reference(&sum_loop(), |ctx| ctx.gpr[A0 as usize] = 100, |_| {}, |c| c.capabilities = caps);
        assert_eq!(h.jit.context().gpr[T0 as usize], 5050);
        assert_eq!(h.jit.pc(), BASE + 24);
    }
}

#[test]
fn test_sum_loop_without_optimizations() {
    let h = assert_matches_reference(
        &sum_loop(),
        |ctx| ctx.gpr[A0 as usize] = 37,
        |_| {},
        |c| c.optimizations = OptimizationFlag::NO_OPTIMIZATIONS,
    );
    assert_eq!(h.jit.context().gpr[T0 as usize], 37 * 38 / 2);
}

#[test]
fn test_memcpy() {
    let program = [
        lw(T0, A0, 0),
        addiu(A2, A2, -1),
        sw(T0, A1, 0),
        addiu(A0, A0, 4),
        bne(A2, ZERO, -5),
        addiu(A1, A1, 4),
        break_(),
    ];
    let mut rng = StdRng::seed_from_u64(7);
    let words: Vec<u32> = (0..64).map(|_| rng.gen()).collect();
    for caps in CAPS {
        let h = assert_matches_reference(
            &program,
            |ctx| {
                ctx.gpr[A0 as usize] = DATA;
                ctx.gpr[A1 as usize] = DATA + 0x1000;
                ctx.gpr[A2 as usize] = words.len() as u32;
            },
            |m| m.load(DATA, &words),
            |c| c.capabilities = caps,
        );
        let m = h.machine();
        for (i, &w) in words.iter().enumerate() {
            assert_eq!(m.read32(DATA + 0x1000 + 4 * i as u32), w);
        }
    }
}

#[test]
fn test_call_and_return() {
    let mut program = vec![NOP; 24];
    program[..5].copy_from_slice(&[addiu(A0, ZERO, 7), jal(BASE + 0x40), addiu(A1, ZERO, 6), addu(S0, V0, ZERO), break_()]);
    program[16..20].copy_from_slice(&[mult(A0, A1), mflo(V0), jr(RA), addiu(V0, V0, 1)]);
    for caps in CAPS {
        let h = assert_matches_reference(&program, |_| {}, |_| {}, |c| c.capabilities = caps);
        assert_eq!(h.jit.context().gpr[S0 as usize], 43);
        assert_eq!(h.jit.context().gpr[RA as usize], BASE + 12);
    }
}

#[test]
fn test_string_length() {
    // v0 = strlen(a0)
    let program = [
        addu(V0, ZERO, ZERO),
        lbu(T0, A0, 0),
        addiu(A0, A0, 1),
        bnel(T0, ZERO, -3),
        addiu(V0, V0, 1),
        break_(),
    ];
    let text = b"just in time\0";
    let h = assert_matches_reference(
        &program,
        |ctx| ctx.gpr[A0 as usize] = DATA,
        |m| {
            for (i, &b) in text.iter().enumerate() {
                m.write8(DATA + i as u32, b);
            }
        },
        |_| {},
    );
    assert_eq!(h.jit.context().gpr[V0 as usize], 12);
}

#[test]
fn test_random_straight_line_arithmetic() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..8 {
        let inputs: Vec<u32> = (0..4).map(|_| rng.gen()).collect();
        let program = [
            addu(T0, A0, A1),
            subu(T1, A2, A3),
            xor(T2, T0, T1),
            sra(T3, T2, 7),
            sltu(S0, T3, A0),
            mult(T2, A3),
            mfhi(S1),
            madd(A0, A1),
            mflo(V0),
            divu(A2, A3),
            mfhi(V1),
            max(T0, V0, V1),
            rotr(T1, T0, 13),
            seh(T2, T1),
            sw(T2, SP, 0),
            lh(T3, SP, 2),
            break_(),
        ];
        for caps in CAPS {
            assert_matches_reference(
                &program,
                |ctx| {
                    for (i, &v) in inputs.iter().enumerate() {
                        ctx.gpr[A0 as usize + i] = v;
                    }
                    ctx.gpr[SP as usize] = DATA + 0x800;
                },
                |_| {},
                |c| c.capabilities = caps,
            );
        }
    }
}

#[test]
fn test_syscall_halts_and_resumes() {
    let program = [addiu(V0, ZERO, 1), syscall(0x42), addiu(V0, V0, 1), break_()];
    let mut h = Harness::new(&program, |_| {});
    assert_eq!(h.run_to_halt(), HaltReason::SYSCALL);
    assert_eq!(h.jit.pc(), BASE + 8);
    assert_eq!(h.machine().syscalls, vec![(0x42, BASE + 8)]);

    assert_eq!(h.run_to_halt(), HaltReason::BREAKPOINT);
    assert_eq!(h.jit.context().gpr[V0 as usize], 2);
    assert_eq!(h.jit.pc(), BASE + 16);
}

#[test]
fn test_syscall_that_does_not_halt() {
    let program = [syscall(1), syscall(2), addiu(V0, ZERO, 9), break_()];
    let mut h = Harness::new(&program, |_| {});
    h.machine().halt_on_syscall = false;
    assert_eq!(h.run_to_halt(), HaltReason::BREAKPOINT);
    assert_eq!(h.machine().syscalls, vec![(1, BASE + 4), (2, BASE + 8)]);
    assert_eq!(h.jit.context().gpr[V0 as usize], 9);
}
