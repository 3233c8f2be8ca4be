use ember_backend::abi::{schedule, Bank, Loc, MoveOp};
use ember_core::{
    AluOp, Arg, ArgKind, Cond, FpuOp, Precision, F0, F1, F2, R0, R1, R2, R3, R4, R5, V0, V1, V2,
};

use crate::util::{build, entry};

#[test]
fn identity_round_trips() {
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R0)]).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R0).unwrap();
    });
    let word: extern "C" fn(i64) -> i64 = unsafe { entry(&code) };
    for v in [0, 1, -1, 42, i64::MIN, i64::MAX] {
        assert_eq!(word(v), v);
    }

    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Pointer, R0)]).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R0).unwrap();
    });
    let pointer: extern "C" fn(*const u8) -> *const u8 = unsafe { entry(&code) };
    let probe = 7u8;
    assert_eq!(pointer(&probe), &probe as *const u8);

    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::fpr(ArgKind::Double, F0)]).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val_f(Precision::Double, F0).unwrap();
    });
    let double: extern "C" fn(f64) -> f64 = unsafe { entry(&code) };
    for v in [0.0, -0.5, 1.25, f64::MAX] {
        assert_eq!(double(v), v);
    }

    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::fpr(ArgKind::Float, F0)]).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val_f(Precision::Single, F0).unwrap();
    });
    let single: extern "C" fn(f32) -> f32 = unsafe { entry(&code) };
    for v in [0.0f32, -0.5, 1.25] {
        assert_eq!(single(v), v);
    }
}

#[test]
fn nine_arguments_spill_to_the_stack() {
    // More integer arguments than either host ABI has registers for,
    // so the tail arrives on the stack.
    let targets = [R0, R1, R2, R3, R4, R5, V0, V1, V2];
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(3, 0, 0).unwrap();
        let args: Vec<Arg> = targets
            .iter()
            .map(|&r| Arg::gpr(ArgKind::Word, r))
            .collect();
        s.load_args(&t, &args).unwrap();
        for &r in &targets[1..] {
            s.alu(AluOp::Add, R0, R0, r).unwrap();
        }
        s.leave_abi(&t).unwrap();
        s.ret_val(R0).unwrap();
    });
    let f: extern "C" fn(i64, i64, i64, i64, i64, i64, i64, i64, i64) -> i64 =
        unsafe { entry(&code) };
    assert_eq!(f(1, 2, 3, 4, 5, 6, 7, 8, 9), 45);
    assert_eq!(f(100, 0, 0, 0, 0, 0, 0, 0, -100), 0);
}

#[test]
fn reversed_targets_force_a_marshaling_cycle() {
    // Loading argument 0 into the register holding argument 1 and vice
    // versa cannot be done in order; the scheduler must break the
    // cycle through the scratch register.
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R4), Arg::gpr(ArgKind::Word, R3)])
            .unwrap();
        // R4 holds a, R3 holds b: return a - b.
        s.alu(AluOp::Sub, R0, R4, R3).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R0).unwrap();
    });
    let f: extern "C" fn(i64, i64) -> i64 = unsafe { entry(&code) };
    assert_eq!(f(10, 3), 7);

    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R3), Arg::gpr(ArgKind::Word, R4)])
            .unwrap();
        s.alu(AluOp::Sub, R0, R3, R4).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R0).unwrap();
    });
    let f: extern "C" fn(i64, i64) -> i64 = unsafe { entry(&code) };
    assert_eq!(f(10, 3), 7);
}

#[test]
fn swapped_float_targets() {
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::fpr(ArgKind::Double, F1), Arg::fpr(ArgKind::Double, F0)])
            .unwrap();
        // F1 holds a, F0 holds b: return a - b.
        s.fpu(FpuOp::Sub, Precision::Double, F2, F1, F0).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val_f(Precision::Double, F2).unwrap();
    });
    let f: extern "C" fn(f64, f64) -> f64 = unsafe { entry(&code) };
    assert_eq!(f(5.0, 2.0), 3.0);
}

#[test]
fn mixed_integer_and_float_arguments() {
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(
            &t,
            &[
                Arg::gpr(ArgKind::Word, R0),
                Arg::fpr(ArgKind::Double, F0),
                Arg::gpr(ArgKind::Word, R1),
                Arg::fpr(ArgKind::Double, F1),
            ],
        )
        .unwrap();
        s.fpu(FpuOp::Add, Precision::Double, F2, F0, F1).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val_f(Precision::Double, F2).unwrap();
    });
    let f: extern "C" fn(i64, f64, i64, f64) -> f64 = unsafe { entry(&code) };
    assert_eq!(f(1, 1.5, 2, 2.25), 3.75);
}

#[test]
#[should_panic(expected = "duplicate argument target")]
fn duplicate_targets_panic() {
    let _ = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R0), Arg::gpr(ArgKind::Word, R0)])
            .unwrap();
        s.leave_abi(&t).unwrap();
        s.ret().unwrap();
    });
}

extern "C" fn mix(a: i64, b: i64) -> i64 {
    a * 10 + b
}

#[test]
fn frame_scratch_space_keeps_calls_aligned() {
    // A deliberately odd frame size; the prologue must round it so the
    // call site stays aligned.
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(1, 0, 24).unwrap();
        s.pass_args(&[Arg::imm(ArgKind::Word, 4), Arg::imm(ArgKind::Word, 2)])
            .unwrap();
        s.call(mix as usize).unwrap();
        s.take_ret(R0).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R0).unwrap();
    });
    let f: extern "C" fn() -> i64 = unsafe { entry(&code) };
    assert_eq!(f(), 42);
}

#[test]
fn multiple_exits_share_one_bracket() {
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R0)]).unwrap();
        let negative = s.forward();
        s.branch_imm(Cond::Lt, R0, 0, negative).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R0).unwrap();
        s.bind(negative);
        s.leave_abi(&t).unwrap();
        s.ret_imm(0).unwrap();
    });
    let f: extern "C" fn(i64) -> i64 = unsafe { entry(&code) };
    assert_eq!(f(17), 17);
    assert_eq!(f(-17), 0);
}

// -- Move scheduler --

fn gmov(src: u8, dst: u8) -> MoveOp {
    MoveOp { src: Loc::Gpr(src), dst: Loc::Gpr(dst), kind: ArgKind::Word }
}

#[test]
fn schedule_drops_noops() {
    assert!(schedule(vec![gmov(3, 3)]).is_empty());
}

#[test]
fn schedule_orders_chains() {
    // 0 -> 1 must wait until 1 -> 2 has read register 1.
    let out = schedule(vec![gmov(0, 1), gmov(1, 2)]);
    assert_eq!(out, vec![gmov(1, 2), gmov(0, 1)]);
}

#[test]
fn schedule_breaks_cycles_through_scratch() {
    let out = schedule(vec![gmov(0, 1), gmov(1, 0)]);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].dst, Loc::Scratch(Bank::Int));
    assert_eq!(out[2].src, Loc::Scratch(Bank::Int));
    // Every register still receives a value.
    assert!(out.iter().any(|m| m.dst == Loc::Gpr(0)));
    assert!(out.iter().any(|m| m.dst == Loc::Gpr(1)));
}

#[test]
fn schedule_keeps_banks_separate() {
    let fmov = |src: u8, dst: u8| MoveOp {
        src: Loc::Fpr(src),
        dst: Loc::Fpr(dst),
        kind: ArgKind::Double,
    };
    let out = schedule(vec![fmov(0, 1), fmov(1, 0), gmov(5, 6)]);
    let scratches: Vec<_> = out
        .iter()
        .filter_map(|m| match m.dst {
            Loc::Scratch(bank) => Some(bank),
            _ => None,
        })
        .collect();
    assert_eq!(scratches, vec![Bank::Float]);
}
