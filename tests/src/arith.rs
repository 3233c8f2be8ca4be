use ember_core::{AluOp, Arg, ArgKind, R0, R1, R2};

use crate::util::{build, entry};

/// Emit `fn(a, b) -> a op b` with distinct destination register.
fn binop(op: AluOp) -> extern "C" fn(i64, i64) -> i64 {
    let (mem, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R0), Arg::gpr(ArgKind::Word, R1)])
            .unwrap();
        s.alu(op, R2, R0, R1).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R2).unwrap();
    });
    std::mem::forget(mem);
    unsafe { entry(&code) }
}

#[test]
fn add() {
    let f = binop(AluOp::Add);
    assert_eq!(f(2, 40), 42);
    assert_eq!(f(-5, 3), -2);
    assert_eq!(f(i64::MAX, 1), i64::MIN); // wraps
}

#[test]
fn sub() {
    let f = binop(AluOp::Sub);
    assert_eq!(f(40, -2), 42);
    assert_eq!(f(1, 2), -1);
}

#[test]
fn mul() {
    let f = binop(AluOp::Mul);
    assert_eq!(f(6, 7), 42);
    assert_eq!(f(-3, 5), -15);
}

#[test]
fn div_truncates_toward_zero() {
    let f = binop(AluOp::Div);
    assert_eq!(f(7, 2), 3);
    assert_eq!(f(-7, 2), -3);
    assert_eq!(f(7, -2), -3);
    assert_eq!(f(-9, -3), 3);
}

#[test]
fn divu_is_unsigned() {
    let f = binop(AluOp::Divu);
    let g: extern "C" fn(u64, u64) -> u64 = unsafe { std::mem::transmute(f) };
    assert_eq!(g(u64::MAX, 2), u64::MAX / 2);
    assert_eq!(g(10, 3), 3);
}

#[test]
fn aliased_destinations() {
    // dst == a
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R0), Arg::gpr(ArgKind::Word, R1)])
            .unwrap();
        s.alu(AluOp::Sub, R0, R0, R1).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R0).unwrap();
    });
    let f: extern "C" fn(i64, i64) -> i64 = unsafe { entry(&code) };
    assert_eq!(f(10, 4), 6);

    // dst == b, the awkward case for two-operand hosts
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R0), Arg::gpr(ArgKind::Word, R1)])
            .unwrap();
        s.alu(AluOp::Sub, R1, R0, R1).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R1).unwrap();
    });
    let f: extern "C" fn(i64, i64) -> i64 = unsafe { entry(&code) };
    assert_eq!(f(10, 4), 6);
    assert_eq!(f(3, 10), -7);
}

#[test]
fn immediate_operands() {
    let unop = |op: AluOp, imm: i64| {
        let (mem, code) = build(4096, |s| {
            let t = s.enter_abi(0, 0, 0).unwrap();
            s.load_args(&t, &[Arg::gpr(ArgKind::Word, R0)]).unwrap();
            s.alu_imm(op, R1, R0, imm).unwrap();
            s.leave_abi(&t).unwrap();
            s.ret_val(R1).unwrap();
        });
        std::mem::forget(mem);
        let f: extern "C" fn(i64) -> i64 = unsafe { entry(&code) };
        f
    };
    assert_eq!(unop(AluOp::Add, 1000)(42), 1042);
    assert_eq!(unop(AluOp::Add, -7)(5), -2);
    // Beyond any encodable immediate, forcing the scratch path.
    assert_eq!(unop(AluOp::Add, 0x1_0000_0000)(1), 0x1_0000_0001);
    assert_eq!(unop(AluOp::Sub, 100)(58), -42);
    assert_eq!(unop(AluOp::Mul, 10)(-4), -40);
    assert_eq!(unop(AluOp::Div, -3)(9), -3);
    assert_eq!(unop(AluOp::Divu, 2)(10), 5);
}

#[test]
fn mov_imm_extremes() {
    for val in [0i64, 1, -1, 42, 0x7FFF_FFFF, -0x8000_0000, 0x1234_5678_9ABC_DEF0, i64::MIN, i64::MAX] {
        let (_m, code) = build(4096, |s| {
            let t = s.enter_abi(0, 0, 0).unwrap();
            s.mov_imm(R0, val).unwrap();
            s.leave_abi(&t).unwrap();
            s.ret_val(R0).unwrap();
        });
        let f: extern "C" fn() -> i64 = unsafe { entry(&code) };
        assert_eq!(f(), val, "materializing {val:#x}");
    }
}

#[test]
fn overflow_branch_taken_on_add_wrap() {
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R0), Arg::gpr(ArgKind::Word, R1)])
            .unwrap();
        let ovf = s.forward();
        s.alu_ovf(AluOp::Add, R2, R0, R1, ovf).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R2).unwrap();
        s.bind(ovf);
        s.leave_abi(&t).unwrap();
        s.ret_imm(-1).unwrap();
    });
    let f: extern "C" fn(i64, i64) -> i64 = unsafe { entry(&code) };
    assert_eq!(f(1, 2), 3);
    assert_eq!(f(i64::MAX, 1), -1);
    assert_eq!(f(i64::MIN, -1), -1);
}

#[test]
fn overflow_branch_taken_on_mul_wrap() {
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Word, R0), Arg::gpr(ArgKind::Word, R1)])
            .unwrap();
        let ovf = s.forward();
        s.alu_ovf(AluOp::Mul, R2, R0, R1, ovf).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R2).unwrap();
        s.bind(ovf);
        s.leave_abi(&t).unwrap();
        s.ret_imm(-1).unwrap();
    });
    let f: extern "C" fn(i64, i64) -> i64 = unsafe { entry(&code) };
    assert_eq!(f(6, 7), 42);
    assert_eq!(f(-6, 7), -42);
    assert_eq!(f(i64::MAX, 2), -1);
    assert_eq!(f(i64::MIN, -1), -1);
}
