//! x86-64 instruction encoder.
//!
//! Opcodes are built from the raw primary byte plus prefix flags in the
//! high bits; `emit_opc` lowers the flags into legacy prefixes, REX,
//! and the 0F escape. Memory operands go through `emit_mem`, which
//! handles the SIB and RSP/RBP/R12/R13 encoding irregularities.

use crate::abi::{Bank, FrameLayout, Loc, MoveOp};
use crate::arena::Arena;
use crate::HostEmit;
use ember_core::{
    AluOp, Arg, ArgKind, BranchKind, Cond, EmitResult, Extend, Fpr, FpuOp, Gpr, LabelUse, Mem,
    Operand, Precision, Width,
};
use log::trace;

use super::regs::{
    fpr_num, gpr, Reg, CALLEE_SAVED_POOL, FLOAT_ARG_COUNT, FRET_REG, FSCRATCH, INT_ARG_REGS,
    RET_REG, SCRATCH, STACK_ALIGN,
};

// -- Opcode prefix flags --

/// 0F escape byte before the opcode.
const P_EXT: u32 = 0x100;
/// 0x66 operand-size prefix.
const P_DATA16: u32 = 0x400;
/// REX.W (64-bit operand size).
const P_REXW: u32 = 0x1000;
/// Force a REX prefix when the reg field names SPL/BPL/SIL/DIL.
const P_REXB_R: u32 = 0x2000;
/// 0xF3 prefix (scalar single SSE).
const P_SIMDF3: u32 = 0x10000;
/// 0xF2 prefix (scalar double SSE).
const P_SIMDF2: u32 = 0x20000;

// -- Primary opcodes --

const OPC_ARITH_GV_EV: u32 = 0x03; // ALU r64, r/m64 (+ op << 3)
const OPC_ARITH_EV_IZ: u32 = 0x81; // ALU r/m64, imm32 (/op)
const OPC_ARITH_EV_IB: u32 = 0x83; // ALU r/m64, imm8 (/op)
const OPC_IMUL_GV_EV: u32 = 0xAF | P_EXT;
const OPC_IMUL_GV_EV_IZ: u32 = 0x69;
const OPC_IMUL_GV_EV_IB: u32 = 0x6B;
const OPC_LEA: u32 = 0x8D;
const OPC_MOVB_EV_GV: u32 = 0x88 | P_REXB_R;
const OPC_MOVL_EV_GV: u32 = 0x89;
const OPC_MOVL_GV_EV: u32 = 0x8B;
const OPC_MOVL_IV: u32 = 0xB8; // + register low bits
const OPC_MOVL_EV_IZ: u32 = 0xC7; // /0
const OPC_MOVSLQ: u32 = 0x63 | P_REXW;
const OPC_MOVZBL: u32 = 0xB6 | P_EXT;
const OPC_MOVSBQ: u32 = 0xBE | P_EXT | P_REXW;
const OPC_MOVZWL: u32 = 0xB7 | P_EXT;
const OPC_MOVSWQ: u32 = 0xBF | P_EXT | P_REXW;
const OPC_MOVAPS: u32 = 0x28 | P_EXT;
const OPC_MOVD_VY_EY: u32 = 0x6E | P_DATA16 | P_EXT;
const OPC_SSE_LOAD: u32 = 0x10 | P_EXT;
const OPC_SSE_STORE: u32 = 0x11 | P_EXT;
const OPC_PUSH: u32 = 0x50; // + register low bits
const OPC_POP: u32 = 0x58; // + register low bits
const OPC_CALL_REL32: u32 = 0xE8;
const OPC_JMP_REL32: u32 = 0xE9;
const OPC_JCC_REL32: u32 = 0x80 | P_EXT; // + condition code
const OPC_GRP3: u32 = 0xF7; // /6 div, /7 idiv
const OPC_GRP5: u32 = 0xFF; // /2 call, /4 jmp
const OPC_CQO: u32 = 0x99 | P_REXW;
const OPC_RET: u32 = 0xC3;

/// ALU opcode group selectors, shifted into the primary opcode or the
/// ModR/M reg field for the immediate forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ArithOp {
    Add = 0,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

// -- Byte-level helpers --

/// Emit prefixes and the opcode byte(s) for the given reg / index / rm
/// register numbers (REX bits come from their high bits).
fn emit_opc(buf: &mut Arena, opc: u32, r: u8, x: u8, rm: u8) -> EmitResult<()> {
    if opc & P_DATA16 != 0 {
        buf.put_u8(0x66)?;
    }
    if opc & P_SIMDF3 != 0 {
        buf.put_u8(0xF3)?;
    }
    if opc & P_SIMDF2 != 0 {
        buf.put_u8(0xF2)?;
    }

    let mut rex: u8 = 0;
    if opc & P_REXW != 0 {
        rex |= 0x08;
    }
    if r >= 8 {
        rex |= 0x04;
    }
    if x >= 8 {
        rex |= 0x02;
    }
    if rm >= 8 {
        rex |= 0x01;
    }
    // SPL/BPL/SIL/DIL need an (empty) REX to escape AH..BH encodings.
    let force_rex = opc & P_REXB_R != 0 && (4..8).contains(&r);
    if rex != 0 || force_rex {
        buf.put_u8(0x40 | rex)?;
    }

    if opc & P_EXT != 0 {
        buf.put_u8(0x0F)?;
    }
    buf.put_u8(opc as u8)
}

/// Opcode plus register-direct ModR/M. `r` is the reg field (register
/// number or opcode extension), `rm` the register operand.
fn emit_rr(buf: &mut Arena, opc: u32, r: u8, rm: u8) -> EmitResult<()> {
    emit_opc(buf, opc, r, 0, rm)?;
    buf.put_u8(0xC0 | ((r & 7) << 3) | (rm & 7))
}

/// Opcode plus memory ModR/M for `[base + index + disp]`.
fn emit_mem(
    buf: &mut Arena,
    opc: u32,
    r: u8,
    base: Reg,
    index: Option<Reg>,
    disp: i32,
) -> EmitResult<()> {
    let b = base as u8;
    let x = index.map_or(0, |i| i as u8);
    emit_opc(buf, opc, r, x, b)?;

    let r3 = (r & 7) << 3;
    let b3 = base.low3();
    // Mod=00 with base RBP/R13 means rip-relative; force a disp8.
    let need_disp = disp != 0 || b3 == 5;

    match index {
        Some(ix) => {
            assert!(ix != Reg::Rsp, "rsp cannot be an index register");
            let sib = (ix.low3() << 3) | b3;
            if !need_disp {
                buf.put_u8(r3 | 4)?;
                buf.put_u8(sib)
            } else if i8::try_from(disp).is_ok() {
                buf.put_u8(0x40 | r3 | 4)?;
                buf.put_u8(sib)?;
                buf.put_u8(disp as u8)
            } else {
                buf.put_u8(0x80 | r3 | 4)?;
                buf.put_u8(sib)?;
                buf.put_u32(disp as u32)
            }
        }
        None => {
            // Base RSP/R12 needs a SIB with index=100 (none).
            let needs_sib = b3 == 4;
            if !need_disp {
                if needs_sib {
                    buf.put_u8(r3 | 4)?;
                    buf.put_u8(0x24)
                } else {
                    buf.put_u8(r3 | b3)
                }
            } else if i8::try_from(disp).is_ok() {
                buf.put_u8(0x40 | r3 | if needs_sib { 4 } else { b3 })?;
                if needs_sib {
                    buf.put_u8(0x24)?;
                }
                buf.put_u8(disp as u8)
            } else {
                buf.put_u8(0x80 | r3 | if needs_sib { 4 } else { b3 })?;
                if needs_sib {
                    buf.put_u8(0x24)?;
                }
                buf.put_u32(disp as u32)
            }
        }
    }
}

fn emit_push(buf: &mut Arena, r: Reg) -> EmitResult<()> {
    emit_opc(buf, OPC_PUSH + r.low3() as u32, 0, 0, r as u8)
}

fn emit_pop(buf: &mut Arena, r: Reg) -> EmitResult<()> {
    emit_opc(buf, OPC_POP + r.low3() as u32, 0, 0, r as u8)
}

/// 64-bit ALU op, register-register. `dst` is both left operand and
/// destination.
fn emit_arith_rr(buf: &mut Arena, op: ArithOp, dst: Reg, src: Reg) -> EmitResult<()> {
    let opc = (OPC_ARITH_GV_EV + ((op as u32) << 3)) | P_REXW;
    emit_rr(buf, opc, dst as u8, src as u8)
}

/// 64-bit ALU op with an immediate, using the sign-extended imm8 form
/// when it fits.
fn emit_arith_ri(buf: &mut Arena, op: ArithOp, dst: Reg, imm: i32) -> EmitResult<()> {
    if i8::try_from(imm).is_ok() {
        emit_rr(buf, OPC_ARITH_EV_IB | P_REXW, op as u8, dst as u8)?;
        buf.put_u8(imm as u8)
    } else {
        emit_rr(buf, OPC_ARITH_EV_IZ | P_REXW, op as u8, dst as u8)?;
        buf.put_u32(imm as u32)
    }
}

/// Full-width register move, skipped when source and destination
/// coincide.
fn emit_mov_rr(buf: &mut Arena, dst: Reg, src: Reg) -> EmitResult<()> {
    if dst == src {
        return Ok(());
    }
    emit_rr(buf, OPC_MOVL_GV_EV | P_REXW, dst as u8, src as u8)
}

/// Materialize a 64-bit immediate, picking the shortest encoding.
fn emit_mov_ri(buf: &mut Arena, dst: Reg, val: i64) -> EmitResult<()> {
    if val == 0 {
        // 32-bit xor zero-extends and is shorter.
        return emit_rr(
            buf,
            OPC_ARITH_GV_EV + ((ArithOp::Xor as u32) << 3),
            dst as u8,
            dst as u8,
        );
    }
    if val > 0 && val <= u32::MAX as i64 {
        emit_opc(buf, OPC_MOVL_IV + dst.low3() as u32, 0, 0, dst as u8)?;
        buf.put_u32(val as u32)
    } else if i32::try_from(val).is_ok() {
        emit_rr(buf, OPC_MOVL_EV_IZ | P_REXW, 0, dst as u8)?;
        buf.put_u32(val as u32)
    } else {
        emit_opc(buf, (OPC_MOVL_IV + dst.low3() as u32) | P_REXW, 0, 0, dst as u8)?;
        buf.put_u64(val as u64)
    }
}

fn emit_movaps(buf: &mut Arena, dst: u8, src: u8) -> EmitResult<()> {
    emit_rr(buf, OPC_MOVAPS, dst, src)
}

/// Jcc rel32 with a zero placeholder displacement; returns the use
/// record for the label engine.
fn emit_jcc(buf: &mut Arena, cc: u32) -> EmitResult<LabelUse> {
    emit_opc(buf, OPC_JCC_REL32 + cc, 0, 0, 0)?;
    buf.put_u32(0)?;
    Ok(LabelUse { offset: buf.offset() - 4, kind: BranchKind::Rel32 })
}

/// Condition code for a Jcc following `cmp a, b`.
const fn cc(cond: Cond) -> u32 {
    match cond {
        Cond::Eq => 0x4,
        Cond::Ne => 0x5,
        Cond::Lt => 0xC,
        Cond::Ge => 0xD,
        Cond::Le => 0xE,
        Cond::Gt => 0xF,
        Cond::Ltu => 0x2,
        Cond::Geu => 0x3,
        Cond::Leu => 0x6,
        Cond::Gtu => 0x7,
    }
}

const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// SSE scalar opcode for the given precision.
const fn sse(opc: u32, p: Precision) -> u32 {
    match p {
        Precision::Single => opc | P_SIMDF3,
        Precision::Double => opc | P_SIMDF2,
    }
}

/// x86-64 encoder. Stateless; all emission state lives in the arena
/// and the session driving it.
pub struct Emitter;

impl Emitter {
    /// Reduce a memory operand to what the addressing modes can encode:
    /// displacements beyond i32 are folded into the scratch register.
    fn legalize(&self, buf: &mut Arena, mem: Mem) -> EmitResult<(Reg, Option<Reg>, i32)> {
        let base = gpr(mem.base);
        let index = mem.index.map(gpr);
        match i32::try_from(mem.disp) {
            Ok(d) => Ok((base, index, d)),
            Err(_) => {
                emit_mov_ri(buf, SCRATCH, mem.disp)?;
                if let Some(ix) = index {
                    emit_arith_rr(buf, ArithOp::Add, SCRATCH, ix)?;
                }
                Ok((base, Some(SCRATCH), 0))
            }
        }
    }

    /// Three-operand ALU lowered to two-operand form, resolving operand
    /// aliasing. `b` may be the scratch register (immediate path).
    fn alu_rrr(&self, buf: &mut Arena, op: AluOp, d: Reg, a: Reg, b: Reg) -> EmitResult<()> {
        match op {
            AluOp::Add => {
                if d == a {
                    emit_arith_rr(buf, ArithOp::Add, d, b)
                } else if d == b {
                    emit_arith_rr(buf, ArithOp::Add, d, a)
                } else {
                    emit_mem(buf, OPC_LEA | P_REXW, d as u8, a, Some(b), 0)
                }
            }
            AluOp::Sub => {
                if d == a {
                    emit_arith_rr(buf, ArithOp::Sub, d, b)
                } else if d == b {
                    // d aliases the subtrahend; park it first.
                    emit_mov_rr(buf, SCRATCH, b)?;
                    emit_mov_rr(buf, d, a)?;
                    emit_arith_rr(buf, ArithOp::Sub, d, SCRATCH)
                } else {
                    emit_mov_rr(buf, d, a)?;
                    emit_arith_rr(buf, ArithOp::Sub, d, b)
                }
            }
            AluOp::Mul => {
                if d == a {
                    emit_rr(buf, OPC_IMUL_GV_EV | P_REXW, d as u8, b as u8)
                } else if d == b {
                    emit_rr(buf, OPC_IMUL_GV_EV | P_REXW, d as u8, a as u8)
                } else {
                    emit_mov_rr(buf, d, a)?;
                    emit_rr(buf, OPC_IMUL_GV_EV | P_REXW, d as u8, b as u8)
                }
            }
            AluOp::Div => self.emit_div(buf, true, d, a, b),
            AluOp::Divu => self.emit_div(buf, false, d, a, b),
        }
    }

    /// Division around the fixed RAX/RDX operands of idiv/div. Both are
    /// preserved across the sequence, the quotient travels through the
    /// scratch register.
    fn emit_div(&self, buf: &mut Arena, signed: bool, d: Reg, a: Reg, b: Reg) -> EmitResult<()> {
        emit_push(buf, Reg::Rax)?;
        emit_push(buf, Reg::Rdx)?;
        if b != SCRATCH {
            emit_mov_rr(buf, SCRATCH, b)?;
        }
        emit_mov_rr(buf, Reg::Rax, a)?;
        if signed {
            emit_opc(buf, OPC_CQO, 0, 0, 0)?;
            emit_rr(buf, OPC_GRP3 | P_REXW, 7, SCRATCH as u8)?;
        } else {
            // xor edx, edx
            emit_rr(buf, OPC_ARITH_GV_EV + ((ArithOp::Xor as u32) << 3), 2, 2)?;
            emit_rr(buf, OPC_GRP3 | P_REXW, 6, SCRATCH as u8)?;
        }
        emit_mov_rr(buf, SCRATCH, Reg::Rax)?;
        emit_pop(buf, Reg::Rdx)?;
        emit_pop(buf, Reg::Rax)?;
        emit_mov_rr(buf, d, SCRATCH)
    }

    /// Emit one scheduled marshaling move. `stack_base` is the
    /// rsp-relative offset of incoming stack argument slot zero.
    fn emit_move(&self, buf: &mut Arena, m: MoveOp, stack_base: i32) -> EmitResult<()> {
        let scratch_of = |bank: Bank| match bank {
            Bank::Int => Loc::Gpr(SCRATCH as u8),
            Bank::Float => Loc::Fpr(FSCRATCH),
        };
        let src = match m.src {
            Loc::Scratch(bank) => scratch_of(bank),
            s => s,
        };
        let dst = match m.dst {
            Loc::Scratch(bank) => scratch_of(bank),
            d => d,
        };
        match (src, dst) {
            (Loc::Gpr(s), Loc::Gpr(d)) => emit_mov_rr(buf, reg_from(d), reg_from(s)),
            (Loc::Fpr(s), Loc::Fpr(d)) => emit_movaps(buf, d, s),
            (Loc::Stack(off), Loc::Gpr(d)) => emit_mem(
                buf,
                OPC_MOVL_GV_EV | P_REXW,
                d,
                Reg::Rsp,
                None,
                stack_base + off,
            ),
            (Loc::Stack(off), Loc::Fpr(d)) => {
                let p = match m.kind {
                    ArgKind::Float => Precision::Single,
                    _ => Precision::Double,
                };
                emit_mem(buf, sse(OPC_SSE_LOAD, p), d, Reg::Rsp, None, stack_base + off)
            }
            _ => unreachable!("cross-bank argument move"),
        }
    }
}

/// Recover a `Reg` from its raw encoding (marshaling locations store
/// raw numbers).
fn reg_from(n: u8) -> Reg {
    match n {
        0 => Reg::Rax,
        1 => Reg::Rcx,
        2 => Reg::Rdx,
        3 => Reg::Rbx,
        4 => Reg::Rsp,
        5 => Reg::Rbp,
        6 => Reg::Rsi,
        7 => Reg::Rdi,
        8 => Reg::R8,
        9 => Reg::R9,
        10 => Reg::R10,
        11 => Reg::R11,
        12 => Reg::R12,
        13 => Reg::R13,
        14 => Reg::R14,
        15 => Reg::R15,
        _ => unreachable!("bad register encoding {n}"),
    }
}

impl HostEmit for Emitter {
    const WORD: Width = Width::W64;

    fn new() -> Self {
        Emitter
    }

    fn mov(&self, buf: &mut Arena, dst: Gpr, src: Gpr) -> EmitResult<()> {
        emit_mov_rr(buf, gpr(dst), gpr(src))
    }

    fn mov_imm(&self, buf: &mut Arena, dst: Gpr, val: i64) -> EmitResult<()> {
        emit_mov_ri(buf, gpr(dst), val)
    }

    fn fmov(&self, buf: &mut Arena, _p: Precision, dst: Fpr, src: Fpr) -> EmitResult<()> {
        if dst == src {
            return Ok(());
        }
        emit_movaps(buf, fpr_num(dst), fpr_num(src))
    }

    fn fmov_bits(&self, buf: &mut Arena, p: Precision, dst: Fpr, bits: u64) -> EmitResult<()> {
        emit_mov_ri(buf, SCRATCH, bits as i64)?;
        let opc = match p {
            Precision::Single => OPC_MOVD_VY_EY,
            Precision::Double => OPC_MOVD_VY_EY | P_REXW,
        };
        emit_rr(buf, opc, fpr_num(dst), SCRATCH as u8)
    }

    fn alu(&self, buf: &mut Arena, op: AluOp, dst: Gpr, a: Gpr, b: Gpr) -> EmitResult<()> {
        self.alu_rrr(buf, op, gpr(dst), gpr(a), gpr(b))
    }

    fn alu_imm(&self, buf: &mut Arena, op: AluOp, dst: Gpr, a: Gpr, imm: i64) -> EmitResult<()> {
        let d = gpr(dst);
        let a = gpr(a);
        match op {
            AluOp::Add | AluOp::Sub => {
                if let Ok(imm32) = i32::try_from(imm) {
                    let arith = if op == AluOp::Add { ArithOp::Add } else { ArithOp::Sub };
                    emit_mov_rr(buf, d, a)?;
                    emit_arith_ri(buf, arith, d, imm32)
                } else {
                    emit_mov_ri(buf, SCRATCH, imm)?;
                    self.alu_rrr(buf, op, d, a, SCRATCH)
                }
            }
            AluOp::Mul => {
                if let Ok(imm32) = i32::try_from(imm) {
                    // Three-operand imul encodes source and destination
                    // independently.
                    if i8::try_from(imm32).is_ok() {
                        emit_rr(buf, OPC_IMUL_GV_EV_IB | P_REXW, d as u8, a as u8)?;
                        buf.put_u8(imm32 as u8)
                    } else {
                        emit_rr(buf, OPC_IMUL_GV_EV_IZ | P_REXW, d as u8, a as u8)?;
                        buf.put_u32(imm32 as u32)
                    }
                } else {
                    emit_mov_ri(buf, SCRATCH, imm)?;
                    self.alu_rrr(buf, op, d, a, SCRATCH)
                }
            }
            AluOp::Div | AluOp::Divu => {
                emit_mov_ri(buf, SCRATCH, imm)?;
                self.alu_rrr(buf, op, d, a, SCRATCH)
            }
        }
    }

    fn alu_ovf(
        &self,
        buf: &mut Arena,
        op: AluOp,
        dst: Gpr,
        a: Gpr,
        b: Gpr,
    ) -> EmitResult<LabelUse> {
        let (d, a, b) = (gpr(dst), gpr(a), gpr(b));
        match op {
            // The flag-setting two-operand forms; lea would lose OF.
            AluOp::Add => {
                if d == a {
                    emit_arith_rr(buf, ArithOp::Add, d, b)?;
                } else if d == b {
                    emit_arith_rr(buf, ArithOp::Add, d, a)?;
                } else {
                    emit_mov_rr(buf, d, a)?;
                    emit_arith_rr(buf, ArithOp::Add, d, b)?;
                }
            }
            AluOp::Sub => {
                if d == a {
                    emit_arith_rr(buf, ArithOp::Sub, d, b)?;
                } else if d == b {
                    emit_mov_rr(buf, SCRATCH, b)?;
                    emit_mov_rr(buf, d, a)?;
                    emit_arith_rr(buf, ArithOp::Sub, d, SCRATCH)?;
                } else {
                    emit_mov_rr(buf, d, a)?;
                    emit_arith_rr(buf, ArithOp::Sub, d, b)?;
                }
            }
            AluOp::Mul => {
                if d == a {
                    emit_rr(buf, OPC_IMUL_GV_EV | P_REXW, d as u8, b as u8)?;
                } else if d == b {
                    emit_rr(buf, OPC_IMUL_GV_EV | P_REXW, d as u8, a as u8)?;
                } else {
                    emit_mov_rr(buf, d, a)?;
                    emit_rr(buf, OPC_IMUL_GV_EV | P_REXW, d as u8, b as u8)?;
                }
            }
            AluOp::Div | AluOp::Divu => {
                panic!("overflow-checked arithmetic supports Add, Sub and Mul only")
            }
        }
        // jo
        emit_jcc(buf, 0x0)
    }

    fn fpu(
        &self,
        buf: &mut Arena,
        op: FpuOp,
        p: Precision,
        dst: Fpr,
        a: Fpr,
        b: Fpr,
    ) -> EmitResult<()> {
        let base = match op {
            FpuOp::Add => 0x58,
            FpuOp::Sub => 0x5C,
            FpuOp::Mul => 0x59,
            FpuOp::Div => 0x5E,
        };
        let opc = sse(base | P_EXT, p);
        let commutative = matches!(op, FpuOp::Add | FpuOp::Mul);
        let (d, a, b) = (fpr_num(dst), fpr_num(a), fpr_num(b));
        if d == a {
            emit_rr(buf, opc, d, b)
        } else if d == b {
            if commutative {
                emit_rr(buf, opc, d, a)
            } else {
                emit_movaps(buf, FSCRATCH, b)?;
                emit_movaps(buf, d, a)?;
                emit_rr(buf, opc, d, FSCRATCH)
            }
        } else {
            emit_movaps(buf, d, a)?;
            emit_rr(buf, opc, d, b)
        }
    }

    fn load(&self, buf: &mut Arena, dst: Gpr, mem: Mem, w: Width, ext: Extend) -> EmitResult<()> {
        let (base, index, disp) = self.legalize(buf, mem)?;
        let opc = match (w, ext) {
            (Width::W8, Extend::Zero) => OPC_MOVZBL,
            (Width::W8, Extend::Sign) => OPC_MOVSBQ,
            (Width::W16, Extend::Zero) => OPC_MOVZWL,
            (Width::W16, Extend::Sign) => OPC_MOVSWQ,
            // 32-bit mov zero-extends implicitly.
            (Width::W32, Extend::Zero) => OPC_MOVL_GV_EV,
            (Width::W32, Extend::Sign) => OPC_MOVSLQ,
            (Width::W64, _) => OPC_MOVL_GV_EV | P_REXW,
        };
        emit_mem(buf, opc, gpr(dst) as u8, base, index, disp)
    }

    fn store(&self, buf: &mut Arena, mem: Mem, src: Gpr, w: Width) -> EmitResult<()> {
        let (base, index, disp) = self.legalize(buf, mem)?;
        let opc = match w {
            Width::W8 => OPC_MOVB_EV_GV,
            Width::W16 => OPC_MOVL_EV_GV | P_DATA16,
            Width::W32 => OPC_MOVL_EV_GV,
            Width::W64 => OPC_MOVL_EV_GV | P_REXW,
        };
        emit_mem(buf, opc, gpr(src) as u8, base, index, disp)
    }

    fn load_f(&self, buf: &mut Arena, p: Precision, dst: Fpr, mem: Mem) -> EmitResult<()> {
        let (base, index, disp) = self.legalize(buf, mem)?;
        emit_mem(buf, sse(OPC_SSE_LOAD, p), fpr_num(dst), base, index, disp)
    }

    fn store_f(&self, buf: &mut Arena, p: Precision, mem: Mem, src: Fpr) -> EmitResult<()> {
        let (base, index, disp) = self.legalize(buf, mem)?;
        emit_mem(buf, sse(OPC_SSE_STORE, p), fpr_num(src), base, index, disp)
    }

    fn branch(&self, buf: &mut Arena, cond: Cond, a: Gpr, b: Gpr) -> EmitResult<LabelUse> {
        emit_arith_rr(buf, ArithOp::Cmp, gpr(a), gpr(b))?;
        emit_jcc(buf, cc(cond))
    }

    fn branch_imm(&self, buf: &mut Arena, cond: Cond, a: Gpr, imm: i64) -> EmitResult<LabelUse> {
        match i32::try_from(imm) {
            Ok(imm32) => emit_arith_ri(buf, ArithOp::Cmp, gpr(a), imm32)?,
            Err(_) => {
                emit_mov_ri(buf, SCRATCH, imm)?;
                emit_arith_rr(buf, ArithOp::Cmp, gpr(a), SCRATCH)?;
            }
        }
        emit_jcc(buf, cc(cond))
    }

    fn jump(&self, buf: &mut Arena) -> EmitResult<LabelUse> {
        emit_opc(buf, OPC_JMP_REL32, 0, 0, 0)?;
        buf.put_u32(0)?;
        Ok(LabelUse { offset: buf.offset() - 4, kind: BranchKind::Rel32 })
    }

    fn jump_reg(&self, buf: &mut Arena, r: Gpr) -> EmitResult<()> {
        emit_rr(buf, OPC_GRP5, 4, gpr(r) as u8)
    }

    fn call(&self, buf: &mut Arena, addr: usize) -> EmitResult<()> {
        // rel32 when the target is in range of the arena, otherwise an
        // absolute indirect call through the scratch register.
        let next = buf.base_ptr() as i64 + buf.offset() as i64 + 5;
        let disp = addr as i64 - next;
        if i32::try_from(disp).is_ok() {
            emit_opc(buf, OPC_CALL_REL32, 0, 0, 0)?;
            buf.put_u32(disp as u32)
        } else {
            emit_mov_ri(buf, SCRATCH, addr as i64)?;
            emit_rr(buf, OPC_GRP5, 2, SCRATCH as u8)
        }
    }

    fn call_reg(&self, buf: &mut Arena, r: Gpr) -> EmitResult<()> {
        emit_rr(buf, OPC_GRP5, 2, gpr(r) as u8)
    }

    fn ret(&self, buf: &mut Arena) -> EmitResult<()> {
        emit_opc(buf, OPC_RET, 0, 0, 0)
    }

    fn ret_val(&self, buf: &mut Arena, src: Gpr) -> EmitResult<()> {
        emit_mov_rr(buf, RET_REG, gpr(src))?;
        self.ret(buf)
    }

    fn ret_imm(&self, buf: &mut Arena, val: i64) -> EmitResult<()> {
        emit_mov_ri(buf, RET_REG, val)?;
        self.ret(buf)
    }

    fn ret_val_f(&self, buf: &mut Arena, _p: Precision, src: Fpr) -> EmitResult<()> {
        if fpr_num(src) != FRET_REG {
            emit_movaps(buf, FRET_REG, fpr_num(src))?;
        }
        self.ret(buf)
    }

    fn patch(&self, buf: &mut Arena, use_: LabelUse, target: usize) {
        match use_.kind {
            BranchKind::Rel32 => {
                let disp = target as i64 - (use_.offset as i64 + 4);
                let disp = i32::try_from(disp).unwrap_or_else(|_| {
                    panic!("branch displacement {disp} out of rel32 range")
                });
                buf.patch_u32(use_.offset, disp as u32);
            }
            BranchKind::Imm19 | BranchKind::Imm26 => {
                unreachable!("not an x86-64 branch encoding")
            }
        }
    }

    fn prologue(
        &self,
        buf: &mut Arena,
        saved_gprs: usize,
        saved_fprs: usize,
        frame_size: usize,
    ) -> EmitResult<FrameLayout> {
        assert!(
            saved_gprs <= CALLEE_SAVED_POOL.len(),
            "at most {} callee-saved registers available",
            CALLEE_SAVED_POOL.len()
        );
        assert!(frame_size <= i32::MAX as usize / 2, "frame size out of range");
        trace!("prologue: save {saved_gprs} gprs, frame {frame_size}");

        for &r in &CALLEE_SAVED_POOL[..saved_gprs] {
            emit_push(buf, r)?;
        }
        // Return address plus pushes, then pad the frame so rsp stays
        // 16-aligned at the deepest point.
        let used = 8 + 8 * saved_gprs;
        let delta = align_up(used + frame_size, STACK_ALIGN) - used;
        if delta > 0 {
            emit_arith_ri(buf, ArithOp::Sub, Reg::Rsp, delta as i32)?;
        }
        // All xmm registers are caller-save here; saved_fprs needs no
        // spill slots.
        let _ = saved_fprs;
        Ok(FrameLayout { saved_gprs, saved_fprs: 0, frame_size, stack_delta: delta })
    }

    fn epilogue(&self, buf: &mut Arena, frame: &FrameLayout) -> EmitResult<()> {
        if frame.stack_delta > 0 {
            emit_arith_ri(buf, ArithOp::Add, Reg::Rsp, frame.stack_delta as i32)?;
        }
        for &r in CALLEE_SAVED_POOL[..frame.saved_gprs].iter().rev() {
            emit_pop(buf, r)?;
        }
        Ok(())
    }

    fn load_args(&self, buf: &mut Arena, frame: &FrameLayout, args: &[Arg]) -> EmitResult<()> {
        let mut moves = Vec::with_capacity(args.len());
        let mut ints = 0usize;
        let mut floats = 0usize;
        let mut stack_off = 0i32;
        for arg in args {
            let src = if arg.kind.is_float() {
                if floats < FLOAT_ARG_COUNT {
                    let s = Loc::Fpr(floats as u8);
                    floats += 1;
                    s
                } else {
                    let s = Loc::Stack(stack_off);
                    stack_off += 8;
                    s
                }
            } else if ints < INT_ARG_REGS.len() {
                let s = Loc::Gpr(INT_ARG_REGS[ints] as u8);
                ints += 1;
                s
            } else {
                let s = Loc::Stack(stack_off);
                stack_off += 8;
                s
            };
            let dst = if arg.kind.is_float() {
                Loc::Fpr(fpr_num(arg.target.expect_fpr()))
            } else {
                Loc::Gpr(gpr(arg.target.expect_gpr()) as u8)
            };
            moves.push(MoveOp { src, dst, kind: arg.kind });
        }
        for (i, a) in moves.iter().enumerate() {
            for b in &moves[i + 1..] {
                assert!(a.dst != b.dst, "duplicate argument target");
            }
        }
        // Incoming stack slot 0 sits just above the return address.
        let stack_base = (frame.stack_delta + 8 * frame.saved_gprs + 8) as i32;
        for m in crate::abi::schedule(moves) {
            self.emit_move(buf, m, stack_base)?;
        }
        Ok(())
    }

    fn pass_args(&self, buf: &mut Arena, args: &[Arg]) -> EmitResult<()> {
        let mut moves = Vec::with_capacity(args.len());
        let mut imms: Vec<(Reg, i64)> = Vec::new();
        let mut ints = 0usize;
        let mut floats = 0usize;
        for arg in args {
            if arg.kind.is_float() {
                assert!(
                    floats < FLOAT_ARG_COUNT,
                    "outgoing float arguments beyond register capacity"
                );
                let dst = Loc::Fpr(floats as u8);
                floats += 1;
                let src = Loc::Fpr(fpr_num(arg.target.expect_fpr()));
                moves.push(MoveOp { src, dst, kind: arg.kind });
            } else {
                assert!(
                    ints < INT_ARG_REGS.len(),
                    "outgoing integer arguments beyond register capacity"
                );
                let reg = INT_ARG_REGS[ints];
                ints += 1;
                match arg.target {
                    Operand::Gpr(r) => {
                        moves.push(MoveOp {
                            src: Loc::Gpr(gpr(r) as u8),
                            dst: Loc::Gpr(reg as u8),
                            kind: arg.kind,
                        });
                    }
                    Operand::Imm(v) => imms.push((reg, v)),
                    _ => panic!("outgoing arguments come from registers or immediates"),
                }
            }
        }
        for m in crate::abi::schedule(moves) {
            self.emit_move(buf, m, 0)?;
        }
        // Immediates last: their targets are never move sources.
        for (reg, val) in imms {
            emit_mov_ri(buf, reg, val)?;
        }
        Ok(())
    }

    fn take_ret(&self, buf: &mut Arena, dst: Gpr) -> EmitResult<()> {
        emit_mov_rr(buf, gpr(dst), RET_REG)
    }

    fn take_ret_f(&self, buf: &mut Arena, _p: Precision, dst: Fpr) -> EmitResult<()> {
        if fpr_num(dst) != FRET_REG {
            emit_movaps(buf, fpr_num(dst), FRET_REG)?;
        }
        Ok(())
    }
}
