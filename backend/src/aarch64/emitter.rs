//! AArch64 instruction encoder.
//!
//! Every instruction is one little-endian 32-bit word; encoders OR
//! register numbers and immediate fields into fixed opcode templates.
//! Scaled-immediate addressing covers the common loads and stores,
//! with out-of-range displacements legalized through x16/x17.

use crate::abi::{Bank, FrameLayout, Loc, MoveOp};
use crate::arena::Arena;
use crate::HostEmit;
use ember_core::{
    AluOp, Arg, ArgKind, BranchKind, Cond, EmitResult, Extend, Fpr, FpuOp, Gpr, LabelUse, Mem,
    Operand, Precision, Width,
};
use log::trace;

use super::regs::{
    fpr_num, gpr, CALLEE_SAVED_POOL, FLOAT_ARG_COUNT, FP, FPR_CALLEE_POOL, FRET_REG, FSCRATCH,
    INT_ARG_COUNT, RET_REG, SCRATCH, SCRATCH2, STACK_ALIGN, ZR,
};

// -- Instruction templates (register fields zero) --

const ORR_RR: u32 = 0xAA00_03E0; // orr xd, xzr, xm
const MOVZ: u32 = 0xD280_0000;
const MOVN: u32 = 0x9280_0000;
const MOVK: u32 = 0xF280_0000;
const ADD_RRR: u32 = 0x8B00_0000;
const SUB_RRR: u32 = 0xCB00_0000;
const ADDS_RRR: u32 = 0xAB00_0000;
const SUBS_RRR: u32 = 0xEB00_0000;
const ADD_IMM: u32 = 0x9100_0000;
const SUB_IMM: u32 = 0xD100_0000;
const ADDS_IMM: u32 = 0xB100_0000;
const SUBS_IMM: u32 = 0xF100_0000;
const MUL: u32 = 0x9B00_7C00; // madd xd, xn, xm, xzr
const SMULH: u32 = 0x9B40_7C00;
const SDIV: u32 = 0x9AC0_0C00;
const UDIV: u32 = 0x9AC0_0800;
const B: u32 = 0x1400_0000;
const BCOND: u32 = 0x5400_0000;
const BR: u32 = 0xD61F_0000;
const BL: u32 = 0x9400_0000;
const BLR: u32 = 0xD63F_0000;
const RET: u32 = 0xD65F_03C0;
const STP_PRE_FP_LR: u32 = 0xA9BF_7BFD; // stp x29, x30, [sp, #-16]!
const LDP_POST_FP_LR: u32 = 0xA8C1_7BFD; // ldp x29, x30, [sp], #16
const MOV_FP_SP: u32 = 0x9100_03FD; // add x29, sp, #0
const STR_PRE_16: u32 = 0xF81F_0C00; // str xt, [rn, #-16]!
const LDR_POST_16: u32 = 0xF841_0400; // ldr xt, [rn], #16
const STR_PRE_16_FP: u32 = 0xFC1F_0C00; // str dt, [rn, #-16]!
const LDR_POST_16_FP: u32 = 0xFC41_0400; // ldr dt, [rn], #16
const FMOV_W_S: u32 = 0x1E27_0000;
const FMOV_X_D: u32 = 0x9E67_0000;

/// Legalized address: either a scaled unsigned 12-bit displacement or
/// a register offset.
#[derive(Clone, Copy)]
enum AddrMode {
    Uimm12(i64),
    Reg(u8),
}

#[inline]
fn emit_u32(buf: &mut Arena, insn: u32) -> EmitResult<()> {
    buf.put_u32(insn)
}

/// Three-register form: template | rm | rn | rd.
#[inline]
fn rrr(template: u32, rd: u8, rn: u8, rm: u8) -> u32 {
    template | (rm as u32) << 16 | (rn as u32) << 5 | rd as u32
}

fn emit_mov_rr(buf: &mut Arena, rd: u8, rm: u8) -> EmitResult<()> {
    if rd == rm {
        return Ok(());
    }
    emit_u32(buf, ORR_RR | (rm as u32) << 16 | rd as u32)
}

/// Materialize a 64-bit immediate with movz/movn plus movk, seeding
/// from whichever polarity leaves fewer halfwords to patch.
fn emit_mov_ri(buf: &mut Arena, rd: u8, val: i64) -> EmitResult<()> {
    let u = val as u64;
    let chunk = |hw: u32| ((u >> (hw * 16)) & 0xFFFF) as u32;
    let ones = (0..4).filter(|&hw| chunk(hw) == 0xFFFF).count();
    let zeros = (0..4).filter(|&hw| chunk(hw) == 0).count();

    let mut seeded = false;
    if ones > zeros {
        for hw in 0..4u32 {
            let c = chunk(hw);
            if c == 0xFFFF {
                continue;
            }
            if !seeded {
                emit_u32(buf, MOVN | hw << 21 | (!c & 0xFFFF) << 5 | rd as u32)?;
                seeded = true;
            } else {
                emit_u32(buf, MOVK | hw << 21 | c << 5 | rd as u32)?;
            }
        }
        if !seeded {
            // val == -1
            emit_u32(buf, MOVN | rd as u32)?;
        }
    } else {
        for hw in 0..4u32 {
            let c = chunk(hw);
            if c == 0 {
                continue;
            }
            if !seeded {
                emit_u32(buf, MOVZ | hw << 21 | c << 5 | rd as u32)?;
                seeded = true;
            } else {
                emit_u32(buf, MOVK | hw << 21 | c << 5 | rd as u32)?;
            }
        }
        if !seeded {
            emit_u32(buf, MOVZ | rd as u32)?;
        }
    }
    Ok(())
}

/// Add or subtract an unsigned immediate, splitting across the
/// optionally-shifted 12-bit fields.
fn emit_addsub_imm(buf: &mut Arena, template: u32, rd: u8, rn: u8, imm: usize) -> EmitResult<()> {
    assert!(imm < 1 << 24, "immediate out of add/sub range");
    let lo = (imm & 0xFFF) as u32;
    let hi = (imm >> 12) as u32;
    let mut rn = rn;
    if hi != 0 {
        emit_u32(buf, template | 1 << 22 | hi << 10 | (rn as u32) << 5 | rd as u32)?;
        rn = rd;
    }
    if lo != 0 || hi == 0 {
        emit_u32(buf, template | lo << 10 | (rn as u32) << 5 | rd as u32)?;
    }
    Ok(())
}

/// B.cond with a zero placeholder displacement.
fn emit_bcond(buf: &mut Arena, cond_bits: u32) -> EmitResult<LabelUse> {
    let offset = buf.offset();
    emit_u32(buf, BCOND | cond_bits)?;
    Ok(LabelUse { offset, kind: BranchKind::Imm19 })
}

/// AArch64 condition field for a branch following `cmp a, b`.
const fn cond_bits(cond: Cond) -> u32 {
    match cond {
        Cond::Eq => 0x0,
        Cond::Ne => 0x1,
        Cond::Lt => 0xB,
        Cond::Ge => 0xA,
        Cond::Le => 0xD,
        Cond::Gt => 0xC,
        Cond::Ltu => 0x3, // lo
        Cond::Geu => 0x2, // hs
        Cond::Leu => 0x9, // ls
        Cond::Gtu => 0x8, // hi
    }
}

const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Integer load templates: (scaled-uimm12 form, register-offset form).
const fn ld_opc(w: Width, ext: Extend) -> (u32, u32) {
    match (w, ext) {
        (Width::W8, Extend::Zero) => (0x3940_0000, 0x3860_6800),
        (Width::W8, Extend::Sign) => (0x3980_0000, 0x38A0_6800),
        (Width::W16, Extend::Zero) => (0x7940_0000, 0x7860_6800),
        (Width::W16, Extend::Sign) => (0x7980_0000, 0x78A0_6800),
        (Width::W32, Extend::Zero) => (0xB940_0000, 0xB860_6800),
        (Width::W32, Extend::Sign) => (0xB980_0000, 0xB8A0_6800),
        (Width::W64, _) => (0xF940_0000, 0xF860_6800),
    }
}

const fn st_opc(w: Width) -> (u32, u32) {
    match w {
        Width::W8 => (0x3900_0000, 0x3820_6800),
        Width::W16 => (0x7900_0000, 0x7820_6800),
        Width::W32 => (0xB900_0000, 0xB820_6800),
        Width::W64 => (0xF900_0000, 0xF820_6800),
    }
}

const fn ld_opc_f(p: Precision) -> (u32, u32) {
    match p {
        Precision::Single => (0xBD40_0000, 0xBC60_6800),
        Precision::Double => (0xFD40_0000, 0xFC60_6800),
    }
}

const fn st_opc_f(p: Precision) -> (u32, u32) {
    match p {
        Precision::Single => (0xBD00_0000, 0xBC20_6800),
        Precision::Double => (0xFD00_0000, 0xFC20_6800),
    }
}

fn emit_ldst(
    buf: &mut Arena,
    opcs: (u32, u32),
    size: u32,
    rt: u8,
    rn: u8,
    mode: AddrMode,
) -> EmitResult<()> {
    match mode {
        AddrMode::Uimm12(disp) => {
            let scaled = (disp as u64 / size as u64) as u32;
            emit_u32(buf, opcs.0 | scaled << 10 | (rn as u32) << 5 | rt as u32)
        }
        AddrMode::Reg(rm) => {
            emit_u32(buf, opcs.1 | (rm as u32) << 16 | (rn as u32) << 5 | rt as u32)
        }
    }
}

const fn uimm12_fits(disp: i64, size: u32) -> bool {
    disp >= 0 && disp % size as i64 == 0 && disp / (size as i64) < 4096
}

/// AArch64 encoder. Stateless; all emission state lives in the arena
/// and the session driving it.
pub struct Emitter;

impl Emitter {
    /// Reduce a memory operand to a base register plus an encodable
    /// addressing mode, synthesizing through x16/x17 when needed.
    fn legalize(&self, buf: &mut Arena, mem: Mem, size: u32) -> EmitResult<(u8, AddrMode)> {
        let rn = gpr(mem.base);
        match (mem.index, mem.disp) {
            (None, 0) => Ok((rn, AddrMode::Uimm12(0))),
            (None, d) if uimm12_fits(d, size) => Ok((rn, AddrMode::Uimm12(d))),
            (None, d) => {
                emit_mov_ri(buf, SCRATCH, d)?;
                Ok((rn, AddrMode::Reg(SCRATCH)))
            }
            (Some(ix), 0) => Ok((rn, AddrMode::Reg(gpr(ix)))),
            (Some(ix), d) => {
                emit_u32(buf, rrr(ADD_RRR, SCRATCH2, rn, gpr(ix)))?;
                if uimm12_fits(d, size) {
                    Ok((SCRATCH2, AddrMode::Uimm12(d)))
                } else {
                    emit_mov_ri(buf, SCRATCH, d)?;
                    Ok((SCRATCH2, AddrMode::Reg(SCRATCH)))
                }
            }
        }
    }

    /// Emit one scheduled marshaling move. Incoming stack argument
    /// slot zero lives at [x29, #16], above the saved frame record.
    fn emit_move(&self, buf: &mut Arena, m: MoveOp) -> EmitResult<()> {
        let scratch_of = |bank: Bank| match bank {
            Bank::Int => Loc::Gpr(SCRATCH),
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
            (Loc::Gpr(s), Loc::Gpr(d)) => emit_mov_rr(buf, d, s),
            // The d-form copy moves the whole low 64 bits, which also
            // covers singles.
            (Loc::Fpr(s), Loc::Fpr(d)) => {
                if s == d {
                    Ok(())
                } else {
                    emit_u32(buf, 0x1E60_4000 | (s as u32) << 5 | d as u32)
                }
            }
            (Loc::Stack(off), Loc::Gpr(d)) => emit_ldst(
                buf,
                ld_opc(Width::W64, Extend::Zero),
                8,
                d,
                FP,
                AddrMode::Uimm12(16 + off as i64),
            ),
            (Loc::Stack(off), Loc::Fpr(d)) => {
                let p = match m.kind {
                    ArgKind::Float => Precision::Single,
                    _ => Precision::Double,
                };
                emit_ldst(buf, ld_opc_f(p), p.bytes(), d, FP, AddrMode::Uimm12(16 + off as i64))
            }
            _ => unreachable!("cross-bank argument move"),
        }
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

    fn fmov(&self, buf: &mut Arena, p: Precision, dst: Fpr, src: Fpr) -> EmitResult<()> {
        if dst == src {
            return Ok(());
        }
        let template = match p {
            Precision::Single => 0x1E20_4000,
            Precision::Double => 0x1E60_4000,
        };
        emit_u32(buf, template | (fpr_num(src) as u32) << 5 | fpr_num(dst) as u32)
    }

    fn fmov_bits(&self, buf: &mut Arena, p: Precision, dst: Fpr, bits: u64) -> EmitResult<()> {
        emit_mov_ri(buf, SCRATCH, bits as i64)?;
        let template = match p {
            Precision::Single => FMOV_W_S,
            Precision::Double => FMOV_X_D,
        };
        emit_u32(buf, template | (SCRATCH as u32) << 5 | fpr_num(dst) as u32)
    }

    fn alu(&self, buf: &mut Arena, op: AluOp, dst: Gpr, a: Gpr, b: Gpr) -> EmitResult<()> {
        let template = match op {
            AluOp::Add => ADD_RRR,
            AluOp::Sub => SUB_RRR,
            AluOp::Mul => MUL,
            AluOp::Div => SDIV,
            AluOp::Divu => UDIV,
        };
        emit_u32(buf, rrr(template, gpr(dst), gpr(a), gpr(b)))
    }

    fn alu_imm(&self, buf: &mut Arena, op: AluOp, dst: Gpr, a: Gpr, imm: i64) -> EmitResult<()> {
        let (d, a) = (gpr(dst), gpr(a));
        match op {
            AluOp::Add | AluOp::Sub => {
                // Negating the immediate flips the operation.
                let (template, mag) = if imm >= 0 {
                    (if op == AluOp::Add { ADD_IMM } else { SUB_IMM }, imm as u64)
                } else {
                    (if op == AluOp::Add { SUB_IMM } else { ADD_IMM }, imm.unsigned_abs())
                };
                if mag < 4096 {
                    return emit_u32(buf, template | (mag as u32) << 10 | (a as u32) << 5 | d as u32);
                }
            }
            _ => {}
        }
        emit_mov_ri(buf, SCRATCH, imm)?;
        let template = match op {
            AluOp::Add => ADD_RRR,
            AluOp::Sub => SUB_RRR,
            AluOp::Mul => MUL,
            AluOp::Div => SDIV,
            AluOp::Divu => UDIV,
        };
        emit_u32(buf, rrr(template, d, a, SCRATCH))
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
            AluOp::Add => {
                emit_u32(buf, rrr(ADDS_RRR, d, a, b))?;
                emit_bcond(buf, 0x6) // vs
            }
            AluOp::Sub => {
                emit_u32(buf, rrr(SUBS_RRR, d, a, b))?;
                emit_bcond(buf, 0x6)
            }
            AluOp::Mul => {
                // Overflow iff the high half disagrees with the sign
                // extension of the low half.
                emit_u32(buf, rrr(SMULH, SCRATCH, a, b))?;
                emit_u32(buf, rrr(MUL, d, a, b))?;
                // subs xzr, x16, xd, asr #63
                emit_u32(buf, SUBS_RRR | 2 << 22 | (d as u32) << 16 | 63 << 10 | (SCRATCH as u32) << 5 | ZR as u32)?;
                emit_bcond(buf, 0x1) // ne
            }
            AluOp::Div | AluOp::Divu => {
                panic!("overflow-checked arithmetic supports Add, Sub and Mul only")
            }
        }
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
        let single = match op {
            FpuOp::Add => 0x1E20_2800,
            FpuOp::Sub => 0x1E20_3800,
            FpuOp::Mul => 0x1E20_0800,
            FpuOp::Div => 0x1E20_1800,
        };
        let template = match p {
            Precision::Single => single,
            Precision::Double => single | 0x0040_0000,
        };
        emit_u32(buf, rrr(template, fpr_num(dst), fpr_num(a), fpr_num(b)))
    }

    fn load(&self, buf: &mut Arena, dst: Gpr, mem: Mem, w: Width, ext: Extend) -> EmitResult<()> {
        let (rn, mode) = self.legalize(buf, mem, w.bytes())?;
        emit_ldst(buf, ld_opc(w, ext), w.bytes(), gpr(dst), rn, mode)
    }

    fn store(&self, buf: &mut Arena, mem: Mem, src: Gpr, w: Width) -> EmitResult<()> {
        let (rn, mode) = self.legalize(buf, mem, w.bytes())?;
        emit_ldst(buf, st_opc(w), w.bytes(), gpr(src), rn, mode)
    }

    fn load_f(&self, buf: &mut Arena, p: Precision, dst: Fpr, mem: Mem) -> EmitResult<()> {
        let (rn, mode) = self.legalize(buf, mem, p.bytes())?;
        emit_ldst(buf, ld_opc_f(p), p.bytes(), fpr_num(dst), rn, mode)
    }

    fn store_f(&self, buf: &mut Arena, p: Precision, mem: Mem, src: Fpr) -> EmitResult<()> {
        let (rn, mode) = self.legalize(buf, mem, p.bytes())?;
        emit_ldst(buf, st_opc_f(p), p.bytes(), fpr_num(src), rn, mode)
    }

    fn branch(&self, buf: &mut Arena, cond: Cond, a: Gpr, b: Gpr) -> EmitResult<LabelUse> {
        emit_u32(buf, rrr(SUBS_RRR, ZR, gpr(a), gpr(b)))?;
        emit_bcond(buf, cond_bits(cond))
    }

    fn branch_imm(&self, buf: &mut Arena, cond: Cond, a: Gpr, imm: i64) -> EmitResult<LabelUse> {
        let rn = gpr(a);
        if (0..4096).contains(&imm) {
            emit_u32(buf, SUBS_IMM | (imm as u32) << 10 | (rn as u32) << 5 | ZR as u32)?;
        } else if (-4095..0).contains(&imm) {
            // cmn: compare against the negated immediate.
            emit_u32(buf, ADDS_IMM | (imm.unsigned_abs() as u32) << 10 | (rn as u32) << 5 | ZR as u32)?;
        } else {
            emit_mov_ri(buf, SCRATCH, imm)?;
            emit_u32(buf, rrr(SUBS_RRR, ZR, rn, SCRATCH))?;
        }
        emit_bcond(buf, cond_bits(cond))
    }

    fn jump(&self, buf: &mut Arena) -> EmitResult<LabelUse> {
        let offset = buf.offset();
        emit_u32(buf, B)?;
        Ok(LabelUse { offset, kind: BranchKind::Imm26 })
    }

    fn jump_reg(&self, buf: &mut Arena, r: Gpr) -> EmitResult<()> {
        emit_u32(buf, BR | (gpr(r) as u32) << 5)
    }

    fn call(&self, buf: &mut Arena, addr: usize) -> EmitResult<()> {
        let next = buf.base_ptr() as i64 + buf.offset() as i64;
        let disp = addr as i64 - next;
        if disp % 4 == 0 && (-(1 << 27)..1 << 27).contains(&disp) {
            emit_u32(buf, BL | ((disp >> 2) as u32 & 0x03FF_FFFF))
        } else {
            emit_mov_ri(buf, SCRATCH, addr as i64)?;
            emit_u32(buf, BLR | (SCRATCH as u32) << 5)
        }
    }

    fn call_reg(&self, buf: &mut Arena, r: Gpr) -> EmitResult<()> {
        emit_u32(buf, BLR | (gpr(r) as u32) << 5)
    }

    fn ret(&self, buf: &mut Arena) -> EmitResult<()> {
        emit_u32(buf, RET)
    }

    fn ret_val(&self, buf: &mut Arena, src: Gpr) -> EmitResult<()> {
        emit_mov_rr(buf, RET_REG, gpr(src))?;
        self.ret(buf)
    }

    fn ret_imm(&self, buf: &mut Arena, val: i64) -> EmitResult<()> {
        emit_mov_ri(buf, RET_REG, val)?;
        self.ret(buf)
    }

    fn ret_val_f(&self, buf: &mut Arena, p: Precision, src: Fpr) -> EmitResult<()> {
        if fpr_num(src) != FRET_REG {
            self.fmov(buf, p, Fpr::from_index(0), src)?;
        }
        self.ret(buf)
    }

    fn patch(&self, buf: &mut Arena, use_: LabelUse, target: usize) {
        let disp = target as i64 - use_.offset as i64;
        assert!(disp % 4 == 0, "unaligned branch displacement");
        let insn = buf.read_u32(use_.offset);
        let patched = match use_.kind {
            BranchKind::Imm19 => {
                assert!(
                    (-(1 << 20)..1 << 20).contains(&disp),
                    "branch displacement {disp} out of imm19 range"
                );
                insn | (((disp >> 2) as u32) & 0x7_FFFF) << 5
            }
            BranchKind::Imm26 => {
                assert!(
                    (-(1 << 27)..1 << 27).contains(&disp),
                    "branch displacement {disp} out of imm26 range"
                );
                insn | ((disp >> 2) as u32) & 0x03FF_FFFF
            }
            BranchKind::Rel32 => unreachable!("not an aarch64 branch encoding"),
        };
        buf.patch_u32(use_.offset, patched);
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
        assert!(
            saved_fprs <= FPR_CALLEE_POOL.len(),
            "at most {} callee-saved float registers available",
            FPR_CALLEE_POOL.len()
        );
        trace!("prologue: save {saved_gprs} gprs, {saved_fprs} fprs, frame {frame_size}");

        emit_u32(buf, STP_PRE_FP_LR)?;
        emit_u32(buf, MOV_FP_SP)?;
        for &r in &CALLEE_SAVED_POOL[..saved_gprs] {
            emit_u32(buf, STR_PRE_16 | (ZR as u32) << 5 | r as u32)?;
        }
        for &v in &FPR_CALLEE_POOL[..saved_fprs] {
            emit_u32(buf, STR_PRE_16_FP | (ZR as u32) << 5 | v as u32)?;
        }
        let delta = align_up(frame_size, STACK_ALIGN);
        if delta > 0 {
            emit_addsub_imm(buf, SUB_IMM, ZR, ZR, delta)?;
        }
        Ok(FrameLayout { saved_gprs, saved_fprs, frame_size, stack_delta: delta })
    }

    fn epilogue(&self, buf: &mut Arena, frame: &FrameLayout) -> EmitResult<()> {
        if frame.stack_delta > 0 {
            emit_addsub_imm(buf, ADD_IMM, ZR, ZR, frame.stack_delta)?;
        }
        for &v in FPR_CALLEE_POOL[..frame.saved_fprs].iter().rev() {
            emit_u32(buf, LDR_POST_16_FP | (ZR as u32) << 5 | v as u32)?;
        }
        for &r in CALLEE_SAVED_POOL[..frame.saved_gprs].iter().rev() {
            emit_u32(buf, LDR_POST_16 | (ZR as u32) << 5 | r as u32)?;
        }
        emit_u32(buf, LDP_POST_FP_LR)
    }

    fn load_args(&self, buf: &mut Arena, _frame: &FrameLayout, args: &[Arg]) -> EmitResult<()> {
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
            } else if ints < INT_ARG_COUNT {
                let s = Loc::Gpr(ints as u8);
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
                Loc::Gpr(gpr(arg.target.expect_gpr()))
            };
            moves.push(MoveOp { src, dst, kind: arg.kind });
        }
        for (i, a) in moves.iter().enumerate() {
            for b in &moves[i + 1..] {
                assert!(a.dst != b.dst, "duplicate argument target");
            }
        }
        for m in crate::abi::schedule(moves) {
            self.emit_move(buf, m)?;
        }
        Ok(())
    }

    fn pass_args(&self, buf: &mut Arena, args: &[Arg]) -> EmitResult<()> {
        let mut moves = Vec::with_capacity(args.len());
        let mut imms: Vec<(u8, i64)> = Vec::new();
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
                    ints < INT_ARG_COUNT,
                    "outgoing integer arguments beyond register capacity"
                );
                let reg = ints as u8;
                ints += 1;
                match arg.target {
                    Operand::Gpr(r) => {
                        moves.push(MoveOp {
                            src: Loc::Gpr(gpr(r)),
                            dst: Loc::Gpr(reg),
                            kind: arg.kind,
                        });
                    }
                    Operand::Imm(v) => imms.push((reg, v)),
                    _ => panic!("outgoing arguments come from registers or immediates"),
                }
            }
        }
        for m in crate::abi::schedule(moves) {
            self.emit_move(buf, m)?;
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

    fn take_ret_f(&self, buf: &mut Arena, p: Precision, dst: Fpr) -> EmitResult<()> {
        if fpr_num(dst) != FRET_REG {
            self.fmov(buf, p, dst, Fpr::from_index(0))?;
        }
        Ok(())
    }
}
