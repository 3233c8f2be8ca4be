use ember_core::{Fpr, Gpr, FPR_COUNT, GPR_COUNT};

/// Physical backing of the virtual general registers under AAPCS64:
/// R0-R5 map to the x9-x14 temporaries, V0-V4 to callee-saved
/// x19-x23. x0-x8 (arguments and indirect-result), x16/x17 (scratch)
/// and x29/x30 (frame pointer and link) stay out of the file.
pub const GPR_MAP: [u8; GPR_COUNT] = [9, 10, 11, 12, 13, 14, 19, 20, 21, 22, 23];

/// F0-F3 map to v0-v3 (caller-save), F4-F7 to v8-v11 whose low 64
/// bits are callee-saved.
pub const FPR_MAP: [u8; FPR_COUNT] = [0, 1, 2, 3, 8, 9, 10, 11];

#[inline]
pub fn gpr(r: Gpr) -> u8 {
    GPR_MAP[r.index() as usize]
}

#[inline]
pub fn fpr_num(f: Fpr) -> u8 {
    FPR_MAP[f.index() as usize]
}

/// Intra-procedure-call scratch registers, reserved for displacement
/// and immediate legalization.
pub const SCRATCH: u8 = 16;
pub const SCRATCH2: u8 = 17;

/// Scratch vector register (outside the argument and virtual files).
pub const FSCRATCH: u8 = 31;

/// x0-x7 carry the first eight integer arguments.
pub const INT_ARG_COUNT: usize = 8;

/// v0-v7 carry the first eight float arguments.
pub const FLOAT_ARG_COUNT: usize = 8;

/// Integer return register (x0).
pub const RET_REG: u8 = 0;

/// Float return register (v0).
pub const FRET_REG: u8 = 0;

/// Callee-saved registers backing V0-V4, saved in prologue order.
pub const CALLEE_SAVED_POOL: [u8; 5] = [19, 20, 21, 22, 23];

/// Callee-saved vector registers backing F4-F7.
pub const FPR_CALLEE_POOL: [u8; 4] = [8, 9, 10, 11];

pub const FP: u8 = 29;
pub const LR: u8 = 30;
/// Encodes SP or XZR depending on instruction context.
pub const ZR: u8 = 31;

pub const STACK_ALIGN: usize = 16;
