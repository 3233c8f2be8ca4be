use ember_core::{Fpr, Gpr, GPR_COUNT};

/// x86-64 general-purpose register indices.
///
/// Encoding matches the x86-64 ModR/M and REX register numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    /// Low 3 bits of the register encoding (for ModR/M).
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }
}

/// Physical backing of the virtual general registers: R0-R5 map to
/// caller-save registers, V0-V4 to callee-saved ones. RSP, RBP, R8/R9
/// (argument registers) and R11 (scratch) stay out of the file.
pub const GPR_MAP: [Reg; GPR_COUNT] = [
    Reg::Rax,
    Reg::Rcx,
    Reg::Rdx,
    Reg::Rsi,
    Reg::Rdi,
    Reg::R10,
    Reg::Rbx,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
];

/// F0-F7 map straight onto xmm0-xmm7; all xmm registers are
/// caller-save under the System V ABI.
#[inline]
pub fn fpr_num(f: Fpr) -> u8 {
    f.index()
}

#[inline]
pub fn gpr(r: Gpr) -> Reg {
    GPR_MAP[r.index() as usize]
}

/// Reserved scratch register for displacement and immediate
/// legalization and for breaking marshaling cycles.
pub const SCRATCH: Reg = Reg::R11;

/// Scratch xmm register (outside the argument and virtual files).
pub const FSCRATCH: u8 = 15;

/// Integer argument registers (System V AMD64 ABI).
pub const INT_ARG_REGS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

/// Number of xmm argument registers (xmm0-xmm7).
pub const FLOAT_ARG_COUNT: usize = 8;

/// Integer return register.
pub const RET_REG: Reg = Reg::Rax;

/// Float return register (xmm0).
pub const FRET_REG: u8 = 0;

/// Callee-saved registers backing V0-V4, saved in prologue order.
pub const CALLEE_SAVED_POOL: [Reg; 5] = [Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

pub const STACK_ALIGN: usize = 16;
