//! Ember backend: arena management, session lifecycle, and the
//! per-architecture instruction encoders.
//!
//! The emitter catalog in [`session::Session`] is written against the
//! [`HostEmit`] trait; exactly one implementation is compiled in per
//! build, selected by the target architecture. Generated code is
//! entered and left through the host C calling convention via the
//! session's ABI brackets.

pub mod abi;
pub mod arena;
pub mod exec;
pub mod session;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::Emitter as Host;

#[cfg(target_arch = "aarch64")]
pub use aarch64::Emitter as Host;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("no emitter backend for this architecture (supported: x86_64, aarch64)");

pub use arena::Arena;
pub use exec::ExecArena;
pub use session::{AbiToken, CodeObject, Session};

use abi::FrameLayout;
use ember_core::{
    AluOp, Arg, Cond, EmitResult, Extend, Fpr, FpuOp, Gpr, LabelUse, Mem, Precision, Width,
};

/// Host architecture encoder.
///
/// Each backend maps the virtual register file onto physical
/// registers, appends architecture-correct byte sequences for every
/// instruction family, and legalizes operand shapes its addressing
/// modes cannot express natively. Branch emitters leave a placeholder
/// displacement and return the [`LabelUse`] the label engine records
/// or patches.
pub trait HostEmit {
    /// Native machine word width of the generated code.
    const WORD: Width;

    fn new() -> Self;

    // -- Moves --

    fn mov(&self, buf: &mut Arena, dst: Gpr, src: Gpr) -> EmitResult<()>;
    fn mov_imm(&self, buf: &mut Arena, dst: Gpr, val: i64) -> EmitResult<()>;
    fn fmov(&self, buf: &mut Arena, p: Precision, dst: Fpr, src: Fpr) -> EmitResult<()>;
    /// Materialize the raw bit pattern `bits` in a float register.
    fn fmov_bits(&self, buf: &mut Arena, p: Precision, dst: Fpr, bits: u64) -> EmitResult<()>;

    // -- Integer arithmetic --

    fn alu(&self, buf: &mut Arena, op: AluOp, dst: Gpr, a: Gpr, b: Gpr) -> EmitResult<()>;
    fn alu_imm(&self, buf: &mut Arena, op: AluOp, dst: Gpr, a: Gpr, imm: i64) -> EmitResult<()>;
    /// Perform `op` and branch on signed overflow. Add/Sub/Mul only.
    fn alu_ovf(&self, buf: &mut Arena, op: AluOp, dst: Gpr, a: Gpr, b: Gpr)
        -> EmitResult<LabelUse>;

    // -- Floating point --

    fn fpu(
        &self,
        buf: &mut Arena,
        op: FpuOp,
        p: Precision,
        dst: Fpr,
        a: Fpr,
        b: Fpr,
    ) -> EmitResult<()>;

    // -- Memory --

    fn load(&self, buf: &mut Arena, dst: Gpr, mem: Mem, w: Width, ext: Extend) -> EmitResult<()>;
    fn store(&self, buf: &mut Arena, mem: Mem, src: Gpr, w: Width) -> EmitResult<()>;
    fn load_f(&self, buf: &mut Arena, p: Precision, dst: Fpr, mem: Mem) -> EmitResult<()>;
    fn store_f(&self, buf: &mut Arena, p: Precision, mem: Mem, src: Fpr) -> EmitResult<()>;

    // -- Control flow --

    fn branch(&self, buf: &mut Arena, cond: Cond, a: Gpr, b: Gpr) -> EmitResult<LabelUse>;
    fn branch_imm(&self, buf: &mut Arena, cond: Cond, a: Gpr, imm: i64) -> EmitResult<LabelUse>;
    fn jump(&self, buf: &mut Arena) -> EmitResult<LabelUse>;
    fn jump_reg(&self, buf: &mut Arena, r: Gpr) -> EmitResult<()>;
    fn call(&self, buf: &mut Arena, addr: usize) -> EmitResult<()>;
    fn call_reg(&self, buf: &mut Arena, r: Gpr) -> EmitResult<()>;
    fn ret(&self, buf: &mut Arena) -> EmitResult<()>;
    fn ret_val(&self, buf: &mut Arena, src: Gpr) -> EmitResult<()>;
    fn ret_imm(&self, buf: &mut Arena, val: i64) -> EmitResult<()>;
    fn ret_val_f(&self, buf: &mut Arena, p: Precision, src: Fpr) -> EmitResult<()>;

    /// Patch a recorded branch displacement to land on `target`.
    fn patch(&self, buf: &mut Arena, use_: LabelUse, target: usize);

    // -- ABI shim --

    fn prologue(
        &self,
        buf: &mut Arena,
        saved_gprs: usize,
        saved_fprs: usize,
        frame_size: usize,
    ) -> EmitResult<FrameLayout>;
    fn epilogue(&self, buf: &mut Arena, frame: &FrameLayout) -> EmitResult<()>;
    /// Move the first `args.len()` incoming host-ABI arguments into
    /// the operands the descriptors name.
    fn load_args(&self, buf: &mut Arena, frame: &FrameLayout, args: &[Arg]) -> EmitResult<()>;
    /// Place outgoing register arguments per the host ABI ahead of a
    /// `call`/`call_reg`.
    fn pass_args(&self, buf: &mut Arena, args: &[Arg]) -> EmitResult<()>;
    /// Fetch the integer return value after a call.
    fn take_ret(&self, buf: &mut Arena, dst: Gpr) -> EmitResult<()>;
    /// Fetch the float return value after a call.
    fn take_ret_f(&self, buf: &mut Arena, p: Precision, dst: Fpr) -> EmitResult<()>;
}
