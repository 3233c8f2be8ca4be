//! Emission sessions.
//!
//! A [`Session`] owns the write cursor over one code arena and drives
//! the host encoder through the instruction catalog. It tracks labels
//! and their pending forward references, brackets the host calling
//! convention with `enter_abi`/`leave_abi`, and finalizes into a
//! [`CodeObject`] once every reference is resolved.
//!
//! Misuse of the session protocol (emitting after `end`, binding a
//! label twice, leaving an ABI bracket that was never entered) is a
//! caller bug and panics; only arena exhaustion is reported as an
//! error.

use crate::abi::FrameLayout;
use crate::arena::Arena;
use crate::{Host, HostEmit};
use ember_core::{
    AluOp, Arg, Cond, EmitResult, Extend, Fpr, FpuOp, Gpr, Label, LabelState, LabelUse, Mem,
    Precision, Width,
};
use log::{debug, trace};
use std::sync::atomic::{AtomicU32, Ordering};

/// Bracket identities are process-wide, so a token cannot authorize an
/// epilogue in a session it did not come from.
static ABI_SEQ: AtomicU32 = AtomicU32::new(1);

/// Finalized code: the span of the arena a session filled.
///
/// The memory behind `ptr` belongs to the caller (typically an
/// [`ExecArena`](crate::ExecArena)); the object stays valid as long as
/// that storage does and has been made executable.
#[derive(Debug, Clone, Copy)]
pub struct CodeObject {
    ptr: *const u8,
    len: usize,
}

impl CodeObject {
    #[inline]
    pub fn ptr(&self) -> *const u8 {
        self.ptr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Proof that `enter_abi` ran, required by `leave_abi` and
/// `load_args`. Not cloneable; each token belongs to exactly one
/// bracket of one session.
pub struct AbiToken {
    frame: FrameLayout,
    seq: u32,
}

impl AbiToken {
    /// Frame facts recorded by the prologue.
    pub fn frame(&self) -> &FrameLayout {
        &self.frame
    }
}

enum State {
    Open,
    Closed,
}

struct AbiState {
    seq: u32,
    leaves: u32,
}

/// One machine-code emission session over a borrowed arena.
pub struct Session<'a> {
    buf: Arena<'a>,
    host: Host,
    labels: Vec<LabelState>,
    abi: Option<AbiState>,
    state: State,
}

impl<'a> Session<'a> {
    /// Open a session writing into `buf`, which must be writable for
    /// the whole emission.
    pub fn begin(buf: &'a mut [u8]) -> Session<'a> {
        debug!("session opened: {} byte arena", buf.len());
        Session {
            buf: Arena::new(buf),
            host: Host::new(),
            labels: Vec::new(),
            abi: None,
            state: State::Open,
        }
    }

    /// Native machine word width of the generated code.
    pub fn word_width(&self) -> Width {
        Host::WORD
    }

    /// Current write offset into the arena.
    #[inline]
    pub fn offset(&self) -> usize {
        self.buf.offset()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// The emitted bytes so far.
    pub fn emitted(&self) -> &[u8] {
        self.buf.as_slice()
    }

    fn assert_open(&self) {
        assert!(
            matches!(self.state, State::Open),
            "session already finalized"
        );
    }

    // -- Labels --

    /// Create an unbound label for a forward branch target.
    pub fn forward(&mut self) -> Label {
        self.assert_open();
        let label = Label::from_index(self.labels.len() as u32);
        self.labels.push(LabelState::default());
        label
    }

    /// Bind `label` to the current offset and back-patch every pending
    /// reference. Binding twice is a caller bug.
    pub fn bind(&mut self, label: Label) {
        self.assert_open();
        let at = self.buf.offset();
        let state = &mut self.labels[label.index()];
        assert!(state.bound.is_none(), "label bound twice");
        state.bound = Some(at);
        let uses = std::mem::take(&mut state.uses);
        trace!("bind label {} at {:#x} ({} pending)", label.index(), at, uses.len());
        for u in uses {
            self.host.patch(&mut self.buf, u, at);
        }
    }

    /// Create a label bound to the current offset.
    pub fn here(&mut self) -> Label {
        let label = self.forward();
        self.bind(label);
        label
    }

    /// Resolve or record one branch reference to `label`.
    fn use_label(&mut self, label: Label, use_: LabelUse) {
        let state = &mut self.labels[label.index()];
        match state.bound {
            Some(target) => self.host.patch(&mut self.buf, use_, target),
            None => state.uses.push(use_),
        }
    }

    // -- Moves --

    pub fn mov(&mut self, dst: Gpr, src: Gpr) -> EmitResult<()> {
        self.assert_open();
        self.host.mov(&mut self.buf, dst, src)
    }

    pub fn mov_imm(&mut self, dst: Gpr, val: i64) -> EmitResult<()> {
        self.assert_open();
        self.host.mov_imm(&mut self.buf, dst, val)
    }

    pub fn fmov(&mut self, p: Precision, dst: Fpr, src: Fpr) -> EmitResult<()> {
        self.assert_open();
        self.host.fmov(&mut self.buf, p, dst, src)
    }

    /// Materialize a float constant. Singles are rounded from the
    /// double value before their bit pattern is loaded.
    pub fn fmov_imm(&mut self, p: Precision, dst: Fpr, val: f64) -> EmitResult<()> {
        self.assert_open();
        let bits = match p {
            Precision::Single => (val as f32).to_bits() as u64,
            Precision::Double => val.to_bits(),
        };
        self.host.fmov_bits(&mut self.buf, p, dst, bits)
    }

    // -- Integer arithmetic --

    pub fn alu(&mut self, op: AluOp, dst: Gpr, a: Gpr, b: Gpr) -> EmitResult<()> {
        self.assert_open();
        self.host.alu(&mut self.buf, op, dst, a, b)
    }

    pub fn alu_imm(&mut self, op: AluOp, dst: Gpr, a: Gpr, imm: i64) -> EmitResult<()> {
        self.assert_open();
        self.host.alu_imm(&mut self.buf, op, dst, a, imm)
    }

    /// Perform `op` and branch to `overflow` on signed overflow.
    /// Supported for Add, Sub and Mul.
    pub fn alu_ovf(
        &mut self,
        op: AluOp,
        dst: Gpr,
        a: Gpr,
        b: Gpr,
        overflow: Label,
    ) -> EmitResult<()> {
        self.assert_open();
        let use_ = self.host.alu_ovf(&mut self.buf, op, dst, a, b)?;
        self.use_label(overflow, use_);
        Ok(())
    }

    // -- Floating point --

    pub fn fpu(&mut self, op: FpuOp, p: Precision, dst: Fpr, a: Fpr, b: Fpr) -> EmitResult<()> {
        self.assert_open();
        self.host.fpu(&mut self.buf, op, p, dst, a, b)
    }

    // -- Memory --

    pub fn load(&mut self, dst: Gpr, mem: Mem, w: Width, ext: Extend) -> EmitResult<()> {
        self.assert_open();
        self.host.load(&mut self.buf, dst, mem, w, ext)
    }

    pub fn store(&mut self, mem: Mem, src: Gpr, w: Width) -> EmitResult<()> {
        self.assert_open();
        self.host.store(&mut self.buf, mem, src, w)
    }

    pub fn load_f(&mut self, p: Precision, dst: Fpr, mem: Mem) -> EmitResult<()> {
        self.assert_open();
        self.host.load_f(&mut self.buf, p, dst, mem)
    }

    pub fn store_f(&mut self, p: Precision, mem: Mem, src: Fpr) -> EmitResult<()> {
        self.assert_open();
        self.host.store_f(&mut self.buf, p, mem, src)
    }

    // -- Control flow --

    pub fn branch(&mut self, cond: Cond, a: Gpr, b: Gpr, target: Label) -> EmitResult<()> {
        self.assert_open();
        let use_ = self.host.branch(&mut self.buf, cond, a, b)?;
        self.use_label(target, use_);
        Ok(())
    }

    pub fn branch_imm(&mut self, cond: Cond, a: Gpr, imm: i64, target: Label) -> EmitResult<()> {
        self.assert_open();
        let use_ = self.host.branch_imm(&mut self.buf, cond, a, imm)?;
        self.use_label(target, use_);
        Ok(())
    }

    pub fn jump(&mut self, target: Label) -> EmitResult<()> {
        self.assert_open();
        let use_ = self.host.jump(&mut self.buf)?;
        self.use_label(target, use_);
        Ok(())
    }

    pub fn jump_reg(&mut self, r: Gpr) -> EmitResult<()> {
        self.assert_open();
        self.host.jump_reg(&mut self.buf, r)
    }

    /// Call a host function by absolute address. Arguments go through
    /// [`pass_args`](Session::pass_args) first.
    pub fn call(&mut self, addr: usize) -> EmitResult<()> {
        self.assert_open();
        self.host.call(&mut self.buf, addr)
    }

    pub fn call_reg(&mut self, r: Gpr) -> EmitResult<()> {
        self.assert_open();
        self.host.call_reg(&mut self.buf, r)
    }

    pub fn ret(&mut self) -> EmitResult<()> {
        self.assert_open();
        self.host.ret(&mut self.buf)
    }

    pub fn ret_val(&mut self, src: Gpr) -> EmitResult<()> {
        self.assert_open();
        self.host.ret_val(&mut self.buf, src)
    }

    pub fn ret_imm(&mut self, val: i64) -> EmitResult<()> {
        self.assert_open();
        self.host.ret_imm(&mut self.buf, val)
    }

    pub fn ret_val_f(&mut self, p: Precision, src: Fpr) -> EmitResult<()> {
        self.assert_open();
        self.host.ret_val_f(&mut self.buf, p, src)
    }

    // -- ABI shim --

    /// Emit the function prologue: save `saved_gprs` V registers (and
    /// `saved_fprs` callee-saved float registers where the host ABI
    /// has them), reserve `frame_size` scratch bytes, and keep the
    /// stack aligned for calls. Returns the token the matching
    /// [`leave_abi`](Session::leave_abi) calls require.
    pub fn enter_abi(
        &mut self,
        saved_gprs: usize,
        saved_fprs: usize,
        frame_size: usize,
    ) -> EmitResult<AbiToken> {
        self.assert_open();
        assert!(self.abi.is_none(), "ABI bracket already entered");
        let frame = self
            .host
            .prologue(&mut self.buf, saved_gprs, saved_fprs, frame_size)?;
        let seq = ABI_SEQ.fetch_add(1, Ordering::Relaxed);
        self.abi = Some(AbiState { seq, leaves: 0 });
        Ok(AbiToken { frame, seq })
    }

    /// Emit the epilogue matching `token`'s prologue. May be called
    /// once per exit path; a `ret` family instruction must follow.
    pub fn leave_abi(&mut self, token: &AbiToken) -> EmitResult<()> {
        self.assert_open();
        let abi = match self.abi.as_mut() {
            Some(abi) => abi,
            None => panic!("leave_abi without a matching enter_abi"),
        };
        assert_eq!(token.seq, abi.seq, "ABI token from a different bracket");
        abi.leaves += 1;
        self.host.epilogue(&mut self.buf, &token.frame)
    }

    /// Move the incoming host-ABI arguments into the operands named by
    /// `args`, in declaration order. Belongs directly after
    /// [`enter_abi`](Session::enter_abi), before the targets are
    /// clobbered.
    pub fn load_args(&mut self, token: &AbiToken, args: &[Arg]) -> EmitResult<()> {
        self.assert_open();
        self.host.load_args(&mut self.buf, &token.frame, args)
    }

    /// Stage outgoing call arguments in the host ABI's registers.
    /// Register arguments beyond the ABI's register capacity are not
    /// supported.
    pub fn pass_args(&mut self, args: &[Arg]) -> EmitResult<()> {
        self.assert_open();
        self.host.pass_args(&mut self.buf, args)
    }

    /// Fetch the integer return value of the call just emitted.
    pub fn take_ret(&mut self, dst: Gpr) -> EmitResult<()> {
        self.assert_open();
        self.host.take_ret(&mut self.buf, dst)
    }

    /// Fetch the float return value of the call just emitted.
    pub fn take_ret_f(&mut self, p: Precision, dst: Fpr) -> EmitResult<()> {
        self.assert_open();
        self.host.take_ret_f(&mut self.buf, p, dst)
    }

    // -- Finalization --

    /// Close the session. Panics if any referenced label is still
    /// unbound or an ABI bracket was entered but never left; emitting
    /// through a finalized session also panics.
    pub fn end(&mut self) -> EmitResult<CodeObject> {
        self.assert_open();
        for (idx, state) in self.labels.iter().enumerate() {
            assert!(
                state.uses.is_empty(),
                "label {idx} referenced but never bound"
            );
        }
        if let Some(abi) = &self.abi {
            assert!(
                abi.leaves > 0,
                "ABI bracket entered but never left"
            );
        }
        self.state = State::Closed;
        debug!("session finalized: {} bytes", self.buf.offset());
        Ok(CodeObject { ptr: self.buf.base_ptr(), len: self.buf.offset() })
    }
}
