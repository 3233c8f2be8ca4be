//! Operand model: typed argument descriptors independent of encoding.

use crate::reg::{Fpr, Gpr};

/// Transfer width for integer loads and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    pub const fn bytes(self) -> u32 {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }

    pub const fn bits(self) -> u32 {
        self.bytes() * 8
    }
}

/// Extension policy for loads narrower than a machine word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extend {
    Zero,
    Sign,
}

/// Floating-point precision tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    pub const fn bytes(self) -> u32 {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }
}

/// Integer arithmetic operations. Div is signed, Divu unsigned;
/// both truncate toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Divu,
}

/// Floating-point arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpuOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Comparison conditions for conditional branches.
///
/// `Lt`/`Ge`/`Le`/`Gt` compare signed, the `*u` forms unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Le,
    Gt,
    Ltu,
    Geu,
    Leu,
    Gtu,
}

impl Cond {
    /// Return the inverted condition.
    pub const fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Le => Cond::Gt,
            Cond::Gt => Cond::Le,
            Cond::Ltu => Cond::Geu,
            Cond::Geu => Cond::Ltu,
            Cond::Leu => Cond::Gtu,
            Cond::Gtu => Cond::Leu,
        }
    }

    /// Swap operand order (e.g. Lt becomes Gt).
    pub const fn swap(self) -> Cond {
        match self {
            Cond::Eq | Cond::Ne => self,
            Cond::Lt => Cond::Gt,
            Cond::Ge => Cond::Le,
            Cond::Le => Cond::Ge,
            Cond::Gt => Cond::Lt,
            Cond::Ltu => Cond::Gtu,
            Cond::Geu => Cond::Leu,
            Cond::Leu => Cond::Geu,
            Cond::Gtu => Cond::Ltu,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Cond::Lt | Cond::Ge | Cond::Le | Cond::Gt)
    }

    pub const fn is_unsigned(self) -> bool {
        matches!(self, Cond::Ltu | Cond::Geu | Cond::Leu | Cond::Gtu)
    }
}

/// Memory reference: base register, optional index register, and a
/// full-width displacement.
///
/// Backends legalize displacements their addressing modes cannot encode
/// directly by synthesizing the address in a reserved scratch register;
/// callers never see the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mem {
    pub base: Gpr,
    pub index: Option<Gpr>,
    pub disp: i64,
}

impl Mem {
    /// Plain register-indirect reference: `[base]`.
    pub const fn base(base: Gpr) -> Mem {
        Mem { base, index: None, disp: 0 }
    }

    /// Register-plus-register reference: `[base + index]`.
    pub const fn indexed(base: Gpr, index: Gpr) -> Mem {
        Mem { base, index: Some(index), disp: 0 }
    }

    /// Register-plus-displacement reference: `[base + disp]`.
    pub const fn offset(base: Gpr, disp: i64) -> Mem {
        Mem { base, index: None, disp }
    }
}

/// Operand kind tags, used in mismatch diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Gpr,
    Fpr,
    Imm,
    Mem,
}

/// A tagged operand value.
///
/// The typed catalog methods make most kind mismatches compile-time
/// errors; `Operand` carries the kind at run time where a slot is
/// generic, such as ABI argument descriptors. Passing the wrong kind to
/// an `expect_*` accessor is a caller bug and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Gpr(Gpr),
    Fpr(Fpr),
    Imm(i64),
    Mem(Mem),
}

impl Operand {
    pub const fn kind(&self) -> OperandKind {
        match self {
            Operand::Gpr(_) => OperandKind::Gpr,
            Operand::Fpr(_) => OperandKind::Fpr,
            Operand::Imm(_) => OperandKind::Imm,
            Operand::Mem(_) => OperandKind::Mem,
        }
    }

    pub fn expect_gpr(&self) -> Gpr {
        match *self {
            Operand::Gpr(r) => r,
            _ => panic!("operand kind mismatch: expected gpr, got {:?}", self.kind()),
        }
    }

    pub fn expect_fpr(&self) -> Fpr {
        match *self {
            Operand::Fpr(f) => f,
            _ => panic!("operand kind mismatch: expected fpr, got {:?}", self.kind()),
        }
    }

    pub fn expect_imm(&self) -> i64 {
        match *self {
            Operand::Imm(v) => v,
            _ => panic!("operand kind mismatch: expected imm, got {:?}", self.kind()),
        }
    }
}

impl From<Gpr> for Operand {
    fn from(r: Gpr) -> Operand {
        Operand::Gpr(r)
    }
}

impl From<Fpr> for Operand {
    fn from(f: Fpr) -> Operand {
        Operand::Fpr(f)
    }
}

impl From<Mem> for Operand {
    fn from(m: Mem) -> Operand {
        Operand::Mem(m)
    }
}

/// C-level shape of one logical call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// Machine-word integer.
    Word,
    Pointer,
    Float,
    Double,
}

impl ArgKind {
    pub const fn is_float(self) -> bool {
        matches!(self, ArgKind::Float | ArgKind::Double)
    }
}

/// ABI argument descriptor: the C-level shape of one argument and the
/// operand it should land in (`load_args`) or be read from
/// (`pass_args`). Consumed when the marshaling sequence is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arg {
    pub kind: ArgKind,
    pub target: Operand,
}

impl Arg {
    /// An integer or pointer argument placed in a general register.
    pub fn gpr(kind: ArgKind, reg: Gpr) -> Arg {
        assert!(!kind.is_float(), "float argument needs a float register");
        Arg { kind, target: Operand::Gpr(reg) }
    }

    /// A float or double argument placed in a float register.
    pub fn fpr(kind: ArgKind, reg: Fpr) -> Arg {
        assert!(kind.is_float(), "integer argument needs a general register");
        Arg { kind, target: Operand::Fpr(reg) }
    }

    /// A constant argument (only meaningful for `pass_args`).
    pub fn imm(kind: ArgKind, val: i64) -> Arg {
        assert!(!kind.is_float(), "float immediates go through a register");
        Arg { kind, target: Operand::Imm(val) }
    }
}
