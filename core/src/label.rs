//! Branch target labels and relocation records.

/// A branch target within one emission session.
///
/// Labels support forward references: branches may target a label
/// before it is bound, and the session back-patches them when `bind`
/// is called. Every referenced label must be bound before the session
/// is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    pub const fn from_index(idx: u32) -> Label {
        Label(idx)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Encoding class of a branch displacement field, determining its bit
/// width and byte layout when patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// 32-bit displacement relative to the end of the field (x86-64
    /// jmp/jcc rel32; `offset` points at the displacement bytes).
    Rel32,
    /// 19-bit word-scaled displacement inside a 32-bit instruction
    /// (AArch64 B.cond; `offset` points at the instruction word).
    Imm19,
    /// 26-bit word-scaled displacement inside a 32-bit instruction
    /// (AArch64 B/BL).
    Imm26,
}

/// A recorded reference from an emitted branch to a label: where the
/// displacement field sits and how to patch it.
#[derive(Debug, Clone, Copy)]
pub struct LabelUse {
    /// Arena offset of the displacement field (see `BranchKind`).
    pub offset: usize,
    pub kind: BranchKind,
}

/// Per-label state tracked by a session.
#[derive(Debug, Clone, Default)]
pub struct LabelState {
    /// Arena offset the label is bound to, once known.
    pub bound: Option<usize>,
    /// Pending forward references, drained when the label is bound.
    pub uses: Vec<LabelUse>,
}
