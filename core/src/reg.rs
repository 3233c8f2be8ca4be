//! Virtual register file.
//!
//! Callers emit code against a small fixed set of virtual registers;
//! each backend maps them onto physical registers of the host. `R*`
//! registers are caller-save temporaries (clobbered by emitted calls),
//! `V*` registers are backed by callee-saved physical registers and
//! survive calls once `enter_abi` has saved them.

/// Virtual general-purpose register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gpr(u8);

/// Number of virtual general-purpose registers (R0-R5, V0-V4).
pub const GPR_COUNT: usize = 11;

/// Index of the first callee-saved register (V0).
const FIRST_CALLEE_SAVED: u8 = 6;

pub const R0: Gpr = Gpr(0);
pub const R1: Gpr = Gpr(1);
pub const R2: Gpr = Gpr(2);
pub const R3: Gpr = Gpr(3);
pub const R4: Gpr = Gpr(4);
pub const R5: Gpr = Gpr(5);
pub const V0: Gpr = Gpr(6);
pub const V1: Gpr = Gpr(7);
pub const V2: Gpr = Gpr(8);
pub const V3: Gpr = Gpr(9);
pub const V4: Gpr = Gpr(10);

impl Gpr {
    /// Construct from a raw index. Panics if out of range.
    pub const fn from_index(idx: u8) -> Gpr {
        assert!((idx as usize) < GPR_COUNT, "virtual gpr index out of range");
        Gpr(idx)
    }

    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Whether this register is preserved across emitted calls
    /// (once saved by the ABI prologue).
    #[inline]
    pub const fn is_callee_saved(self) -> bool {
        self.0 >= FIRST_CALLEE_SAVED
    }
}

/// Virtual floating-point register index.
///
/// Whether a given `F*` register is backed by a callee-saved physical
/// register is a backend fact; portable code should treat all of them
/// as caller-save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fpr(u8);

/// Number of virtual floating-point registers (F0-F7).
pub const FPR_COUNT: usize = 8;

pub const F0: Fpr = Fpr(0);
pub const F1: Fpr = Fpr(1);
pub const F2: Fpr = Fpr(2);
pub const F3: Fpr = Fpr(3);
pub const F4: Fpr = Fpr(4);
pub const F5: Fpr = Fpr(5);
pub const F6: Fpr = Fpr(6);
pub const F7: Fpr = Fpr(7);

impl Fpr {
    /// Construct from a raw index. Panics if out of range.
    pub const fn from_index(idx: u8) -> Fpr {
        assert!((idx as usize) < FPR_COUNT, "virtual fpr index out of range");
        Fpr(idx)
    }

    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }
}
