//! ABI marshaling support shared by the backends.
//!
//! `FrameLayout` records what the prologue set up so the epilogue and
//! argument loads can undo and address it. The move scheduler orders
//! argument-marshaling moves so that no source register is overwritten
//! before it is read; cycles are broken through the backend's scratch
//! register.

use ember_core::ArgKind;

/// Stack frame facts established by `enter_abi`, consumed by
/// `leave_abi` and `load_args`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// How many V registers the prologue saved.
    pub saved_gprs: usize,
    /// How many callee-saved float registers the prologue saved
    /// (zero on backends without callee-saved float registers).
    pub saved_fprs: usize,
    /// Caller-requested scratch frame bytes.
    pub frame_size: usize,
    /// Bytes the prologue subtracted from the stack pointer beyond the
    /// register saves, including alignment padding.
    pub stack_delta: usize,
}

/// Register bank, for choosing the cycle-break scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    Int,
    Float,
}

/// A physical move location. Register numbers are host encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc {
    Gpr(u8),
    Fpr(u8),
    /// Byte offset of an incoming stack argument, relative to the
    /// backend's incoming-argument base. Never a destination.
    Stack(i32),
    /// The backend's reserved scratch register of the given bank,
    /// inserted by the scheduler when breaking a cycle.
    Scratch(Bank),
}

impl Loc {
    fn bank(self) -> Bank {
        match self {
            Loc::Fpr(_) | Loc::Scratch(Bank::Float) => Bank::Float,
            _ => Bank::Int,
        }
    }
}

/// One argument-marshaling move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOp {
    pub src: Loc,
    pub dst: Loc,
    pub kind: ArgKind,
}

/// Order `moves` so every source is read before its register is
/// overwritten. A move is safe to emit when no pending move still
/// reads its destination; when none is safe (a cycle), one source is
/// parked in the scratch register of its bank.
///
/// Destinations must be distinct. Stack locations are sources only,
/// so cycles always stay within one register bank.
pub fn schedule(mut pending: Vec<MoveOp>) -> Vec<MoveOp> {
    let mut out = Vec::with_capacity(pending.len());
    pending.retain(|m| m.src != m.dst);

    while !pending.is_empty() {
        let safe = (0..pending.len()).find(|&i| {
            let dst = pending[i].dst;
            pending
                .iter()
                .enumerate()
                .all(|(j, m)| j == i || m.src != dst)
        });
        match safe {
            Some(i) => out.push(pending.remove(i)),
            None => {
                // Cycle: park the first pending source and redirect
                // every read of it to the scratch register.
                let m = pending[0];
                let bank = m.src.bank();
                out.push(MoveOp {
                    src: m.src,
                    dst: Loc::Scratch(bank),
                    kind: m.kind,
                });
                for p in pending.iter_mut() {
                    if p.src == m.src {
                        p.src = Loc::Scratch(bank);
                    }
                }
            }
        }
    }
    out
}
