//! Ember core: architecture-independent data model for the emitter.
//!
//! This crate holds the pure value types the emitter catalog is written
//! against: the virtual register file, the operand model, label and
//! relocation records, and the error type. All encoding logic lives in
//! `ember-backend`; nothing here touches platform APIs.

pub mod error;
pub mod label;
pub mod operand;
pub mod reg;

pub use error::{EmitError, EmitResult};
pub use label::{BranchKind, Label, LabelState, LabelUse};
pub use operand::{AluOp, Arg, ArgKind, Cond, Extend, FpuOp, Mem, Operand, Precision, Width};
pub use reg::{Fpr, Gpr, FPR_COUNT, GPR_COUNT};
pub use reg::{F0, F1, F2, F3, F4, F5, F6, F7};
pub use reg::{R0, R1, R2, R3, R4, R5, V0, V1, V2, V3, V4};
