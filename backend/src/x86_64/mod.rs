//! x86-64 backend.

pub mod emitter;
pub mod regs;

pub use emitter::Emitter;
