//! Emission errors.
//!
//! Only resource exhaustion is recoverable: the caller may retry the
//! whole session with a larger arena. Contract violations (operand
//! kind mismatches, unbalanced ABI brackets, unbound labels at
//! finalization, reuse of a closed session) panic instead, because
//! continuing would silently produce incorrect machine code.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitError {
    #[error(
        "arena capacity exceeded: {need} byte(s) needed at offset {offset}, capacity {capacity}"
    )]
    Capacity {
        offset: usize,
        need: usize,
        capacity: usize,
    },
}

pub type EmitResult<T> = Result<T, EmitError>;
