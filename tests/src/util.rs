use std::mem;
use std::sync::Once;

use ember_backend::{CodeObject, ExecArena, Session};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Emit a function into a fresh executable arena and seal it.
pub fn build<F>(size: usize, emit: F) -> (ExecArena, CodeObject)
where
    F: FnOnce(&mut Session),
{
    init_logging();
    let mut arena = ExecArena::new(size).expect("mmap failed");
    let code = {
        let mut session = Session::begin(arena.as_mut_slice());
        emit(&mut session);
        session.end().expect("arena exhausted")
    };
    arena.make_executable().expect("mprotect failed");
    (arena, code)
}

/// Reinterpret finalized code as a callable function pointer.
///
/// # Safety
///
/// The emitted code must follow `F`'s signature and the host calling
/// convention, and the backing arena must be executable.
pub unsafe fn entry<F: Copy>(code: &CodeObject) -> F {
    assert_eq!(mem::size_of::<F>(), mem::size_of::<*const u8>());
    let ptr = code.ptr();
    mem::transmute_copy(&ptr)
}
