//! Executable arena storage backed by mmap'd memory.
//!
//! Sessions themselves only write into borrowed byte slices; this is
//! the companion allocator an embedder uses to obtain memory that can
//! later be executed. Follows W^X discipline: the region is either
//! writable or executable, never both.

use std::io;
use std::ptr;
use std::slice;

/// A page-aligned, mmap-backed buffer suitable for code emission and,
/// after [`make_executable`](ExecArena::make_executable), execution.
pub struct ExecArena {
    ptr: *mut u8,
    size: usize,
}

// SAFETY: ExecArena owns its mmap'd memory exclusively.
unsafe impl Send for ExecArena {}

impl ExecArena {
    /// Map a new writable region of at least `size` bytes (rounded up
    /// to the page size).
    pub fn new(size: usize) -> io::Result<Self> {
        let page_size = page_size();
        let size = (size + page_size - 1) & !(page_size - 1);

        // SAFETY: anonymous private mapping, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { ptr: ptr as *mut u8, size })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.ptr as *const u8
    }

    /// The whole region as a writable slice, for handing to a session.
    ///
    /// Only valid while the region is writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping covers ptr..ptr+size and we hold &mut.
        unsafe { slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    /// Flip the region to read+execute.
    pub fn make_executable(&self) -> io::Result<()> {
        self.protect(libc::PROT_READ | libc::PROT_EXEC)
    }

    /// Flip the region back to read+write.
    pub fn make_writable(&self) -> io::Result<()> {
        self.protect(libc::PROT_READ | libc::PROT_WRITE)
    }

    fn protect(&self, prot: libc::c_int) -> io::Result<()> {
        // SAFETY: ptr/size describe our own mapping.
        let ret = unsafe { libc::mprotect(self.ptr as *mut libc::c_void, self.size, prot) };
        if ret != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for ExecArena {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf is always safe to call.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
