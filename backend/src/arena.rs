//! Write cursor over a caller-supplied code arena.

use ember_core::{EmitError, EmitResult};

/// The emission target: a borrowed byte region plus a write cursor.
///
/// The arena never allocates; the caller owns the storage and its
/// protection state. Writes past capacity fail with
/// [`EmitError::Capacity`] instead of truncating, and patching is only
/// valid below the cursor.
pub struct Arena<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> Arena<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Current write offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Remaining writable bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// Raw pointer to the start of the arena.
    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.buf.as_ptr()
    }

    /// Reserve `n` bytes at the cursor, advancing it.
    #[inline]
    fn grab(&mut self, n: usize) -> EmitResult<&mut [u8]> {
        if self.remaining() < n {
            return Err(EmitError::Capacity {
                offset: self.offset,
                need: n,
                capacity: self.buf.len(),
            });
        }
        let slot = &mut self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(slot)
    }

    // -- Emit methods --

    #[inline]
    pub fn put_u8(&mut self, val: u8) -> EmitResult<()> {
        self.grab(1)?[0] = val;
        Ok(())
    }

    #[inline]
    pub fn put_u16(&mut self, val: u16) -> EmitResult<()> {
        self.grab(2)?.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    #[inline]
    pub fn put_u32(&mut self, val: u32) -> EmitResult<()> {
        self.grab(4)?.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    #[inline]
    pub fn put_u64(&mut self, val: u64) -> EmitResult<()> {
        self.grab(8)?.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    #[inline]
    pub fn put_bytes(&mut self, data: &[u8]) -> EmitResult<()> {
        self.grab(data.len())?.copy_from_slice(data);
        Ok(())
    }

    // -- Patch methods --
    //
    // Patch targets were emitted earlier in the same session, so a
    // patch past the cursor is an internal bug, not a caller error.

    #[inline]
    pub fn patch_u8(&mut self, offset: usize, val: u8) {
        assert!(offset < self.offset, "patch past write cursor");
        self.buf[offset] = val;
    }

    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        assert!(offset + 4 <= self.offset, "patch past write cursor");
        self.buf[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.offset, "read past write cursor");
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    /// The emitted code so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.offset]
    }
}
