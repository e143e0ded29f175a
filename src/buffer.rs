//! Packet staging buffers

use core::cell::UnsafeCell;

/// Size of each staging buffer, in bytes
pub const STAGING_SIZE: usize = 1024;

/// Memory for one staging buffer
///
/// The SIE moves payload only through this memory.
#[repr(align(4))]
pub struct StagingMemory(UnsafeCell<[u8; STAGING_SIZE]>);

impl StagingMemory {
    pub const fn new() -> Self {
        StagingMemory(UnsafeCell::new([0; STAGING_SIZE]))
    }

    /// Acquire a buffer that covers all of this memory
    ///
    /// # Safety
    ///
    /// The returned buffer aliases the memory. Caller must make sure that
    /// accesses through all buffers are volatile and don't race.
    pub unsafe fn buffer(&self) -> Buffer {
        Buffer::new(self.0.get().cast(), STAGING_SIZE)
    }
}

/// A buffer in staging memory
pub struct Buffer {
    ptr: *mut u8,
    len: usize,
}

impl Buffer {
    /// # Safety
    ///
    /// `ptr` must point to at least `len` bytes that outlive the buffer.
    pub unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        Buffer { ptr, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr_mut(&self) -> *mut u8 {
        self.ptr
    }

    /// Read the start of the staging buffer into `buffer`
    ///
    /// Returns the number of bytes read, which is constrained by the
    /// size of both buffers.
    pub fn volatile_read(&self, buffer: &mut [u8]) -> usize {
        let size = self.len.min(buffer.len());
        buffer
            .iter_mut()
            .take(size)
            .fold(self.ptr, |src, dst| unsafe {
                // Safety: src stays within len, see Buffer::new.
                *dst = src.read_volatile();
                src.add(1)
            });
        size
    }

    /// Write `buffer` to the start of the staging buffer
    ///
    /// Returns the number of bytes written, which is constrained by the
    /// size of both buffers.
    pub fn volatile_write(&self, buffer: &[u8]) -> usize {
        let size = self.len.min(buffer.len());
        buffer.iter().take(size).fold(self.ptr, |dst, src| unsafe {
            // Safety: dst stays within len, see Buffer::new.
            dst.write_volatile(*src);
            dst.add(1)
        });
        size
    }
}
