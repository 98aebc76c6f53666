// Memory region backing a mailbox: control block followed by the slot band

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt::Debug;
use std::io;
use std::ptr::NonNull;

use crate::MPMC::Buffer::layout::REGION_ALIGN;

/// Memory region abstraction the mailbox is built on.
pub trait MemoryRegion: Send + Sync + Debug {
    /// Get a pointer to the start of the region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the region in bytes
    fn size(&self) -> usize;
}

/// Create a zeroed region of at least `size` bytes, aligned to `REGION_ALIGN`.
pub fn create_region(size: usize) -> io::Result<Box<dyn MemoryRegion>> {
    Ok(Box::new(HeapRegion::create(size)?))
}

/// Region allocated from the process heap.
#[derive(Debug)]
pub struct HeapRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The region is plain bytes; all shared access goes through the atomics in
// the control block and the slot sequence numbers.
unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    pub fn create(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "HeapRegion::create(): size must be greater than zero",
            ));
        }

        // Ensure the size is a multiple of the region alignment
        let aligned_size = (size + REGION_ALIGN - 1) & !(REGION_ALIGN - 1);
        let layout = Layout::from_size_align(aligned_size, REGION_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!(
                    "Failed to allocate region:\n\
                    ├─ Aligned size: {aligned_size}\n\
                    ╰─ Alignment:    {REGION_ALIGN}"
                ),
            )
        })?;

        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl MemoryRegion for HeapRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }
}
