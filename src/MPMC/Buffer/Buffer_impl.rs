use std::mem::size_of;
use std::ptr;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::time::Duration;

use super::layout::QueueControl;
use super::Buffer::{RingBuffer, SlotHeader, SLOT_ALIGN};
use crate::MPMC::Structs::Buffer_Structs::WireHeader;

impl RingBuffer {
    /// Create a ring buffer view over an existing memory region.
    ///
    /// # Safety
    /// Caller must ensure `control` points to an initialised `QueueControl` and
    /// `buffer_base` to `capacity * slot_stride` writable bytes, both valid for
    /// the lifetime of the view.
    pub unsafe fn new(control: *const QueueControl, buffer_base: *mut u8) -> Self {
        let capacity = (*control).capacity as usize;
        Self {
            control,
            buffer_base,
            capacity,
            mask: capacity - 1,
            stride: (*control).slot_stride as usize,
            payload_room: (*control).payload_room as usize,
        }
    }

    /// Size in bytes of one slot stride for a given payload room.
    #[inline]
    pub fn slot_stride(payload_room: usize) -> usize {
        (size_of::<SlotHeader>() + payload_room + SLOT_ALIGN - 1) & !(SLOT_ALIGN - 1)
    }

    /// Number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Payload bytes a single slot can carry.
    pub fn payload_room(&self) -> usize {
        self.payload_room
    }

    /// Initialize per-slot sequence numbers to k for k in 0..capacity.
    /// This should ONLY be called by the creator of the region.
    ///
    /// # Safety
    /// Caller guarantees the underlying memory is allocated and writable.
    pub unsafe fn init_slots(&self) {
        for k in 0..self.capacity {
            let slot = self.slot_mut(k);
            (*slot).sequence.store(k as u64, Relaxed);
        }
    }

    #[inline]
    unsafe fn slot_mut(&self, index: usize) -> *mut SlotHeader {
        let base = self.buffer_base.add(index * self.stride);
        base as *mut SlotHeader
    }

    #[inline]
    unsafe fn payload_ptr(slot: *mut SlotHeader) -> *mut u8 {
        (slot as *mut u8).add(size_of::<SlotHeader>())
    }

    /// Enqueue reserves a slot and publishes the message.
    /// Payload bytes beyond the slot's room are dropped; `meta.payload_len`
    /// keeps the original length so the receiver can detect the truncation.
    /// Returns the index on success, or None if the ring appears full.
    pub fn enqueue(&self, meta: WireHeader, payload: &[u8]) -> Option<usize> {
        // Safety: the control pointer is valid for the lifetime of the view
        let tail_atomic = unsafe { &(*self.control).tail };

        loop {
            let tail = tail_atomic.load(Relaxed);
            let idx = (tail as usize) & self.mask;
            let slot_ptr = unsafe { self.slot_mut(idx) };
            let seq = unsafe { &(*slot_ptr).sequence }.load(Acquire);
            let dif = seq as i64 - tail as i64;

            if dif == 0 {
                if tail_atomic
                    .compare_exchange_weak(tail, tail + 1, AcqRel, Relaxed)
                    .is_ok()
                {
                    // We own this slot now
                    unsafe {
                        (*slot_ptr).meta = meta;
                        (*slot_ptr).meta.payload_len = payload.len() as u32;

                        let len = payload.len().min(self.payload_room);
                        ptr::copy_nonoverlapping(payload.as_ptr(), Self::payload_ptr(slot_ptr), len);

                        // Publish
                        (*slot_ptr).sequence.store(tail + 1, Release);
                    }
                    return Some(idx);
                }
                continue;
            } else if dif < 0 {
                // full
                return None;
            } else {
                // someone else is producing; backoff and retry
                std::hint::spin_loop();
                continue;
            }
        }
    }

    /// Dequeue acquires a ready slot and returns its header and the stored
    /// payload bytes (at most `payload_room` of them).
    /// Returns None if the ring appears empty.
    pub fn dequeue(&self) -> Option<(WireHeader, Vec<u8>)> {
        let head_atomic = unsafe { &(*self.control).head };

        loop {
            let head = head_atomic.load(Relaxed);
            let idx = (head as usize) & self.mask;
            let slot_ptr = unsafe { self.slot_mut(idx) };
            let seq = unsafe { &(*slot_ptr).sequence }.load(Acquire);
            let dif = seq as i64 - (head as i64 + 1);

            if dif == 0 {
                if head_atomic
                    .compare_exchange_weak(head, head + 1, AcqRel, Relaxed)
                    .is_ok()
                {
                    let (meta, payload) = unsafe {
                        let meta = (*slot_ptr).meta;
                        let len = (meta.payload_len as usize).min(self.payload_room);
                        let mut payload = vec![0u8; len];
                        ptr::copy_nonoverlapping(Self::payload_ptr(slot_ptr), payload.as_mut_ptr(), len);
                        (meta, payload)
                    };

                    // free slot for future senders
                    unsafe {
                        (*slot_ptr).sequence.store(head + self.capacity as u64, Release);
                    }
                    return Some((meta, payload));
                }
                continue;
            } else if dif < 0 {
                // empty
                return None;
            } else {
                // sender not finished; retry
                std::hint::spin_loop();
                continue;
            }
        }
    }

    /// Messages currently published and not yet claimed. Approximate under contention.
    pub fn len(&self) -> usize {
        let (head, tail) = unsafe { ((*self.control).head.load(Acquire), (*self.control).tail.load(Acquire)) };
        tail.saturating_sub(head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current value of the signal word. Read it BEFORE checking the ring and
    /// hand it to `wait_for_data` so a publish in between is never missed.
    pub fn signal_value(&self) -> u32 {
        unsafe { (*self.control).signal.load(Acquire) }
    }

    /// Signal one receiver that new data is available
    pub fn signal_consumer(&self) {
        unsafe {
            let signal = &(*self.control).signal;
            signal.fetch_add(1, Release);
            crate::Core::futex::futex_wake(signal);
        }
    }

    /// Wake every blocked receiver (used on close).
    pub fn signal_all(&self) {
        unsafe {
            let signal = &(*self.control).signal;
            signal.fetch_add(1, Release);
            crate::Core::futex::futex_wake_all(signal);
        }
    }

    /// Wait until the signal word moves away from `seen`, or `timeout` passes.
    /// Spurious wakeups are possible; callers loop.
    pub fn wait_for_data(&self, seen: u32, timeout: Option<Duration>) {
        unsafe {
            let signal = &(*self.control).signal;
            crate::Core::futex::futex_wait_timeout(signal, seen, timeout);
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_ring_buffer(self, f)
    }
}
