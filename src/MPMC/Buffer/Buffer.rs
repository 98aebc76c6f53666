// This is the per-endpoint receive ring used by the local transport

use super::layout::QueueControl;
use crate::MPMC::Structs::Buffer_Structs::WireHeader;

use std::sync::atomic::AtomicU64;

/// Slot alignment; also the granularity of the slot stride.
pub const SLOT_ALIGN: usize = 64;

/// The fixed part of a slot. The payload bytes follow it directly.
///
/// Marked `#[repr(C)]` so the header/payload split is at a stable offset.
#[repr(C, align(64))]
pub struct SlotHeader {
    /// The sequence number of the slot. This is the core of the synchronization.
    /// - A sender claims a `tail` sequence and waits for the `sequence` in
    ///   the target slot to equal `tail`.
    /// - After writing, it sets the `sequence` to `tail + 1`, signaling completion.
    /// - A receiver waits for the `sequence` in its `head` slot to equal
    ///   `head + 1`.
    pub sequence: AtomicU64,

    /// Routing header of the message held in this slot.
    pub meta: WireHeader,
}

/// A lock-free, multi-producer, multi-consumer (MPMC) ring buffer view.
///
/// This struct does not own its memory. It is a view holding pointers into a
/// region owned by a `Mailbox`, which outlives every view it hands out.
///
/// Unlike a fixed-payload ring, the slot stride is chosen at creation time
/// from the receiver's maximum receive size.
pub struct RingBuffer {
    /// Pointer to the control block at the start of the region.
    pub(crate) control: *const QueueControl,

    /// Pointer to slot 0.
    pub(crate) buffer_base: *mut u8,

    /// The capacity of the buffer (number of slots).
    pub(crate) capacity: usize,

    /// A bitmask used to wrap sequence numbers around the buffer.
    /// Calculated as `capacity - 1`.
    pub(crate) mask: usize,

    /// Bytes between two consecutive slots.
    pub(crate) stride: usize,

    /// Payload bytes each slot can carry.
    pub(crate) payload_room: usize,
}

unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}
