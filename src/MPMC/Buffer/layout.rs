use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// Alignment of the queue control block and of the region that holds it.
pub const REGION_ALIGN: usize = 128;

/// Control block placed at the very start of a mailbox region.
///
/// It holds the atomic cursors and the geometry needed to build a
/// `RingBuffer` view over the slot array that follows it. Keeping the
/// cursors here separates the control plane from the data plane.
#[repr(C, align(128))]
pub struct QueueControl {
    /// Number of slots in the ring. Always a power of two.
    pub capacity: u64,

    /// Distance in bytes between two consecutive slots.
    pub slot_stride: u64,

    /// Payload bytes a slot can hold after its header.
    pub payload_room: u64,

    /// Byte offset from the start of the region to slot 0.
    pub band_offset: u64,

    /// Signal word for futex-based blocking/waking.
    /// Senders bump it (and wake), receivers wait on it.
    pub signal: AtomicU32,

    /// The "tail" cursor for senders. Atomically incremented to claim a slot for writing.
    pub tail: CachePadded<AtomicU64>,

    /// The "head" cursor for receivers. Atomically incremented to claim a slot for reading.
    pub head: CachePadded<AtomicU64>,
}

impl QueueControl {
    pub fn new(capacity: u64, slot_stride: u64, payload_room: u64, band_offset: u64) -> Self {
        Self {
            capacity,
            slot_stride,
            payload_room,
            band_offset,
            signal: AtomicU32::new(0),
            tail: CachePadded::new(AtomicU64::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Offset of the first slot: the control block rounded up to the region alignment.
    pub fn band_start() -> usize {
        (std::mem::size_of::<QueueControl>() + REGION_ALIGN - 1) & !(REGION_ALIGN - 1)
    }
}
