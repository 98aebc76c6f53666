// Receive queue of one bound endpoint: a region holding the control block
// and the slot band, plus a park list for messages set aside by call().

use crate::Core::region::{create_region, MemoryRegion};
use crate::MPMC::Buffer::layout::QueueControl;
use crate::MPMC::Buffer::RingBuffer;
use crate::MPMC::Structs::Buffer_Structs::WireHeader;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Why a push did not land in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Every slot is occupied; the sender may retry.
    Full,
    /// The owning endpoint has been closed.
    Closed,
}

/// A message copied out of the ring.
#[derive(Debug, Clone)]
pub struct Parked {
    pub meta: WireHeader,
    pub payload: Vec<u8>,
}

impl Parked {
    /// True when the sender's payload did not fit the slot.
    pub fn is_truncated(&self) -> bool {
        self.meta.payload_len as usize > self.payload.len()
    }
}

pub struct Mailbox {
    name: String,
    region: Box<dyn MemoryRegion>,
    ring: RingBuffer,
    parked: Mutex<VecDeque<Parked>>,
    closed: AtomicBool,
}

impl Mailbox {
    /// Create a mailbox with `depth` slots of `payload_room` bytes each.
    pub fn new(name: &str, depth: usize, payload_room: usize) -> io::Result<Self> {
        // Validate depth is a power of two and non-zero
        if depth == 0 || (depth & (depth - 1)) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Queue depth must be a power of two and greater than zero",
            ));
        }

        let stride = RingBuffer::slot_stride(payload_room);
        let band_offset = QueueControl::band_start();
        let total = depth
            .checked_mul(stride)
            .and_then(|band| band.checked_add(band_offset))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Mailbox size overflows usize"))?;

        let region = create_region(total)?;
        let control = region.as_ptr() as *mut QueueControl;

        unsafe {
            std::ptr::write(
                control,
                QueueControl::new(depth as u64, stride as u64, payload_room as u64, band_offset as u64),
            );
        }

        let ring = unsafe { RingBuffer::new(control, region.as_ptr().add(band_offset)) };

        // Initialize slots (only done by creator)
        unsafe {
            ring.init_slots();
        }

        Ok(Self {
            name: name.to_string(),
            region,
            ring,
            parked: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Endpoint name this mailbox belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn region_size(&self) -> usize {
        self.region.size()
    }

    /// Publish one message and wake a waiting receiver.
    pub fn push(&self, meta: WireHeader, payload: &[u8]) -> Result<(), PushError> {
        if self.is_closed() {
            return Err(PushError::Closed);
        }
        match self.ring.enqueue(meta, payload) {
            Some(_) => {
                self.ring.signal_consumer();
                Ok(())
            }
            None => Err(PushError::Full),
        }
    }

    /// Next message from the ring, skipping the park list.
    pub fn pop_ring(&self) -> Option<Parked> {
        self.ring
            .dequeue()
            .map(|(meta, payload)| Parked { meta, payload })
    }

    /// Oldest parked message, if any.
    pub fn take_parked(&self) -> Option<Parked> {
        self.parked.lock().pop_front()
    }

    /// Remove and return the first parked message whose transaction id starts with `xaction`.
    pub fn take_parked_matching(&self, xaction: &[u8]) -> Option<Parked> {
        let mut parked = self.parked.lock();
        let pos = parked.iter().position(|p| p.meta.xaction.starts_with(xaction))?;
        parked.remove(pos)
    }

    /// Pop ring messages until one whose transaction id starts with `xaction`,
    /// parking the rest for later receives. The park list is bounded by the
    /// ring depth; once it is full nothing more is popped and ENOBUFS is
    /// returned, so every message stays in the ring or the park list.
    pub fn pop_ring_matching(&self, xaction: &[u8]) -> io::Result<Option<Parked>> {
        let mut parked = self.parked.lock();
        loop {
            if parked.len() >= self.ring.capacity() {
                return Err(io::Error::from_raw_os_error(libc::ENOBUFS));
            }
            let Some(message) = self.pop_ring() else {
                return Ok(None);
            };
            if message.meta.xaction.starts_with(xaction) {
                return Ok(Some(message));
            }
            parked.push_back(message);
        }
    }

    pub fn parked_len(&self) -> usize {
        self.parked.lock().len()
    }

    /// Read before checking for messages; pass to `wait`.
    pub fn signal_value(&self) -> u32 {
        self.ring.signal_value()
    }

    /// Block until a push (or close) moves the signal away from `seen`, or the timeout passes.
    pub fn wait(&self, seen: u32, timeout: Option<Duration>) {
        self.ring.wait_for_data(seen, timeout)
    }

    /// Refuse further pushes and wake every blocked receiver. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.ring.signal_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_mailbox(self, f)
    }
}
