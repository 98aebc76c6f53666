//! Transport contexts: one participant's handle to the transport provider.
//!
//! Sharing one context between threads is allowed only as far as the
//! provider allows it. The built-in local provider is safe for concurrent
//! senders and receivers on one context; this layer adds no locking of its
//! own around provider calls.

use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::Router::buffer::MessageBuffer;
use crate::Router::builder::ContextBuilder;
use crate::Router::error::{Result, RouterError};
use crate::Transport::Transport;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ctx({})", self.0)
    }
}

/// Options accepted at init time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitFlags(u32);

impl InitFlags {
    pub const NONE: InitFlags = InitFlags(0x00);
    /// A successful send hands back a fresh zeroed buffer instead of the sent one.
    pub const AUTO_ALLOC: InitFlags = InitFlags(0x01);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: InitFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for InitFlags {
    type Output = InitFlags;

    fn bitor(self, rhs: InitFlags) -> InitFlags {
        InitFlags(self.0 | rhs.0)
    }
}

/// Sends spin this many times per round before giving up or sleeping.
pub const SPINS_PER_ROUND: u32 = 1000;

/// Send retry policy while the destination queue is full.
///
/// The raw value is in milliseconds: 0 never retries, 1 spins up to
/// `SPINS_PER_ROUND` attempts without sleeping, anything larger spins and
/// sleeps with escalating naps until that many milliseconds have passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendTimeout(i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    NoRetry,
    Spin,
    SpinThenSleep(Duration),
}

impl SendTimeout {
    pub const DEFAULT: SendTimeout = SendTimeout(1);

    /// Negative values clamp to 0.
    pub fn new(value: i32) -> Self {
        Self(value.max(0))
    }

    pub fn value(self) -> i32 {
        self.0
    }

    pub fn mode(self) -> RetryMode {
        match self.0 {
            0 => RetryMode::NoRetry,
            1 => RetryMode::Spin,
            ms => RetryMode::SpinThenSleep(Duration::from_millis(ms as u64)),
        }
    }
}

impl Default for SendTimeout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// State shared by a context and every buffer allocated from it.
pub(crate) struct ContextShared {
    id: ContextId,
    transport: Box<dyn Transport>,
    max_receive_size: usize,
    flags: InitFlags,
    call_timeout: Duration,
    send_timeout: AtomicI32,
    live_buffers: AtomicUsize,
    closed: AtomicBool,
    pub(crate) channels: Mutex<Vec<Option<String>>>,
}

impl ContextShared {
    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn capacity_for(&self, requested: usize) -> usize {
        self.transport.capacity_for(requested)
    }

    pub(crate) fn buffer_allocated(&self) {
        self.live_buffers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn buffer_released(&self) {
        self.live_buffers.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A participant's handle to the transport provider.
pub struct TransportContext {
    shared: Arc<ContextShared>,
}

impl TransportContext {
    /// Create a context bound to `bind_spec`.
    ///
    /// `max_receive_size` of 0 selects the provider's default
    /// (`DMXP_MAX_RCV_BYTES`). Environment overrides are applied; see
    /// `ContextBuilder::with_env`.
    pub fn init(bind_spec: &str, max_receive_size: usize, flags: InitFlags) -> Result<Self> {
        ContextBuilder::new()
            .bind(bind_spec)
            .max_receive_size(max_receive_size)
            .flags(flags)
            .with_env()
            .build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub(crate) fn from_parts(
        transport: Box<dyn Transport>,
        max_receive_size: usize,
        flags: InitFlags,
        send_timeout: SendTimeout,
        call_timeout: Duration,
    ) -> Self {
        let shared = ContextShared {
            id: ContextId::next(),
            transport,
            max_receive_size,
            flags,
            call_timeout,
            send_timeout: AtomicI32::new(send_timeout.value()),
            live_buffers: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            channels: Mutex::new(Vec::new()),
        };
        tracing::debug!(
            context = %shared.id,
            endpoint = shared.transport.endpoint(),
            max_receive_size,
            "transport context created"
        );
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    /// Name this context is reachable under (`host:port`).
    pub fn endpoint(&self) -> &str {
        self.shared.transport.endpoint()
    }

    /// True once the provider's routes/connections are established. Never
    /// blocks; callers poll with their own backoff.
    pub fn is_ready(&self) -> bool {
        !self.is_closed() && self.shared.transport.is_ready()
    }

    /// Set the retry policy for subsequent sends. Negative values clamp to 0.
    pub fn set_send_timeout(&self, value: i32) {
        self.shared
            .send_timeout
            .store(SendTimeout::new(value).value(), Ordering::Relaxed);
    }

    pub fn send_timeout(&self) -> SendTimeout {
        SendTimeout::new(self.shared.send_timeout.load(Ordering::Relaxed))
    }

    pub fn call_timeout(&self) -> Duration {
        self.shared.call_timeout
    }

    pub fn max_receive_size(&self) -> usize {
        self.shared.max_receive_size
    }

    pub fn flags(&self) -> InitFlags {
        self.shared.flags
    }

    /// Buffers allocated from this context and not yet dropped.
    pub fn outstanding_buffers(&self) -> usize {
        self.shared.live_buffers.load(Ordering::Relaxed)
    }

    /// The provider's serialized constants mapping.
    pub fn constants_json(&self) -> String {
        self.shared.transport.constants()
    }

    /// Allocate a buffer with at least `requested_size` payload bytes
    /// (0 selects the max receive size).
    pub fn allocate(&self, requested_size: usize) -> Result<MessageBuffer> {
        if self.is_closed() {
            return Err(RouterError::BadBufferAllocation(format!(
                "context {} ({}) is closed",
                self.shared.id,
                self.endpoint()
            )));
        }
        let requested = if requested_size == 0 {
            self.shared.max_receive_size
        } else {
            requested_size
        };
        let capacity = self.shared.capacity_for(requested);
        Ok(MessageBuffer::new(Arc::clone(&self.shared), capacity))
    }

    /// Release provider resources. Calling it again is a no-op.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.channels.lock().clear();
        self.shared.transport.close();
        tracing::debug!(
            context = %self.shared.id,
            endpoint = self.endpoint(),
            outstanding = self.outstanding_buffers(),
            "transport context closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub(crate) fn shared(&self) -> &ContextShared {
        &self.shared
    }
}

impl Drop for TransportContext {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_transport_context(self, f)
    }
}
