//! Owned message buffers.
//!
//! A `MessageBuffer` is always held by exactly one owner. Every operation
//! that may reallocate the payload takes the buffer by value and hands back
//! the buffer to continue with; after a reallocation it carries a new
//! `BufferId`. Releasing a buffer is dropping it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::Core::mailbox::Parked;
use crate::MPMC::Structs::Buffer_Structs::{WireHeader, NO_SUB_ID, WFL_CALL, WFL_REPLY, WFL_SUB_ID};
use crate::Router::context::{ContextId, ContextShared};
use crate::Router::status::Status;

pub use crate::MPMC::Structs::Buffer_Structs::{MAX_MEID, MAX_SRC, MAX_XID};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one buffer allocation. Changes whenever the payload is reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buf({})", self.0)
    }
}

/// Provider-side state a buffer drags along. Never handed to callers.
pub(crate) struct ProviderHandle {
    shared: Arc<ContextShared>,
    wire_flags: u32,
}

/// Header + payload container exchanged with the transport.
pub struct MessageBuffer {
    id: BufferId,
    status: Status,
    tp_state: i32,
    mtype: i32,
    sub_id: Option<i32>,
    len: usize,
    payload: Vec<u8>,
    xaction: [u8; MAX_XID],
    meid: [u8; MAX_MEID],
    source: String,
    handle: ProviderHandle,
}

impl MessageBuffer {
    /// A fresh buffer with `capacity` zeroed payload bytes, registered with its context.
    pub(crate) fn new(shared: Arc<ContextShared>, capacity: usize) -> Self {
        shared.buffer_allocated();
        Self {
            id: BufferId::next(),
            status: Status::Ok,
            tp_state: 0,
            mtype: 0,
            sub_id: None,
            len: 0,
            payload: vec![0u8; capacity],
            xaction: [0; MAX_XID],
            meid: [0; MAX_MEID],
            source: String::new(),
            handle: ProviderHandle { shared, wire_flags: 0 },
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Transport error code (errno style) recorded with the last outcome.
    pub fn tp_state(&self) -> i32 {
        self.tp_state
    }

    pub fn message_type(&self) -> i32 {
        self.mtype
    }

    pub fn set_message_type(&mut self, mtype: i32) {
        self.mtype = mtype;
    }

    pub fn subscription_id(&self) -> Option<i32> {
        self.sub_id
    }

    pub fn set_subscription_id(&mut self, sub_id: Option<i32>) {
        self.sub_id = sub_id;
    }

    /// Bytes of payload in use.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of payload the buffer can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.payload.len()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload[..self.len]
    }

    /// Sender endpoint name as filled in by the transport on receive.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Copy `bytes` into the payload and set the length.
    ///
    /// When `bytes` does not fit, the payload is reallocated to a capacity the
    /// transport picks (at least `bytes.len()`) and the returned buffer has a
    /// new identity. Type and subscription id are kept either way.
    pub fn set_payload(mut self, bytes: &[u8]) -> MessageBuffer {
        if bytes.len() > self.capacity() {
            if self.shared().is_closed() {
                self.set_outcome(Status::BadArgument, libc::EBADF);
                return self;
            }
            let capacity = self.shared().capacity_for(bytes.len());
            self = self.reallocated(capacity, false);
        }
        self.payload[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        self
    }

    /// Reallocate the payload to `new_capacity` bytes. With `keep_payload` the
    /// current payload is copied over (the capacity never drops below the
    /// current length); without it the length is reset to zero.
    pub fn realloc_payload(mut self, new_capacity: usize, keep_payload: bool) -> MessageBuffer {
        if self.shared().is_closed() {
            self.set_outcome(Status::BadArgument, libc::EBADF);
            return self;
        }
        let capacity = if keep_payload { new_capacity.max(self.len) } else { new_capacity };
        self.reallocated(capacity, keep_payload)
    }

    /// The raw fixed-width transaction id.
    pub fn transaction_id(&self) -> &[u8; MAX_XID] {
        &self.xaction
    }

    /// Copy up to `MAX_XID` bytes of `token`, zero-padding the rest.
    /// Returns the number of bytes copied.
    pub fn set_transaction_id(&mut self, token: &[u8]) -> usize {
        copy_fixed(&mut self.xaction, token)
    }

    pub fn set_transaction_id_str(&mut self, token: &str) -> usize {
        self.set_transaction_id(token.as_bytes())
    }

    /// Fill the transaction id with a fresh time-ordered unique token.
    pub fn generate_transaction_id(&mut self) {
        let mut token = [0u8; uuid::fmt::Simple::LENGTH];
        Uuid::now_v7().simple().encode_lower(&mut token);
        self.set_transaction_id(&token);
    }

    /// The raw fixed-width meid, exactly as stored. All-zero stays all-zero.
    pub fn get_meid(&self) -> [u8; MAX_MEID] {
        self.meid
    }

    /// Copy up to `MAX_MEID` bytes of `bytes`, zero-padding the rest.
    /// Returns the number of bytes copied.
    pub fn set_meid(&mut self, bytes: &[u8]) -> usize {
        copy_fixed(&mut self.meid, bytes)
    }

    pub fn set_meid_str(&mut self, meid: &str) -> usize {
        self.set_meid(meid.as_bytes())
    }

    pub(crate) fn shared(&self) -> &Arc<ContextShared> {
        &self.handle.shared
    }

    pub(crate) fn context_id(&self) -> ContextId {
        self.handle.shared.id()
    }

    /// True when the message was sent with `call` and its sender waits for a reply.
    pub fn expects_reply(&self) -> bool {
        self.handle.wire_flags & WFL_CALL != 0
    }

    /// True when the message arrived through `return_to_sender`.
    pub fn is_reply(&self) -> bool {
        self.handle.wire_flags & WFL_REPLY != 0
    }

    pub(crate) fn set_outcome(&mut self, status: Status, tp_state: i32) {
        self.status = status;
        self.tp_state = tp_state;
    }

    pub(crate) fn xaction_is_unset(&self) -> bool {
        self.xaction.iter().all(|&b| b == 0)
    }

    /// Header to put on the wire for this buffer.
    pub(crate) fn wire_header(&self, flags: u32) -> WireHeader {
        WireHeader {
            message_type: self.mtype,
            sub_id: self.sub_id.unwrap_or(NO_SUB_ID),
            payload_len: self.len as u32,
            flags: if self.sub_id.is_some() { flags | WFL_SUB_ID } else { flags },
            xaction: self.xaction,
            meid: self.meid,
            ..WireHeader::default()
        }
    }

    /// Replace header and payload with a received message, growing the
    /// payload first when the message does not fit.
    pub(crate) fn deliver(mut self, message: Parked) -> MessageBuffer {
        let needed = message.payload.len();
        if needed > self.capacity() {
            let capacity = self.shared().capacity_for(needed);
            self = self.reallocated(capacity, false);
        }
        self.payload[..needed].copy_from_slice(&message.payload);
        self.len = needed;
        self.mtype = message.meta.message_type;
        self.sub_id = message.meta.has_flag(WFL_SUB_ID).then_some(message.meta.sub_id);
        self.xaction = message.meta.xaction;
        self.meid = message.meta.meid;
        self.source = message.meta.source();
        self.handle.wire_flags = message.meta.flags;
        if message.is_truncated() {
            self.set_outcome(Status::Truncated, libc::EMSGSIZE);
        } else {
            self.set_outcome(Status::Ok, 0);
        }
        self
    }

    /// A zeroed buffer of the same capacity from the same context.
    pub(crate) fn fresh_like(&self) -> MessageBuffer {
        MessageBuffer::new(Arc::clone(self.shared()), self.capacity())
    }

    /// Move to a new payload allocation and a new identity.
    fn reallocated(mut self, capacity: usize, keep_payload: bool) -> MessageBuffer {
        let mut payload = vec![0u8; capacity];
        if keep_payload {
            let keep = self.len.min(capacity);
            payload[..keep].copy_from_slice(&self.payload[..keep]);
            self.len = keep;
        } else {
            self.len = 0;
        }
        tracing::trace!(from = %self.id, capacity, "payload reallocated");
        self.payload = payload;
        self.id = BufferId::next();
        self
    }
}

impl Drop for MessageBuffer {
    fn drop(&mut self) {
        self.handle.shared.buffer_released();
    }
}

impl fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_message_buffer(self, f)
    }
}

fn copy_fixed<const N: usize>(field: &mut [u8; N], src: &[u8]) -> usize {
    let len = src.len().min(N);
    *field = [0; N];
    field[..len].copy_from_slice(&src[..len]);
    len
}
