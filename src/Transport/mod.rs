//! Boundary toward the transport provider.
//!
//! A provider owns delivery and connection management. This layer hands it
//! buffers by value and continues with whatever buffer it hands back.

pub mod local;

use std::fmt;
use std::time::{Duration, Instant};

use crate::Router::buffer::MessageBuffer;
use crate::Router::context::SendTimeout;

/// Where a send goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination<'a> {
    /// Resolve through the route table by message type and subscription id.
    Routed,
    /// Straight to a named endpoint (replies and direct channels).
    Endpoint(&'a str),
}

/// How long a receive may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return at once.
    Poll,
    /// Block up to the bound.
    For(Duration),
    /// Block until a message arrives or the context closes.
    Forever,
}

impl Wait {
    /// -1 (any negative) blocks forever, 0 polls, >0 waits that many milliseconds.
    pub fn from_millis(timeout_ms: i32) -> Self {
        match timeout_ms {
            ms if ms < 0 => Wait::Forever,
            0 => Wait::Poll,
            ms => Wait::For(Duration::from_millis(ms as u64)),
        }
    }

    pub(crate) fn deadline(self, now: Instant) -> Option<Instant> {
        match self {
            Wait::Poll => Some(now),
            Wait::For(d) => Some(now + d),
            Wait::Forever => None,
        }
    }
}

pub(crate) trait Transport: Send + Sync + fmt::Debug {
    /// One-time constants discovery: serialized name -> integer mapping.
    fn constants(&self) -> String;

    /// Endpoint name this transport is bound to; stamped as the source of sends.
    fn endpoint(&self) -> &str;

    fn is_ready(&self) -> bool;

    /// Payload capacity to allocate for a request of `requested` bytes.
    fn capacity_for(&self, requested: usize) -> usize;

    /// Deliver the buffer; the returned buffer carries the outcome.
    fn send(&self, msg: MessageBuffer, dest: Destination<'_>, wire_flags: u32, policy: SendTimeout) -> MessageBuffer;

    /// Fill the buffer with the next message, or the next one whose
    /// transaction id equals `expect`.
    fn receive(&self, msg: MessageBuffer, wait: Wait, expect: Option<&[u8]>) -> MessageBuffer;

    /// True when `target` can currently be reached directly.
    fn connect(&self, target: &str) -> bool;

    fn close(&self);
}
