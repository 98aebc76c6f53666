//! Send / receive / reply / call against a context.
//!
//! Every operation takes the buffer by value and returns the buffer the
//! caller continues with. Failures are reported through its status.

use std::fmt;

use crate::MPMC::Structs::Buffer_Structs::{MAX_XID, WFL_CALL, WFL_CHANNEL, WFL_REPLY};
use crate::Router::buffer::MessageBuffer;
use crate::Router::context::{InitFlags, TransportContext};
use crate::Router::error::{Result, RouterError};
use crate::Router::routes::{host_of, normalize_endpoint};
use crate::Router::status::Status;
use crate::Transport::{Destination, Wait};

/// Handle to a direct channel opened with `open_channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(usize);

impl ChannelId {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chan({})", self.0)
    }
}

impl TransportContext {
    /// Buffers from another context are refused with EINVAL, a closed
    /// context with EBADF.
    fn admit(&self, msg: &mut MessageBuffer) -> bool {
        if msg.context_id() != self.id() {
            msg.set_outcome(Status::BadArgument, libc::EINVAL);
            return false;
        }
        if self.is_closed() {
            msg.set_outcome(Status::BadArgument, libc::EBADF);
            return false;
        }
        true
    }

    /// With `AUTO_ALLOC`, a successful send hands back a fresh buffer.
    fn after_send(&self, msg: MessageBuffer) -> MessageBuffer {
        if msg.is_ok() && self.flags().contains(InitFlags::AUTO_ALLOC) {
            return msg.fresh_like();
        }
        msg
    }

    /// Route the buffer by message type and subscription id.
    ///
    /// A full destination queue is retried per the send timeout; once that
    /// policy is exhausted the status is `Retry` with EAGAIN.
    pub fn send(&self, mut msg: MessageBuffer) -> MessageBuffer {
        if !self.admit(&mut msg) {
            return msg;
        }
        let msg = self
            .shared()
            .transport()
            .send(msg, Destination::Routed, 0, self.send_timeout());
        self.after_send(msg)
    }

    /// Wait for the next message. `timeout_ms`: -1 blocks, 0 polls, >0 bounds the wait.
    pub fn receive(&self, mut msg: MessageBuffer, timeout_ms: i32) -> MessageBuffer {
        if !self.admit(&mut msg) {
            return msg;
        }
        self.shared()
            .transport()
            .receive(msg, Wait::from_millis(timeout_ms), None)
    }

    pub fn receive_blocking(&self, msg: MessageBuffer) -> MessageBuffer {
        self.receive(msg, -1)
    }

    /// Wait for the message carrying `xaction`. Others that arrive first are
    /// kept for later receives in arrival order.
    pub fn receive_specific(&self, mut msg: MessageBuffer, xaction: &[u8], timeout_ms: i32) -> MessageBuffer {
        if !self.admit(&mut msg) {
            return msg;
        }
        if xaction.is_empty() || xaction.len() > MAX_XID {
            msg.set_outcome(Status::BadArgument, libc::EINVAL);
            return msg;
        }
        // Stored ids are zero padded; compare the whole field.
        let mut key = [0u8; MAX_XID];
        key[..xaction.len()].copy_from_slice(xaction);
        self.shared()
            .transport()
            .receive(msg, Wait::from_millis(timeout_ms), Some(&key))
    }

    /// Send the buffer back to the endpoint it came from.
    pub fn return_to_sender(&self, mut msg: MessageBuffer) -> MessageBuffer {
        if !self.admit(&mut msg) {
            return msg;
        }
        if msg.source().is_empty() {
            msg.set_outcome(Status::NoHeader, libc::EINVAL);
            return msg;
        }
        let source = msg.source().to_string();
        self.shared()
            .transport()
            .send(msg, Destination::Endpoint(&source), WFL_REPLY, self.send_timeout())
    }

    /// Send and wait for the reply with the same transaction id.
    ///
    /// An unset transaction id is generated first. A failed send reports
    /// `CallFailed`, except `Retry` which stays retryable. No reply within
    /// the call timeout reports `Timeout`.
    pub fn call(&self, mut msg: MessageBuffer) -> MessageBuffer {
        if !self.admit(&mut msg) {
            return msg;
        }
        if msg.xaction_is_unset() {
            msg.generate_transaction_id();
        }
        let xaction = *msg.transaction_id();

        let mut msg = self
            .shared()
            .transport()
            .send(msg, Destination::Routed, WFL_CALL, self.send_timeout());
        if !msg.is_ok() {
            if msg.status() != Status::Retry {
                let tp_state = msg.tp_state();
                msg.set_outcome(Status::CallFailed, tp_state);
            }
            return msg;
        }

        self.shared()
            .transport()
            .receive(msg, Wait::For(self.call_timeout()), Some(&xaction))
    }

    /// Open a direct channel to `target` (`host:port` or a bare port).
    pub fn open_channel(&self, target: &str) -> Result<ChannelId> {
        let endpoint = normalize_endpoint(target.trim(), host_of(self.endpoint()));
        let refuse = |reason: &str| RouterError::ChannelOpen {
            target: endpoint.clone(),
            reason: reason.to_string(),
        };
        if self.is_closed() {
            return Err(refuse("context is closed"));
        }
        if !self.shared().transport().connect(&endpoint) {
            return Err(refuse("endpoint is not reachable"));
        }

        let mut channels = self.shared().channels.lock();
        let slot = match channels.iter().position(Option::is_none) {
            Some(free) => {
                channels[free] = Some(endpoint.clone());
                free
            }
            None => {
                channels.push(Some(endpoint.clone()));
                channels.len() - 1
            }
        };
        tracing::debug!(context = %self.id(), channel = slot, peer = %endpoint, "channel opened");
        Ok(ChannelId(slot))
    }

    /// Send straight to the channel's endpoint, bypassing the route table.
    pub fn send_on_channel(&self, channel: ChannelId, mut msg: MessageBuffer) -> MessageBuffer {
        if !self.admit(&mut msg) {
            return msg;
        }
        let target = {
            let channels = self.shared().channels.lock();
            if channels.iter().all(Option::is_none) {
                msg.set_outcome(Status::NoChannelOpen, libc::ENOTCONN);
                return msg;
            }
            match channels.get(channel.0) {
                Some(Some(target)) => target.clone(),
                _ => {
                    msg.set_outcome(Status::InvalidChannelId, libc::EINVAL);
                    return msg;
                }
            }
        };
        let msg = self
            .shared()
            .transport()
            .send(msg, Destination::Endpoint(&target), WFL_CHANNEL, self.send_timeout());
        self.after_send(msg)
    }

    /// Returns false when the channel was not open.
    pub fn close_channel(&self, channel: ChannelId) -> bool {
        let mut channels = self.shared().channels.lock();
        match channels.get_mut(channel.0) {
            Some(slot @ Some(_)) => {
                *slot = None;
                tracing::debug!(context = %self.id(), channel = channel.0, "channel closed");
                true
            }
            _ => false,
        }
    }
}
