//! Non-blocking consumption of everything currently queued.

use crate::Router::context::TransportContext;
use crate::Router::status::Status;
use crate::Router::summary::MessageSummary;

/// Payload capacity of the probe buffer; larger messages grow it.
pub const PROBE_SIZE: usize = 4096;

/// Which message types a drain keeps. An empty set keeps everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    All,
    Only(Vec<i32>),
}

impl TypeFilter {
    pub fn accepts(&self, mtype: i32) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Only(types) => types.is_empty() || types.contains(&mtype),
        }
    }

    fn of_set(types: Vec<i32>) -> Self {
        if types.is_empty() {
            TypeFilter::All
        } else {
            TypeFilter::Only(types)
        }
    }
}

impl From<i32> for TypeFilter {
    fn from(mtype: i32) -> Self {
        TypeFilter::Only(vec![mtype])
    }
}

impl From<Vec<i32>> for TypeFilter {
    fn from(types: Vec<i32>) -> Self {
        TypeFilter::of_set(types)
    }
}

impl From<&[i32]> for TypeFilter {
    fn from(types: &[i32]) -> Self {
        TypeFilter::of_set(types.to_vec())
    }
}

impl<const N: usize> From<[i32; N]> for TypeFilter {
    fn from(types: [i32; N]) -> Self {
        TypeFilter::of_set(types.to_vec())
    }
}

impl From<Option<i32>> for TypeFilter {
    fn from(mtype: Option<i32>) -> Self {
        mtype.map_or(TypeFilter::All, TypeFilter::from)
    }
}

/// Outcome of a drain.
#[derive(Debug, Clone)]
pub struct Drained {
    /// Kept messages in receipt order.
    pub messages: Vec<MessageSummary>,
    /// Status of the receive that ended the drain; `Timeout` when the queue ran dry.
    pub terminal_status: Status,
    pub terminal_tp_state: i32,
}

impl Drained {
    /// True when the drain ended because nothing was left to read.
    pub fn ran_dry(&self) -> bool {
        self.terminal_status == Status::Timeout
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Poll until the first non-OK receive, keeping OK messages the filter accepts.
pub fn drain(ctx: &TransportContext, filter: impl Into<TypeFilter>) -> Drained {
    let filter = filter.into();
    let mut probe = match ctx.allocate(PROBE_SIZE) {
        Ok(probe) => probe,
        Err(e) => {
            tracing::debug!(context = %ctx.id(), error = %e, "drain could not allocate a probe");
            return Drained {
                messages: Vec::new(),
                terminal_status: e.status(),
                terminal_tp_state: libc::EBADF,
            };
        }
    };

    let mut messages = Vec::new();
    loop {
        probe = ctx.receive(probe, 0);
        if !probe.is_ok() {
            break;
        }
        if filter.accepts(probe.message_type()) {
            messages.push(probe.summarize());
        }
    }

    tracing::trace!(context = %ctx.id(), kept = messages.len(), status = ?probe.status(), "drain finished");
    Drained {
        messages,
        terminal_status: probe.status(),
        terminal_tp_state: probe.tp_state(),
    }
}

impl TransportContext {
    pub fn drain(&self, filter: impl Into<TypeFilter>) -> Drained {
        drain(self, filter)
    }
}
