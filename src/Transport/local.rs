//! In-process transport provider.
//!
//! Every bound context owns a `Mailbox` registered under its endpoint name in
//! a process-wide registry. Sends resolve a route to endpoint names, look the
//! mailboxes up and push into their rings; receives pop from the context's
//! own mailbox.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::Core::mailbox::{Mailbox, PushError};
use crate::MPMC::Structs::Buffer_Structs::{WireHeader, MAX_MEID, MAX_SRC, MAX_XID};
use crate::Router::buffer::MessageBuffer;
use crate::Router::context::{InitFlags, RetryMode, SendTimeout, SPINS_PER_ROUND};
use crate::Router::routes::RouteTable;
use crate::Router::status::Status;
use crate::Transport::{Destination, Transport, Wait};

/// Default maximum payload a receiver accepts.
pub const MAX_RCV_BYTES: usize = 4096;
/// Smallest payload capacity handed out.
pub const MIN_CAPACITY: usize = 64;

const MAX_NAP: Duration = Duration::from_millis(1);

lazy_static! {
    static ref ENDPOINTS: Mutex<HashMap<String, Arc<Mailbox>>> = Mutex::new(HashMap::new());
}

/// Serialized constants this provider publishes.
pub fn discover_constants() -> String {
    let mut consts: BTreeMap<&str, i64> = BTreeMap::new();
    for status in Status::ALL {
        consts.insert(status.constant_name(), status.code() as i64);
    }
    consts.insert("DMXP_MAX_XID", MAX_XID as i64);
    consts.insert("DMXP_MAX_SID", 32);
    consts.insert("DMXP_MAX_MEID", MAX_MEID as i64);
    consts.insert("DMXP_MAX_SRC", MAX_SRC as i64);
    consts.insert("DMXP_MAX_RCV_BYTES", MAX_RCV_BYTES as i64);
    consts.insert("DMXP_DEF_SIZE", 0);
    consts.insert("DMXP_FL_NONE", InitFlags::NONE.bits() as i64);
    consts.insert("DMXP_FL_AUTO_ALLOC", InitFlags::AUTO_ALLOC.bits() as i64);
    serde_json::to_string(&consts).unwrap_or_else(|_| String::from("{}"))
}

/// True when some context in this process is bound to `endpoint`.
pub fn is_bound(endpoint: &str) -> bool {
    ENDPOINTS.lock().contains_key(endpoint)
}

fn lookup(endpoint: &str) -> Option<Arc<Mailbox>> {
    ENDPOINTS.lock().get(endpoint).cloned()
}

pub(crate) struct LocalTransport {
    endpoint: String,
    mailbox: Arc<Mailbox>,
    routes: RouteTable,
}

impl LocalTransport {
    /// Register a mailbox of `depth` slots (each holding up to
    /// `max_receive_size` payload bytes) under `endpoint`.
    pub(crate) fn bind(
        endpoint: &str,
        depth: usize,
        max_receive_size: usize,
        routes: RouteTable,
    ) -> io::Result<Self> {
        let mut endpoints = ENDPOINTS.lock();
        if endpoints.contains_key(endpoint) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("endpoint {endpoint} is already bound in this process"),
            ));
        }
        let mailbox = Arc::new(Mailbox::new(endpoint, depth, max_receive_size)?);
        endpoints.insert(endpoint.to_string(), Arc::clone(&mailbox));
        drop(endpoints);

        tracing::debug!(endpoint, depth, max_receive_size, routes = routes.len(), "endpoint bound");
        Ok(Self {
            endpoint: endpoint.to_string(),
            mailbox,
            routes,
        })
    }

    fn push_to(&self, target: &str, meta: WireHeader, payload: &[u8], policy: SendTimeout) -> (Status, i32) {
        let Some(mailbox) = lookup(target) else {
            return (Status::SendFailed, libc::ECONNREFUSED);
        };
        match push_with_policy(&mailbox, meta, payload, policy) {
            Ok(()) => (Status::Ok, 0),
            Err(PushError::Full) => (Status::Retry, libc::EAGAIN),
            Err(PushError::Closed) => (Status::SendFailed, libc::ECONNRESET),
        }
    }
}

/// Push according to the send retry policy while the ring is full.
fn push_with_policy(mailbox: &Mailbox, meta: WireHeader, payload: &[u8], policy: SendTimeout) -> Result<(), PushError> {
    let started = Instant::now();
    let mut attempts = 0u32;
    let mut nap = Duration::from_micros(1);

    loop {
        match mailbox.push(meta, payload) {
            Err(PushError::Full) => {}
            other => return other,
        }
        attempts += 1;

        match policy.mode() {
            RetryMode::NoRetry => return Err(PushError::Full),
            RetryMode::Spin => {
                if attempts >= SPINS_PER_ROUND {
                    return Err(PushError::Full);
                }
                std::hint::spin_loop();
            }
            RetryMode::SpinThenSleep(limit) => {
                if started.elapsed() >= limit {
                    return Err(PushError::Full);
                }
                if attempts % SPINS_PER_ROUND == 0 {
                    std::thread::sleep(nap);
                    nap = (nap * 2).min(MAX_NAP);
                } else {
                    std::hint::spin_loop();
                }
            }
        }
    }
}

impl Transport for LocalTransport {
    fn constants(&self) -> String {
        discover_constants()
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_ready(&self) -> bool {
        if self.mailbox.is_closed() {
            return false;
        }
        let endpoints = ENDPOINTS.lock();
        self.routes.endpoints().all(|ep| endpoints.contains_key(ep))
    }

    fn capacity_for(&self, requested: usize) -> usize {
        requested.max(MIN_CAPACITY).next_power_of_two()
    }

    fn send(&self, mut msg: MessageBuffer, dest: Destination<'_>, wire_flags: u32, policy: SendTimeout) -> MessageBuffer {
        if self.mailbox.is_closed() {
            msg.set_outcome(Status::BadArgument, libc::EBADF);
            return msg;
        }

        let mut meta = msg.wire_header(wire_flags);
        meta.set_source(&self.endpoint);
        meta.sent_ns = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        let targets: Vec<String> = match dest {
            Destination::Endpoint(target) => vec![target.to_string()],
            Destination::Routed => match self.routes.resolve(msg.message_type(), msg.subscription_id()) {
                Some(targets) => targets,
                None => {
                    tracing::trace!(mtype = msg.message_type(), sub_id = ?msg.subscription_id(), "no route");
                    msg.set_outcome(Status::NoEndpoint, libc::EINVAL);
                    return msg;
                }
            },
        };

        // Every group gets a copy; the first failure is what the caller sees.
        let mut outcome = (Status::Ok, 0);
        for target in &targets {
            let result = self.push_to(target, meta, msg.payload(), policy);
            tracing::trace!(from = %self.endpoint, to = %target, mtype = meta.message_type, status = ?result.0, "send");
            if outcome.0.is_ok() && !result.0.is_ok() {
                outcome = result;
            }
        }
        msg.set_outcome(outcome.0, outcome.1);
        msg
    }

    fn receive(&self, mut msg: MessageBuffer, wait: Wait, expect: Option<&[u8]>) -> MessageBuffer {
        let deadline = wait.deadline(Instant::now());

        loop {
            if self.mailbox.is_closed() {
                msg.set_outcome(Status::BadArgument, libc::EBADF);
                return msg;
            }

            let seen = self.mailbox.signal_value();

            let parked = match expect {
                Some(xaction) => self.mailbox.take_parked_matching(xaction),
                None => self.mailbox.take_parked(),
            };
            if let Some(message) = parked {
                return msg.deliver(message);
            }

            let popped = match expect {
                Some(xaction) => match self.mailbox.pop_ring_matching(xaction) {
                    Ok(popped) => popped,
                    Err(e) => {
                        tracing::warn!(endpoint = %self.endpoint, error = %e, "park list full while waiting for a reply");
                        msg.set_outcome(Status::ReceiveFailed, e.raw_os_error().unwrap_or(libc::ENOBUFS));
                        return msg;
                    }
                },
                None => self.mailbox.pop_ring(),
            };
            if let Some(message) = popped {
                tracing::trace!(endpoint = %self.endpoint, mtype = message.meta.message_type, "receive");
                return msg.deliver(message);
            }

            let remaining = match (wait, deadline) {
                (Wait::Poll, _) => {
                    msg.set_outcome(Status::Timeout, libc::EAGAIN);
                    return msg;
                }
                (_, Some(deadline)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        msg.set_outcome(Status::Timeout, libc::ETIMEDOUT);
                        return msg;
                    }
                    Some(deadline - now)
                }
                (_, None) => None,
            };
            self.mailbox.wait(seen, remaining);
        }
    }

    fn connect(&self, target: &str) -> bool {
        is_bound(target)
    }

    fn close(&self) {
        let mut endpoints = ENDPOINTS.lock();
        if endpoints
            .get(&self.endpoint)
            .is_some_and(|registered| Arc::ptr_eq(registered, &self.mailbox))
        {
            endpoints.remove(&self.endpoint);
        }
        drop(endpoints);
        self.mailbox.close();
        tracing::debug!(endpoint = %self.endpoint, "endpoint unbound");
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("endpoint", &self.endpoint)
            .field("mailbox", &self.mailbox)
            .field("routes", &self.routes.len())
            .finish()
    }
}
