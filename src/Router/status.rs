//! Status taxonomy, provider constants and the code -> name table.
//!
//! The constants come from the transport provider as a serialized
//! name -> integer mapping. They are parsed once per process; the status
//! table is derived from them by keeping the status-named entries and
//! inverting the mapping.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::Router::error::RouterError;

/// Name returned for codes the provider never published.
pub const UNKNOWN_STATE: &str = "UNKNOWN STATE";

const STATUS_OK_NAME: &str = "DMXP_OK";
const STATUS_ERR_PREFIX: &str = "DMXP_ERR";

/// Outcome carried by every message buffer.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// State is good.
    Ok = 0,
    /// An argument (context, buffer, size) was unusable.
    BadArgument = 1,
    /// No endpoint is routed for the message type.
    NoEndpoint = 2,
    /// The message had no payload.
    Empty = 3,
    /// The message lacked a header field the operation needs (e.g. a source for a reply).
    NoHeader = 4,
    /// The send failed.
    SendFailed = 5,
    /// A call could not send its request.
    CallFailed = 6,
    /// No direct channel is open.
    NoChannelOpen = 7,
    /// The channel id was invalid.
    InvalidChannelId = 8,
    /// The operation would overrun a buffer or field.
    Overflow = 9,
    /// The request failed, but the caller may re-issue it.
    Retry = 10,
    /// The receive failed (hard error).
    ReceiveFailed = 11,
    /// The operation timed out, or a poll found nothing.
    Timeout = 12,
    /// The buffer was never populated by the transport.
    Unset = 13,
    /// The received message was truncated.
    Truncated = 14,
    /// Initialisation of something failed.
    InitFailed = 15,
}

impl Status {
    pub const ALL: [Status; 16] = [
        Status::Ok,
        Status::BadArgument,
        Status::NoEndpoint,
        Status::Empty,
        Status::NoHeader,
        Status::SendFailed,
        Status::CallFailed,
        Status::NoChannelOpen,
        Status::InvalidChannelId,
        Status::Overflow,
        Status::Retry,
        Status::ReceiveFailed,
        Status::Timeout,
        Status::Unset,
        Status::Truncated,
        Status::InitFailed,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Status> {
        Status::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// The symbolic constant name the provider publishes for this status.
    pub fn constant_name(self) -> &'static str {
        match self {
            Status::Ok => "DMXP_OK",
            Status::BadArgument => "DMXP_ERR_BADARG",
            Status::NoEndpoint => "DMXP_ERR_NOENDPT",
            Status::Empty => "DMXP_ERR_EMPTY",
            Status::NoHeader => "DMXP_ERR_NOHDR",
            Status::SendFailed => "DMXP_ERR_SENDFAILED",
            Status::CallFailed => "DMXP_ERR_CALLFAILED",
            Status::NoChannelOpen => "DMXP_ERR_NOCHOPEN",
            Status::InvalidChannelId => "DMXP_ERR_CHID",
            Status::Overflow => "DMXP_ERR_OVERFLOW",
            Status::Retry => "DMXP_ERR_RETRY",
            Status::ReceiveFailed => "DMXP_ERR_RCVFAILED",
            Status::Timeout => "DMXP_ERR_TIMEOUT",
            Status::Unset => "DMXP_ERR_UNSET",
            Status::Truncated => "DMXP_ERR_TRUNC",
            Status::InitFailed => "DMXP_ERR_INITFAILED",
        }
    }

    /// Name resolved through the process-wide status table.
    pub fn name(self) -> &'static str {
        StatusTable::global().name(self.code())
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// True only for the status that invites re-issuing the whole call.
    pub fn is_retryable(self) -> bool {
        self == Status::Retry
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed constants discovery result: symbolic name -> integer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constants {
    values: BTreeMap<String, i64>,
}

lazy_static! {
    static ref CONSTANTS: Constants = Constants::discover();
    static ref STATUS_TABLE: StatusTable = StatusTable::from_constants(&CONSTANTS);
}

impl Constants {
    /// Parse the serialized mapping a provider returns from its discovery call.
    pub fn from_json(json: &str) -> Result<Self, RouterError> {
        let values: BTreeMap<String, i64> = serde_json::from_str(json)?;
        Ok(Self { values })
    }

    /// Process-wide constants, queried from the built-in provider on first use.
    pub fn global() -> &'static Constants {
        &CONSTANTS
    }

    fn discover() -> Self {
        let json = crate::Transport::local::discover_constants();
        Self::from_json(&json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "provider constants were not parseable; using an empty table");
            Self::default()
        })
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    /// Value of `name`, or `default` when the provider did not publish it.
    pub fn get_or(&self, name: &str, default: i64) -> i64 {
        self.get(name).unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn max_xid(&self) -> usize {
        self.get_or("DMXP_MAX_XID", 32) as usize
    }

    pub fn max_meid(&self) -> usize {
        self.get_or("DMXP_MAX_MEID", 32) as usize
    }

    pub fn max_src(&self) -> usize {
        self.get_or("DMXP_MAX_SRC", 64) as usize
    }

    pub fn max_receive_bytes(&self) -> usize {
        self.get_or("DMXP_MAX_RCV_BYTES", 4096) as usize
    }
}

/// Inverted status mapping: code -> symbolic name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTable {
    names: HashMap<i32, String>,
}

impl StatusTable {
    /// Keep the status-named entries of `constants` and invert them.
    pub fn from_constants(constants: &Constants) -> Self {
        let names = constants
            .iter()
            .filter(|(name, _)| *name == STATUS_OK_NAME || name.starts_with(STATUS_ERR_PREFIX))
            .map(|(name, code)| (code as i32, name.to_string()))
            .collect();
        Self { names }
    }

    /// The table built from the process-wide constants.
    pub fn global() -> &'static StatusTable {
        &STATUS_TABLE
    }

    /// Symbolic name of `code`; unknown codes map to `UNKNOWN_STATE`.
    pub fn name(&self, code: i32) -> &str {
        self.names.get(&code).map_or(UNKNOWN_STATE, String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
