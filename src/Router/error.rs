use std::io;
use thiserror::Error;

use crate::Router::status::Status;

/// Failures that are not reported through a buffer's status.
///
/// Allocation-time failures land here because there is no valid buffer
/// to carry a status; everything a buffer operation can report is a
/// `Status` on the returned buffer instead.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("bad buffer allocation: {0}")]
    BadBufferAllocation(String),

    #[error("failed to initialise context on {bind:?}: {reason}")]
    InitFailed { bind: String, reason: String },

    #[error("route table line {line}: {reason}")]
    RouteTable { line: usize, reason: String },

    #[error("cannot open channel to {target}: {reason}")]
    ChannelOpen { target: String, reason: String },

    #[error("constants mapping: {0}")]
    Constants(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RouterError {
    pub(crate) fn init(bind: &str, reason: impl Into<String>) -> Self {
        RouterError::InitFailed {
            bind: bind.to_string(),
            reason: reason.into(),
        }
    }

    /// Closest buffer status, for callers that only speak status codes.
    pub fn status(&self) -> Status {
        match self {
            RouterError::BadBufferAllocation(_) => Status::BadArgument,
            RouterError::ChannelOpen { .. } => Status::NoEndpoint,
            RouterError::InitFailed { .. }
            | RouterError::RouteTable { .. }
            | RouterError::Constants(_)
            | RouterError::Io(_) => Status::InitFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
