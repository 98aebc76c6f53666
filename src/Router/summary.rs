use serde::Serialize;

use crate::Router::buffer::MessageBuffer;
use crate::Router::status::Status;

/// Immutable snapshot of a buffer's header and payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub payload: Vec<u8>,
    pub payload_length: usize,
    pub message_type: i32,
    pub subscription_id: Option<i32>,
    /// Trimmed at the first NUL.
    pub transaction_id: Vec<u8>,
    pub status: Status,
    pub status_name: String,
    pub payload_max_size: usize,
    /// `None` when the raw field is all zero.
    pub meid: Option<Vec<u8>>,
    pub source: String,
    pub errno: i32,
}

impl MessageSummary {
    /// Transaction id as text, lossily decoded.
    pub fn transaction_id_str(&self) -> String {
        String::from_utf8_lossy(&self.transaction_id).into_owned()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl MessageBuffer {
    pub fn summarize(&self) -> MessageSummary {
        let raw_meid = self.get_meid();
        let meid = if raw_meid.iter().all(|&b| b == 0) {
            None
        } else {
            Some(raw_meid.to_vec())
        };
        let xaction = self.transaction_id();
        let xlen = xaction.iter().position(|&b| b == 0).unwrap_or(xaction.len());

        MessageSummary {
            payload: self.payload().to_vec(),
            payload_length: self.len(),
            message_type: self.message_type(),
            subscription_id: self.subscription_id(),
            transaction_id: xaction[..xlen].to_vec(),
            status: self.status(),
            status_name: self.status().name().to_string(),
            payload_max_size: self.capacity(),
            meid,
            source: self.source().to_string(),
            errno: self.tp_state(),
        }
    }
}
