// Header carried in front of every payload in a mailbox slot

// no atomics in WireHeader; keep as plain integral types so a slot can be copied out whole

/// Width of the transaction id field in bytes.
pub const MAX_XID: usize = 32;
/// Width of the managed-equipment id field in bytes.
pub const MAX_MEID: usize = 32;
/// Width of the source (sender endpoint name) field in bytes.
pub const MAX_SRC: usize = 64;

/// Value left in `sub_id` when the sender set no subscription id. Whether
/// one was set is carried by `WFL_SUB_ID`, so -1 is still a usable id.
pub const NO_SUB_ID: i32 = -1;

/// Set on messages sent through `call`.
pub const WFL_CALL: u32 = 0x01;
/// Set on replies sent through `return_to_sender`.
pub const WFL_REPLY: u32 = 0x02;
/// Set on messages sent over a directly opened channel.
pub const WFL_CHANNEL: u32 = 0x04;
/// Set when `sub_id` holds a subscription id.
pub const WFL_SUB_ID: u32 = 0x08;

/// Routing metadata that precedes each payload in a slot.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct WireHeader {
    pub message_type: i32,
    pub sub_id: i32,
    /// Length of the payload as sent; may exceed the bytes stored in the slot.
    pub payload_len: u32,
    pub flags: u32,
    pub sent_ns: u64,
    pub xaction: [u8; MAX_XID],
    pub meid: [u8; MAX_MEID],
    pub src: [u8; MAX_SRC],
}

impl Default for WireHeader {
    fn default() -> Self {
        Self {
            message_type: 0,
            sub_id: NO_SUB_ID,
            payload_len: 0,
            flags: 0,
            sent_ns: 0,
            xaction: [0; MAX_XID],
            meid: [0; MAX_MEID],
            src: [0; MAX_SRC],
        }
    }
}

impl WireHeader {
    /// Copies `name` into the source field, truncating at `MAX_SRC - 1` so
    /// the field always stays nul-terminated.
    pub fn set_source(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_SRC - 1);
        self.src = [0; MAX_SRC];
        self.src[..len].copy_from_slice(&bytes[..len]);
    }

    /// The source field up to its first nul byte.
    pub fn source(&self) -> String {
        let end = self.src.iter().position(|&b| b == 0).unwrap_or(MAX_SRC);
        String::from_utf8_lossy(&self.src[..end]).into_owned()
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}
