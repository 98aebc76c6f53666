use std::ffi::{c_char, CStr, CString};
use std::ptr;

use lazy_static::lazy_static;

use crate::Router::buffer::MessageBuffer;
use crate::Router::context::{InitFlags, TransportContext};
use crate::Router::status::{Constants, Status};

// Pointer-level errors; every other result is a status code (>= 0).
const DMXP_ERROR_NULL_POINTER: i32 = -1;
const DMXP_ERROR_INVALID_ARG: i32 = -2;
const DMXP_ERROR_NO_SPACE: i32 = -3;

lazy_static! {
    static ref CONSTS_JSON: CString = {
        let values: std::collections::BTreeMap<&str, i64> = Constants::global().iter().collect();
        let json = serde_json::to_string(&values).unwrap_or_default();
        CString::new(json).unwrap_or_default()
    };
}

/// Handle to a transport context (opaque pointer)
pub struct ContextHandle {
    inner: TransportContext,
}

/// Handle to a message buffer (opaque pointer)
///
/// The handle keeps its address while the buffer inside is reallocated.
pub struct MessageHandle {
    inner: Option<MessageBuffer>,
}

impl MessageHandle {
    /// Run an operation that consumes and returns the buffer.
    fn replace_with(&mut self, op: impl FnOnce(MessageBuffer) -> MessageBuffer) -> i32 {
        match self.inner.take() {
            Some(msg) => {
                let msg = op(msg);
                let status = msg.status().code();
                self.inner = Some(msg);
                status
            }
            None => DMXP_ERROR_INVALID_ARG,
        }
    }
}

// -----------------------------------------------------------------------------
// Context API
// -----------------------------------------------------------------------------

/// Create a context bound to `bind_spec`.
///
/// # Arguments
/// * `bind_spec` - NUL-terminated bind spec, e.g. "4560" or "host:4560".
/// * `max_receive_size` - Largest payload accepted; 0 for the default.
/// * `flags` - `DMXP_FL_*` bits.
///
/// # Returns
/// * Pointer to `ContextHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn dmxp_rt_init(bind_spec: *const c_char, max_receive_size: i32, flags: i32) -> *mut ContextHandle {
    if bind_spec.is_null() || max_receive_size < 0 {
        return ptr::null_mut();
    }
    let bind = match unsafe { CStr::from_ptr(bind_spec) }.to_str() {
        Ok(bind) => bind,
        Err(_) => return ptr::null_mut(),
    };

    match TransportContext::init(bind, max_receive_size as usize, InitFlags::from_bits(flags as u32)) {
        Ok(ctx) => Box::into_raw(Box::new(ContextHandle { inner: ctx })),
        Err(e) => {
            tracing::warn!(bind, error = %e, "dmxp_rt_init failed");
            ptr::null_mut()
        }
    }
}

/// 1 when ready, 0 when not, negative on a NULL handle.
#[no_mangle]
pub extern "C" fn dmxp_rt_ready(ctx: *mut ContextHandle) -> i32 {
    if ctx.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    let ctx = unsafe { &(*ctx).inner };
    ctx.is_ready() as i32
}

/// Close the context and free its handle. Messages allocated from it stay
/// valid to free but every other operation on them reports bad-argument.
#[no_mangle]
pub extern "C" fn dmxp_rt_close(ctx: *mut ContextHandle) {
    if !ctx.is_null() {
        unsafe {
            let _ = Box::from_raw(ctx); // closes on drop
        }
    }
}

#[no_mangle]
pub extern "C" fn dmxp_rt_set_stimeout(ctx: *mut ContextHandle, value: i32) -> i32 {
    if ctx.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    let ctx = unsafe { &(*ctx).inner };
    ctx.set_send_timeout(value);
    Status::Ok.code()
}

/// The constants mapping as a NUL-terminated JSON string. Owned by the
/// library; never free it.
#[no_mangle]
pub extern "C" fn dmxp_rt_get_consts() -> *const c_char {
    CONSTS_JSON.as_ptr()
}

// -----------------------------------------------------------------------------
// Message API
// -----------------------------------------------------------------------------

/// Allocate a message with at least `size` payload bytes (0 for the default).
///
/// # Returns
/// * Pointer to `MessageHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn dmxp_rt_alloc_msg(ctx: *mut ContextHandle, size: i32) -> *mut MessageHandle {
    if ctx.is_null() || size < 0 {
        return ptr::null_mut();
    }
    let ctx = unsafe { &(*ctx).inner };
    match ctx.allocate(size as usize) {
        Ok(msg) => Box::into_raw(Box::new(MessageHandle { inner: Some(msg) })),
        Err(e) => {
            tracing::warn!(error = %e, "dmxp_rt_alloc_msg failed");
            ptr::null_mut()
        }
    }
}

/// Free a message handle.
#[no_mangle]
pub extern "C" fn dmxp_rt_free_msg(msg: *mut MessageHandle) {
    if !msg.is_null() {
        unsafe {
            let _ = Box::from_raw(msg); // Dropped automatically
        }
    }
}

#[no_mangle]
pub extern "C" fn dmxp_rt_set_mtype(msg: *mut MessageHandle, mtype: i32) -> i32 {
    if msg.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    match unsafe { (*msg).inner.as_mut() } {
        Some(buffer) => {
            buffer.set_message_type(mtype);
            Status::Ok.code()
        }
        None => DMXP_ERROR_INVALID_ARG,
    }
}

/// Copy `len` bytes into the payload, growing the buffer when needed.
///
/// # Returns
/// * The buffer's status code, or a negative error code.
#[no_mangle]
pub extern "C" fn dmxp_rt_set_payload(msg: *mut MessageHandle, data: *const u8, len: usize) -> i32 {
    if msg.is_null() || (data.is_null() && len > 0) {
        return DMXP_ERROR_NULL_POINTER;
    }
    let bytes: &[u8] = if len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    };
    let handle = unsafe { &mut *msg };
    handle.replace_with(|buffer| buffer.set_payload(bytes))
}

/// Copy the payload into `dest`.
///
/// # Returns
/// * Payload length on success, `DMXP_ERROR_NO_SPACE` when `cap` is too small.
#[no_mangle]
pub extern "C" fn dmxp_rt_get_payload(msg: *const MessageHandle, dest: *mut u8, cap: usize) -> i32 {
    if msg.is_null() || dest.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    let Some(buffer) = (unsafe { (*msg).inner.as_ref() }) else {
        return DMXP_ERROR_INVALID_ARG;
    };
    let payload = buffer.payload();
    if payload.len() > cap {
        return DMXP_ERROR_NO_SPACE;
    }
    unsafe {
        ptr::copy_nonoverlapping(payload.as_ptr(), dest, payload.len());
    }
    payload.len() as i32
}

#[no_mangle]
pub extern "C" fn dmxp_rt_state(msg: *const MessageHandle) -> i32 {
    if msg.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    match unsafe { (*msg).inner.as_ref() } {
        Some(buffer) => buffer.status().code(),
        None => DMXP_ERROR_INVALID_ARG,
    }
}

// -----------------------------------------------------------------------------
// Send / receive
// -----------------------------------------------------------------------------

/// Send the message by its type.
///
/// # Returns
/// * The resulting status code; the handle now holds the buffer to continue with.
#[no_mangle]
pub extern "C" fn dmxp_rt_send_msg(ctx: *mut ContextHandle, msg: *mut MessageHandle) -> i32 {
    if ctx.is_null() || msg.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    let ctx = unsafe { &(*ctx).inner };
    let handle = unsafe { &mut *msg };
    handle.replace_with(|buffer| ctx.send(buffer))
}

/// Receive into the message, waiting up to `timeout_ms` (-1 blocks, 0 polls).
#[no_mangle]
pub extern "C" fn dmxp_rt_torcv_msg(ctx: *mut ContextHandle, msg: *mut MessageHandle, timeout_ms: i32) -> i32 {
    if ctx.is_null() || msg.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    let ctx = unsafe { &(*ctx).inner };
    let handle = unsafe { &mut *msg };
    handle.replace_with(|buffer| ctx.receive(buffer, timeout_ms))
}
