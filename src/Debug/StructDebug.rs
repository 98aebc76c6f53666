use crate::Core::mailbox::Mailbox;
use crate::MPMC::Buffer::RingBuffer;
use crate::Router::buffer::MessageBuffer;
use crate::Router::context::TransportContext;
use std::fmt;

/// Debug function for Mailbox
///
/// Shows:
/// - Endpoint name
/// - Ring geometry and current fill
/// - Parked message count and closed state
pub fn debug_mailbox(mailbox: &Mailbox, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Mailbox")
        .field("name", &mailbox.name())
        .field("region_bytes", &mailbox.region_size())
        .field("ring", mailbox.ring())
        .field("parked", &mailbox.parked_len())
        .field("closed", &mailbox.is_closed())
        .finish()
}

/// Debug function for RingBuffer
///
/// Safely displays the buffer's memory location without dereferencing slots
pub fn debug_ring_buffer(buffer: &RingBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RingBuffer")
        .field("buffer", &format_args!("0x{:x}", buffer.buffer_base as usize))
        .field("capacity", &buffer.capacity)
        .field("stride", &buffer.stride)
        .field("payload_room", &buffer.payload_room)
        .finish_non_exhaustive()
}

/// Debug function for MessageBuffer
///
/// Prints header fields and payload length; the provider handle stays opaque.
pub fn debug_message_buffer(buffer: &MessageBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MessageBuffer")
        .field("id", &buffer.id())
        .field("status", &buffer.status())
        .field("mtype", &buffer.message_type())
        .field("sub_id", &buffer.subscription_id())
        .field("len", &buffer.len())
        .field("capacity", &buffer.capacity())
        .field("source", &buffer.source())
        .field("tp_state", &buffer.tp_state())
        .field("handle", &"<opaque>")
        .finish()
}

/// Debug function for TransportContext
pub fn debug_transport_context(ctx: &TransportContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TransportContext")
        .field("id", &ctx.id())
        .field("endpoint", &ctx.endpoint())
        .field("send_timeout", &ctx.send_timeout())
        .field("max_receive_size", &ctx.max_receive_size())
        .field("outstanding_buffers", &ctx.outstanding_buffers())
        .field("closed", &ctx.is_closed())
        .finish_non_exhaustive()
}
