//! Message buffers and transport contexts for a lightweight message router.
//!
//! A `TransportContext` binds one participant to the transport provider;
//! `MessageBuffer`s allocated from it are moved through send, receive, reply
//! and call, each returning the buffer to continue with.

// Module naming follows project convention (MPMC = Multi-Producer Multi-Consumer)
#[allow(non_snake_case)]
pub mod MPMC;
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Router;
#[allow(non_snake_case)]
pub mod Transport;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}
pub mod ffi;

pub use Router::{
    drain, BufferId, ChannelId, ContextBuilder, Drained, InitFlags, MessageBuffer, MessageSummary,
    RouteTable, RouterError, SendTimeout, Status, StatusTable, TransportContext, TypeFilter,
};
pub use Transport::Wait;
