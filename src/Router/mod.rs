pub mod buffer;
pub mod builder;
pub mod context;
pub mod drain;
pub mod engine;
pub mod error;
pub mod routes;
pub mod status;
pub mod summary;

pub use buffer::{BufferId, MessageBuffer};
pub use builder::ContextBuilder;
pub use context::{ContextId, InitFlags, RetryMode, SendTimeout, TransportContext};
pub use drain::{drain, Drained, TypeFilter};
pub use engine::ChannelId;
pub use error::{Result, RouterError};
pub use routes::RouteTable;
pub use status::{Constants, Status, StatusTable, UNKNOWN_STATE};
pub use summary::MessageSummary;
