pub mod futex;
pub mod mailbox;
pub mod region;

pub use mailbox::{Mailbox, Parked, PushError};
pub use region::{create_region, MemoryRegion};
