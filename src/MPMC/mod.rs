pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod layout;
    pub use Buffer::{RingBuffer, SlotHeader}; // re-export for stable path
    pub use layout::QueueControl;
}

pub mod Structs {
    pub mod Buffer_Structs;
    pub use Buffer_Structs::WireHeader; // re-export for stable path
}
