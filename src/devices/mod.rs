//! Concrete device implementations layered on top of the port bus and
//! virtual-interrupt table.

pub mod block_storage;

pub use block_storage::{BlockIoVirtualInterrupt, BlockStorage, FileBackedStorage};
