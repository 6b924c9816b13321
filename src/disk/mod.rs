pub mod block_device;
pub mod client;
pub mod dump;
pub mod error;
pub mod fault;
pub mod init;
pub mod memory_disk;
pub mod types;

pub use block_device::BlockDevice;
pub use client::BlockClient;
pub use error::BlockError;
pub use fault::{DamagedBlock, FaultPolicy, NoFaults};
pub use memory_disk::MemoryDisk;
pub use types::BlockNumber;
