pub mod memory;
pub mod rest;
pub mod traits;

pub use memory::MemoryProgressStore;
pub use rest::RestProgressStore;
pub use traits::{BeaconStatus, ProgressStore};
