//! Durable and ephemeral storage behind a typed façade

pub mod facade;
pub mod memory;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use facade::RoomStore;
pub use memory::{MemoryDurableStore, MemoryEphemeralStore};
pub use traits::{DurableStore, EphemeralStore};

