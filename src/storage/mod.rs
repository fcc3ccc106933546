pub mod adapter;
pub mod memory;

pub use adapter::{BackendProfile, StoreAdapter};
pub use memory::InMemoryStore;
