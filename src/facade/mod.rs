pub mod coordinator;

pub use coordinator::LockCoordinator;
