//! Alchemy state persistence
//!
//! One record per resource identity, persisted through the
//! [`StateStore`] trait. Backends are interchangeable: [`FileStore`]
//! for single-machine runs, [`MemoryStore`] for tests, and
//! [`RemoteStore`] for shared state behind the wire protocol served by
//! `alchemy-server`.

pub mod error;
pub mod file;
pub mod keys;
pub mod memory;
pub mod protocol;
pub mod remote;
pub mod store;

// Re-exports
pub use error::{Result, StateError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use remote::RemoteStore;
pub use store::StateStore;
