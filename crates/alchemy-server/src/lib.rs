//! Alchemy state service
//!
//! Serves one state namespace over HTTP for shared/remote runs. All
//! mutations are serialized through a single writer task per namespace
//! (lost-update protection); reads are dispatched concurrently. The
//! wire protocol lives in `alchemy_state::protocol` and is consumed on
//! the client side by `alchemy_state::RemoteStore`.

pub mod http;
pub mod service;

// Re-exports
pub use http::{router, serve};
pub use service::{ServiceError, StateService};
