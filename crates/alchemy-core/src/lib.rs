//! Alchemy core types
//!
//! The leaf crate of the workspace: the in-memory value model, the
//! secret-aware codec that turns value trees into persistable JSON, the
//! versioned secret cipher, and the resource records every other crate
//! moves around. No I/O happens here.

pub mod codec;
pub mod error;
pub mod record;
pub mod secret;
pub mod value;

// Re-exports
pub use codec::{decode, encode};
pub use error::{CoreError, Result};
pub use record::{ResourceRecord, ResourceStatus};
pub use secret::SecretCipher;
pub use value::{Secret, Symbol, Value};
