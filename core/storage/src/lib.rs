//! Remote store abstraction for sealcal.
//!
//! The sync layer talks to two collaborators: an [`EventStore`] that holds
//! the single encrypted envelope, and a [`SessionGateway`] that opens and
//! closes the server-side session. Both only ever see ciphertext and the
//! account password; the encryption password never reaches this crate.
//!
//! # Implementations
//! - [`HttpStore`]: the calendar server's `/api/events` and `/auth/*` routes
//! - [`LocalStore`]: a single JSON file, for offline use
//! - [`MemoryStore`]: in-process, for tests

pub mod http;
pub mod local;
pub mod memory;
pub mod provider;

pub use http::HttpStore;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use provider::{EventStore, SessionGateway};
