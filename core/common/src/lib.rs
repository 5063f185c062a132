//! Common utilities and types shared across the sealcal crates.
//!
//! This crate holds the error taxonomy, the plaintext event model that gets
//! encrypted, and the wire record exchanged with the remote store.

pub mod error;
pub mod event;
pub mod types;

pub use error::{Error, Result};
pub use event::{Event, EventCollection, EventId, NewEvent};
pub use types::{EnvelopeRecord, SensitiveBytes};
