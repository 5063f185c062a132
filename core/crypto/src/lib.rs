//! Cryptographic primitives for sealcal.
//!
//! This module provides:
//! - Base64 transport encoding
//! - Key derivation using PBKDF2-HMAC-SHA256
//! - Authenticated encryption using AES-256-GCM
//! - The encrypted envelope exchanged with the remote store
//!
//! # Security Guarantees
//! - All key material and passwords are zeroized on drop
//! - No plaintext or key material is ever logged
//! - Salt and nonce are freshly random for every sealed envelope

pub mod aead;
pub mod codec;
pub mod envelope;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, encrypt};
pub use envelope::{deserialize, serialize, EncryptedEnvelope, ENVELOPE_VERSION};
pub use kdf::{derive_key, KdfParams};
pub use keys::{Nonce, Password, Salt, SessionKey};
