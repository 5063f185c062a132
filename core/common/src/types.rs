//! Wire and buffer types shared between the crypto, storage and sync crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Wire form of an encrypted envelope.
///
/// This is the JSON object exchanged with the remote store:
/// `{"salt": "...", "iv": "...", "ciphertext": "...", "v": 1}` where every
/// byte field is standard base64. Fields are optional at this layer so that a
/// record with a missing field can still be read and then rejected as a
/// malformed envelope by the crypto layer, rather than failing as opaque JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    /// Base64 key-derivation salt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    /// Base64 AES-GCM nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// Base64 ciphertext with the authentication tag appended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<String>,
    /// Envelope scheme version. Records written before versioning omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<u32>,
}

impl EnvelopeRecord {
    /// Create a complete record.
    pub fn new(
        salt: impl Into<String>,
        iv: impl Into<String>,
        ciphertext: impl Into<String>,
        version: u32,
    ) -> Self {
        Self {
            salt: Some(salt.into()),
            iv: Some(iv.into()),
            ciphertext: Some(ciphertext.into()),
            v: Some(version),
        }
    }

    /// Whether the record holds any stored events.
    ///
    /// A store may answer a first-use read with `{}` or a record without
    /// ciphertext; both mean "nothing saved yet".
    pub fn has_data(&self) -> bool {
        self.ciphertext.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Parse the JSON wire form.
    ///
    /// A body of `null` reads as an empty record.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let parsed: Option<Self> = serde_json::from_str(json)
            .map_err(|e| crate::Error::MalformedEnvelope(e.to_string()))?;
        Ok(parsed.unwrap_or_default())
    }
}

/// Sensitive data wrapper that zeroizes on drop.
///
/// Used for decrypted plaintext so that event data does not linger in freed
/// memory after it has been parsed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}
