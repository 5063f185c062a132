//! The encrypted envelope: one sealed snapshot of the event collection.
//!
//! An envelope is `{salt, nonce, ciphertext}`. The salt feeds key derivation,
//! the nonce feeds AES-GCM, and both are generated fresh for every seal, so
//! sealing the same plaintext twice yields unrelated envelopes.

use std::fmt;

use crate::aead::{self, TAG_SIZE};
use crate::codec;
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{Nonce, Password, Salt, SessionKey};
use sealcal_common::{EnvelopeRecord, Error, Result};

/// Envelope scheme version written by this client.
pub const ENVELOPE_VERSION: u32 = 1;

/// Decoded encrypted envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub salt: Salt,
    pub nonce: Nonce,
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Seal plaintext under a password with fresh salt and nonce.
    ///
    /// Runs the full key derivation; callers on an async runtime should do
    /// this off the executor thread.
    pub fn seal(plaintext: &[u8], password: &Password) -> Result<Self> {
        let salt = Salt::generate();
        let key = derive_key(password.as_bytes(), salt.as_bytes(), &KdfParams::V1)?;
        Self::seal_with_key(plaintext, salt, &key)
    }

    /// Seal plaintext with a key already derived from `salt`.
    ///
    /// A fresh nonce is generated. The caller must not pass a key derived
    /// from a salt that has already been used for another envelope.
    pub fn seal_with_key(plaintext: &[u8], salt: Salt, key: &SessionKey) -> Result<Self> {
        let nonce = Nonce::generate();
        let ciphertext = aead::encrypt(key, &nonce, plaintext)?;
        Ok(Self {
            salt,
            nonce,
            ciphertext,
        })
    }

    /// Derive the key for this envelope's salt.
    pub fn derive_key(&self, password: &Password) -> Result<SessionKey> {
        derive_key(password.as_bytes(), self.salt.as_bytes(), &KdfParams::V1)
    }

    /// Open the envelope with a password.
    ///
    /// # Errors
    /// - `AuthenticationFailure` for a wrong password or altered envelope
    pub fn open(&self, password: &Password) -> Result<Vec<u8>> {
        let key = self.derive_key(password)?;
        self.open_with_key(&key)
    }

    /// Open the envelope with a key derived from its salt.
    pub fn open_with_key(&self, key: &SessionKey) -> Result<Vec<u8>> {
        aead::decrypt(key, &self.nonce, &self.ciphertext)
    }

    /// Encode into the wire record.
    pub fn to_record(&self) -> EnvelopeRecord {
        EnvelopeRecord::new(
            codec::encode(self.salt.as_bytes()),
            codec::encode(self.nonce.as_bytes()),
            codec::encode(&self.ciphertext),
            ENVELOPE_VERSION,
        )
    }

    /// Decode the wire record.
    ///
    /// # Errors
    /// - `UnsupportedVersion` if the record names a scheme other than 1
    /// - `MalformedEnvelope` if a field is missing, is not base64, or has
    ///   the wrong length
    pub fn from_record(record: &EnvelopeRecord) -> Result<Self> {
        let version = record.v.unwrap_or(ENVELOPE_VERSION);
        KdfParams::for_version(version)?;

        let salt = decode_field("salt", record.salt.as_deref())?;
        let nonce = decode_field("iv", record.iv.as_deref())?;
        let ciphertext = decode_field("ciphertext", record.ciphertext.as_deref())?;

        let salt = Salt::from_slice(&salt)
            .map_err(|e| Error::MalformedEnvelope(format!("salt: {}", e)))?;
        let nonce = Nonce::from_slice(&nonce)
            .map_err(|e| Error::MalformedEnvelope(format!("iv: {}", e)))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::MalformedEnvelope(format!(
                "ciphertext: expected at least {} bytes, got {}",
                TAG_SIZE,
                ciphertext.len()
            )));
        }

        Ok(Self {
            salt,
            nonce,
            ciphertext,
        })
    }
}

impl fmt::Debug for EncryptedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedEnvelope")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Encode an envelope into its wire record.
pub fn serialize(envelope: &EncryptedEnvelope) -> EnvelopeRecord {
    envelope.to_record()
}

/// Decode a wire record into an envelope.
pub fn deserialize(record: &EnvelopeRecord) -> Result<EncryptedEnvelope> {
    EncryptedEnvelope::from_record(record)
}

fn decode_field(name: &str, value: Option<&str>) -> Result<Vec<u8>> {
    let value =
        value.ok_or_else(|| Error::MalformedEnvelope(format!("missing field `{}`", name)))?;
    codec::decode(value).map_err(|e| Error::MalformedEnvelope(format!("{}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KEY_LENGTH, NONCE_LENGTH, SALT_LENGTH};
    use proptest::prelude::*;

    fn password(p: &str) -> Password {
        Password::new(p).unwrap()
    }

    fn sample() -> EncryptedEnvelope {
        let key = SessionKey::from_bytes([9u8; KEY_LENGTH]);
        EncryptedEnvelope::seal_with_key(b"[]", Salt::from_bytes([1u8; SALT_LENGTH]), &key)
            .unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let pw = password("correct-horse");
        let envelope = EncryptedEnvelope::seal(b"[{\"id\":\"1\"}]", &pw).unwrap();

        assert_eq!(envelope.open(&pw).unwrap(), b"[{\"id\":\"1\"}]");
    }

    #[test]
    fn test_wrong_password_fails() {
        let envelope = EncryptedEnvelope::seal(b"secret", &password("A")).unwrap();

        let result = envelope.open(&password("B"));
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_fresh_salt_and_nonce() {
        let pw = password("same");
        let a = EncryptedEnvelope::seal(b"same plaintext", &pw).unwrap();
        let b = EncryptedEnvelope::seal(b"same plaintext", &pw).unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_multi_kilobyte_plaintext() {
        let pw = password("long");
        let plaintext = "x".repeat(64 * 1024);
        let envelope = EncryptedEnvelope::seal(plaintext.as_bytes(), &pw).unwrap();

        assert_eq!(envelope.open(&pw).unwrap(), plaintext.as_bytes());
    }

    #[test]
    fn test_record_roundtrip() {
        let envelope = sample();
        let record = serialize(&envelope);

        assert_eq!(record.v, Some(ENVELOPE_VERSION));
        assert_eq!(deserialize(&record).unwrap(), envelope);
    }

    #[test]
    fn test_unversioned_record_accepted() {
        let envelope = sample();
        let mut record = serialize(&envelope);
        record.v = None;

        assert_eq!(deserialize(&record).unwrap(), envelope);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut record = serialize(&sample());
        record.v = Some(2);

        assert!(matches!(
            deserialize(&record),
            Err(Error::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let mut record = serialize(&sample());
        record.iv = None;

        let err = deserialize(&record).unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(ref m) if m.contains("iv")));
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        let mut record = serialize(&sample());
        record.salt = Some("not base64!".to_string());

        assert!(matches!(
            deserialize(&record),
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_wrong_lengths_are_malformed() {
        let mut record = serialize(&sample());
        record.iv = Some(codec::encode(&[0u8; 16]));
        assert!(matches!(
            deserialize(&record),
            Err(Error::MalformedEnvelope(_))
        ));

        let mut record = serialize(&sample());
        record.ciphertext = Some(codec::encode(&[0u8; 4]));
        assert!(matches!(
            deserialize(&record),
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_debug_hides_bytes() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("ciphertext_len"));
        assert!(!rendered.contains("salt"));
    }

    proptest! {
        #[test]
        fn prop_record_roundtrip(
            salt in any::<[u8; SALT_LENGTH]>(),
            nonce in any::<[u8; NONCE_LENGTH]>(),
            ciphertext in proptest::collection::vec(any::<u8>(), TAG_SIZE..4096),
        ) {
            let envelope = EncryptedEnvelope {
                salt: Salt::from_bytes(salt),
                nonce: Nonce::from_bytes(nonce),
                ciphertext,
            };
            let json = serialize(&envelope).to_json().unwrap();
            let record = EnvelopeRecord::from_json(&json).unwrap();
            prop_assert_eq!(deserialize(&record).unwrap(), envelope);
        }
    }

    proptest! {
        // Each case runs two full 100k-round derivations.
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_seal_open(
            pw in "[ -~]{1,32}",
            other in "[ -~]{1,32}",
            plaintext in proptest::collection::vec(any::<u8>(), 0..4096),
        ) {
            let pw = Password::new(pw).unwrap();
            let envelope = EncryptedEnvelope::seal(&plaintext, &pw).unwrap();
            prop_assert_eq!(envelope.open(&pw).unwrap(), plaintext);

            if other.as_bytes() != pw.as_bytes() {
                let other = Password::new(other).unwrap();
                prop_assert!(matches!(envelope.open(&other), Err(Error::AuthenticationFailure)));
            }
        }
    }
}
