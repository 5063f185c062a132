//! Base64 transport encoding.
//!
//! Standard alphabet with padding on output. Decoding accepts padded and
//! unpadded input, since browser `btoa` output is always padded but hand-built
//! records sometimes are not.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use sealcal_common::{Error, Result};

const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as a base64 string.
pub fn encode(bytes: &[u8]) -> String {
    ENGINE.encode(bytes)
}

/// Decode a base64 string.
///
/// # Errors
/// - `MalformedInput` if the string contains characters outside the
///   alphabet or has an impossible length
pub fn decode(text: &str) -> Result<Vec<u8>> {
    ENGINE
        .decode(text)
        .map_err(|e| Error::MalformedInput(format!("Invalid base64: {}", e)))
}
