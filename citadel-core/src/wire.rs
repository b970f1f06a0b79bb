//! Canonical byte encoding and digests.
//!
//! Chain verifiability depends entirely on a deterministic pre-hash encoding,
//! so it is fixed here: CBOR (RFC 8949) via `ciborium`, encoding record
//! structs whose field order is their declaration order. The same bytes feed
//! both the ledger's hash linkage and attestation signatures.
//!
//! Hex digests are lowercase SHA-256. Base64 (URL-safe, unpadded) is used
//! where entries cross the host boundary as strings.

use crate::error::{Error, Result};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Maximum decoded record size (64 KB). Audit payloads are small; the guard
/// protects against memory exhaustion from corrupted storage.
pub const MAX_RECORD_SIZE: usize = 64 * 1024;

/// Encode a record to its canonical CBOR bytes.
pub fn to_canonical(value: &impl Serialize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Decode a record from canonical CBOR bytes.
///
/// Returns `RecordTooLarge` if the input exceeds [`MAX_RECORD_SIZE`].
pub fn from_canonical<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    if data.len() > MAX_RECORD_SIZE {
        return Err(Error::RecordTooLarge {
            size: data.len(),
            max: MAX_RECORD_SIZE,
        });
    }
    Ok(ciborium::de::from_reader(data)?)
}

/// Lowercase hex SHA-256 of the input bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA-256 over a sequence of byte slices, fed in order.
pub fn sha256_concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Encode a record to a base64 string for string-keyed host storage.
pub fn encode_base64(value: &impl Serialize) -> Result<String> {
    let bytes = to_canonical(value)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode a record from a base64 string.
pub fn decode_base64<T: DeserializeOwned>(s: &str) -> Result<T> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| Error::DeserializationError(e.to_string()))?;
    from_canonical(&bytes)
}
