//! Cryptographic primitives for attestation.
//!
//! Ed25519 with a context string (`citadel-attest-v1`) prefixed to every
//! signed message, so a signature produced here can never validate in another
//! protocol. Private key material is wrapped in `Secret`: zeroized on drop,
//! redacted in Debug, and carrying no Serialize impl, so it cannot cross a
//! serialization boundary by accident.

use crate::error::{Error, Result};
use crate::SIGNATURE_CONTEXT;
use base64::Engine;
use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey as Ed25519SigningKey, Verifier, VerifyingKey,
};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use secrecy::{CloneableSecret, ExposeSecret, Secret, Zeroize};
use serde::{Deserialize, Serialize};

/// A signing key for attesting ledger segments.
#[derive(Clone)]
pub struct SigningKey {
    inner: Secret<KeyWrapper>,
}

// ed25519-dalek 2.x zeroizes on Drop; the wrapper only exists so Secret's
// bounds are satisfied.
struct KeyWrapper(Ed25519SigningKey);

impl Clone for KeyWrapper {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Zeroize for KeyWrapper {
    fn zeroize(&mut self) {
        // No-op: the inner key zeroizes itself on Drop.
    }
}

impl CloneableSecret for KeyWrapper {}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("inner", &"***SECRET***")
            .finish()
    }
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        Self::wrap(Ed25519SigningKey::generate(&mut OsRng))
    }

    /// Create a signing key from secret key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::wrap(Ed25519SigningKey::from_bytes(bytes))
    }

    /// Create a signing key from a PKCS#8 PEM string.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = Ed25519SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::CryptoError(format!("invalid PEM: {e}")))?;
        Ok(Self::wrap(key))
    }

    fn wrap(key: Ed25519SigningKey) -> Self {
        Self {
            inner: Secret::new(KeyWrapper(key)),
        }
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.inner.expose_secret().0.verifying_key(),
        }
    }

    /// Sign a message. The signed bytes are `SIGNATURE_CONTEXT || message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let prefixed = prefix_message(message);
        Signature {
            inner: self.inner.expose_secret().0.sign(&prefixed),
        }
    }

    /// Secret key bytes, for operator-controlled key storage only.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.inner.expose_secret().0.to_bytes()
    }

    /// Export as PKCS#8 PEM, for operator-controlled key storage only.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .expose_secret()
            .0
            .to_pkcs8_pem(LineEnding::LF)
            .map(|s| s.to_string())
            .map_err(|e| Error::CryptoError(format!("pem export failed: {e}")))
    }
}

fn prefix_message(message: &[u8]) -> Vec<u8> {
    let mut prefixed = Vec::with_capacity(SIGNATURE_CONTEXT.len() + message.len());
    prefixed.extend_from_slice(SIGNATURE_CONTEXT);
    prefixed.extend_from_slice(message);
    prefixed
}

/// A public key for verifying attestation signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let key = VerifyingKey::from_bytes(bytes).map_err(|e| Error::CryptoError(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Short hex fingerprint (first 8 bytes), used as the manifest's
    /// `public_key_id` and in audit surfaces where the full key is noise.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.to_bytes()[..8])
    }

    /// Verify a context-prefixed signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let prefixed = prefix_message(message);
        self.key
            .verify(&prefixed, &signature.inner)
            .map_err(|e| Error::SignatureInvalid(e.to_string()))
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = VerifyingKey::from_public_key_pem(pem)
            .map_err(|e| Error::CryptoError(format!("invalid PEM: {e}")))?;
        Ok(Self { key })
    }

    pub fn to_pem(&self) -> Result<String> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map(|s| s.to_string())
            .map_err(|e| Error::CryptoError(format!("pem export failed: {e}")))
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.to_bytes()),
        )
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&s)
            .map_err(serde::de::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid public key length"))?;
        PublicKey::from_bytes(&arr).map_err(serde::de::Error::custom)
    }
}

/// An Ed25519 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    inner: DalekSignature,
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: DalekSignature::from_bytes(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.to_bytes()),
        )
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&s)
            .map_err(serde::de::Error::custom)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid signature length"))?;
        Ok(Signature::from_bytes(&arr))
    }
}
