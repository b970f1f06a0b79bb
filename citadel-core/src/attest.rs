//! Attestation of ledger segments.
//!
//! A manifest binds a contiguous ledger segment to a signature: the segment
//! digest covers every entry hash in seq order, and the signed claims also
//! pin the head hash and seq bounds. Any party holding only the public key
//! can verify a manifest offline, long after the live process is gone.
//!
//! The service surface is read-only apart from signing: public key and
//! fingerprint out, never private key bytes in or out.

use crate::crypto::{PublicKey, Signature, SigningKey};
use crate::error::{Error, Result};
use crate::ledger::AuditEntry;
use crate::wire;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

/// A signed statement about one ledger segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationManifest {
    /// Identifies the ledger this segment came from.
    pub chain_id: String,
    /// Operator-chosen segment label, e.g. an export file name.
    pub segment_name: String,
    pub seq_start: u64,
    pub seq_end: u64,
    pub record_count: u64,
    /// Hash of the last entry in the segment.
    pub head_hash: String,
    /// Lowercase hex SHA-256 over the entry hashes in seq order.
    pub segment_digest: String,
    pub signature: Signature,
    /// Fingerprint of the signing key's public half.
    pub public_key_id: String,
}

/// The signed claims. Field order is the canonical encoding order.
#[derive(Debug, Serialize)]
struct ManifestClaims<'a> {
    head_hash: &'a str,
    segment_digest: &'a str,
    seq_start: u64,
    seq_end: u64,
}

/// Digest over a segment: SHA-256 of each entry's chain hash, in order.
pub fn segment_digest(entries: &[AuditEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Pure signature check over a digest. Side-effect-free and usable by any
/// party holding only the public key.
pub fn verify_digest_signature(
    digest: &[u8],
    signature: &Signature,
    public_key: &PublicKey,
) -> bool {
    public_key.verify(digest, signature).is_ok()
}

/// Holds the attestation keypair and produces manifests on demand.
#[derive(Debug)]
pub struct AttestationService {
    key: SigningKey,
}

impl AttestationService {
    /// Build from an operator-supplied key.
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        Self::new(SigningKey::generate())
    }

    /// The verification half of the keypair.
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Short hex fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        self.public_key().fingerprint()
    }

    /// Digest and sign a ledger segment.
    ///
    /// The segment must be non-empty and contiguous (as returned by
    /// [`crate::ledger::AuditLedger::segment`]).
    pub fn build_manifest(
        &self,
        chain_id: impl Into<String>,
        segment_name: impl Into<String>,
        entries: &[AuditEntry],
    ) -> Result<AttestationManifest> {
        let (first, last) = match (entries.first(), entries.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Error::EmptySegment("manifest over zero entries".into())),
        };

        let digest = segment_digest(entries);
        let claims = ManifestClaims {
            head_hash: &last.hash,
            segment_digest: &digest,
            seq_start: first.seq,
            seq_end: last.seq,
        };
        let signature = self.key.sign(&wire::to_canonical(&claims)?);
        let manifest = AttestationManifest {
            chain_id: chain_id.into(),
            segment_name: segment_name.into(),
            seq_start: first.seq,
            seq_end: last.seq,
            record_count: entries.len() as u64,
            head_hash: last.hash.clone(),
            segment_digest: digest,
            signature,
            public_key_id: self.fingerprint(),
        };
        info!(
            chain_id = %manifest.chain_id,
            seq_start = manifest.seq_start,
            seq_end = manifest.seq_end,
            "attestation manifest built"
        );
        Ok(manifest)
    }
}

/// Verify a manifest's signature under a public key.
///
/// Checks only the signed claims; pairing the manifest against actual ledger
/// entries is [`verify_manifest_against_segment`].
pub fn verify_manifest(manifest: &AttestationManifest, public_key: &PublicKey) -> Result<()> {
    let claims = ManifestClaims {
        head_hash: &manifest.head_hash,
        segment_digest: &manifest.segment_digest,
        seq_start: manifest.seq_start,
        seq_end: manifest.seq_end,
    };
    public_key.verify(&wire::to_canonical(&claims)?, &manifest.signature)
}

/// Verify a manifest against the segment it claims to attest: signature,
/// digest recomputation, bounds, and head hash.
pub fn verify_manifest_against_segment(
    manifest: &AttestationManifest,
    entries: &[AuditEntry],
    public_key: &PublicKey,
) -> Result<()> {
    verify_manifest(manifest, public_key)?;
    let (first, last) = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(Error::EmptySegment("verification over zero entries".into())),
    };
    if first.seq != manifest.seq_start
        || last.seq != manifest.seq_end
        || entries.len() as u64 != manifest.record_count
    {
        return Err(Error::SignatureInvalid(
            "segment bounds do not match manifest".into(),
        ));
    }
    if segment_digest(entries) != manifest.segment_digest {
        return Err(Error::SignatureInvalid(
            "segment digest does not match manifest".into(),
        ));
    }
    if last.hash != manifest.head_hash {
        return Err(Error::SignatureInvalid(
            "segment head hash does not match manifest".into(),
        ));
    }
    Ok(())
}
