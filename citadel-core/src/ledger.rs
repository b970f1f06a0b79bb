//! Append-only, hash-chained audit ledger.
//!
//! Every consequential decision is appended as an [`AuditEntry`] whose hash
//! is a pure function of the previous entry's hash and its own content:
//!
//! ```text
//! hash(i) = SHA256( prev_hash_hex || canonical(payload) || seq_be_bytes )
//! ```
//!
//! Canonical payload bytes are fixed by [`crate::wire`]. Entries are ordered
//! by a single monotonic `seq` counter that is never reused outside the
//! test/reset path.
//!
//! Undo never mutates: `rollback` appends a new entry referencing the
//! original, so the original's bytes — and therefore the chain — stay valid.
//! "Fixing" an entry in place would break externally verifiable attestation.

use crate::error::{Error, Result};
use crate::policy::Decision;
use crate::wire;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Current audit record version. Entries imported from older shells carry a
/// lower version and are exempt from payload re-verification (their payload
/// encoding predates the canonical form) but still participate in linkage.
pub const AUDIT_VERSION: u16 = 2;

/// Prefix for audit entry ids.
pub const ENTRY_ID_PREFIX: &str = "aud_";

fn genesis_hash() -> String {
    hex::encode([0u8; 32])
}

fn next_entry_id() -> String {
    format!("{ENTRY_ID_PREFIX}{}", Uuid::new_v4().simple())
}

/// What an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A decision that was (or would be) acted on.
    Execution,
    /// Reversal of a prior execution entry, by reference.
    Rollback,
}

/// The payload of an execution entry: the decision plus what it was about.
/// Field order is the canonical encoding order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub capability_id: String,
    pub action: String,
    pub decision: Decision,
}

/// The payload of a rollback entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// Id of the execution entry being reversed.
    pub references: String,
    pub reason: String,
    pub correlation_id: String,
}

/// One link in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub seq: u64,
    pub kind: EntryKind,
    /// Set on rollback entries only: the id of the reversed entry.
    pub references: Option<String>,
    /// Canonical payload bytes ([`AuditRecord`] or [`RollbackRecord`]).
    #[serde(with = "serde_bytes_base64")]
    pub payload: Vec<u8>,
    /// Lowercase hex SHA-256 of `payload`.
    pub payload_hash: String,
    pub prev_hash: String,
    /// Chain hash; see module docs for the formula.
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub audit_version: u16,
}

impl AuditEntry {
    /// Decode the payload of an execution entry.
    pub fn record(&self) -> Result<AuditRecord> {
        wire::from_canonical(&self.payload)
    }

    /// Decode the payload of a rollback entry.
    pub fn rollback_record(&self) -> Result<RollbackRecord> {
        wire::from_canonical(&self.payload)
    }
}

// Payload bytes cross the host boundary as base64 strings in every encoding.
mod serde_bytes_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

fn chain_hash(prev_hash: &str, payload: &[u8], seq: u64) -> String {
    let seq_bytes = seq.to_be_bytes();
    hex::encode(wire::sha256_concat([
        prev_hash.as_bytes(),
        payload,
        seq_bytes.as_slice(),
    ]))
}

/// The append-only ledger. Single-writer; callers sharing it wrap it in a
/// lock. The caller owns durable storage of entries; this type defines the
/// shape and the chaining rule.
#[derive(Debug, Default)]
pub struct AuditLedger {
    entries: Vec<AuditEntry>,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Hash of the newest entry, or the genesis hash for an empty ledger.
    pub fn head_hash(&self) -> String {
        self.entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(genesis_hash)
    }

    pub fn get(&self, id: &str) -> Option<&AuditEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_seq(&self, seq: u64) -> Option<&AuditEntry> {
        self.entries.get(seq as usize)
    }

    /// Append an execution entry for a decision.
    pub fn append(&mut self, record: &AuditRecord) -> Result<&AuditEntry> {
        self.append_at(record, Utc::now())
    }

    /// [`append`](Self::append) with an explicit clock.
    pub fn append_at(&mut self, record: &AuditRecord, now: DateTime<Utc>) -> Result<&AuditEntry> {
        let payload = wire::to_canonical(record)?;
        Ok(self.push(EntryKind::Execution, None, payload, AUDIT_VERSION, now))
    }

    /// Import an entry carrying an older audit version, preserving linkage.
    /// Migration path for ledgers written by earlier shells.
    pub fn append_imported(
        &mut self,
        payload: Vec<u8>,
        audit_version: u16,
        now: DateTime<Utc>,
    ) -> &AuditEntry {
        self.push(EntryKind::Execution, None, payload, audit_version, now)
    }

    /// Reverse a prior execution entry by appending a rollback entry.
    ///
    /// Fails with `AlreadyRolledBack` if a rollback already references the
    /// target, with `RollbackTargetNotFound` for an unknown id, and with
    /// `RollbackTargetInvalid` when the target is itself a rollback. The
    /// original entry's bytes are never altered.
    pub fn rollback(
        &mut self,
        entry_id: &str,
        reason: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Result<&AuditEntry> {
        self.rollback_at(entry_id, reason, correlation_id, Utc::now())
    }

    /// [`rollback`](Self::rollback) with an explicit clock.
    pub fn rollback_at(
        &mut self,
        entry_id: &str,
        reason: impl Into<String>,
        correlation_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<&AuditEntry> {
        let target = self
            .get(entry_id)
            .ok_or_else(|| Error::RollbackTargetNotFound(entry_id.to_string()))?;
        if target.kind != EntryKind::Execution {
            return Err(Error::RollbackTargetInvalid(entry_id.to_string()));
        }
        let already = self.entries.iter().any(|e| {
            e.kind == EntryKind::Rollback && e.references.as_deref() == Some(entry_id)
        });
        if already {
            return Err(Error::AlreadyRolledBack(entry_id.to_string()));
        }

        let record = RollbackRecord {
            references: entry_id.to_string(),
            reason: reason.into(),
            correlation_id: correlation_id.into(),
        };
        let payload = wire::to_canonical(&record)?;
        info!(entry_id, "rollback entry appended");
        Ok(self.push(
            EntryKind::Rollback,
            Some(entry_id.to_string()),
            payload,
            AUDIT_VERSION,
            now,
        ))
    }

    fn push(
        &mut self,
        kind: EntryKind,
        references: Option<String>,
        payload: Vec<u8>,
        audit_version: u16,
        now: DateTime<Utc>,
    ) -> &AuditEntry {
        let seq = self.entries.len() as u64;
        let prev_hash = self.head_hash();
        let payload_hash = wire::sha256_hex(&payload);
        let hash = chain_hash(&prev_hash, &payload, seq);
        debug!(seq, ?kind, %hash, "audit entry appended");
        let idx = self.entries.len();
        self.entries.push(AuditEntry {
            id: next_entry_id(),
            seq,
            kind,
            references,
            payload,
            payload_hash,
            prev_hash,
            hash,
            timestamp: now,
            audit_version,
        });
        &self.entries[idx]
    }

    /// Recompute every hash across the full sequence.
    ///
    /// Returns the first mismatching entry via `ChainVerificationFailed`.
    /// Legacy-version entries are exempt from the payload-hash content check
    /// but their chain linkage is still verified.
    pub fn verify_chain(&self) -> Result<()> {
        let mut prev_hash = genesis_hash();
        for entry in &self.entries {
            if entry.prev_hash != prev_hash {
                error!(seq = entry.seq, "audit chain linkage mismatch");
                return Err(Error::ChainVerificationFailed {
                    seq: entry.seq,
                    reason: "prev_hash does not match predecessor".into(),
                });
            }
            if entry.audit_version >= AUDIT_VERSION
                && wire::sha256_hex(&entry.payload) != entry.payload_hash
            {
                error!(seq = entry.seq, "audit payload hash mismatch");
                return Err(Error::ChainVerificationFailed {
                    seq: entry.seq,
                    reason: "payload hash does not match payload".into(),
                });
            }
            let expected = chain_hash(&entry.prev_hash, &entry.payload, entry.seq);
            if entry.hash != expected {
                error!(seq = entry.seq, "audit chain hash mismatch");
                return Err(Error::ChainVerificationFailed {
                    seq: entry.seq,
                    reason: "entry hash does not match recomputation".into(),
                });
            }
            prev_hash = entry.hash.clone();
        }
        Ok(())
    }

    /// A contiguous segment `[from_seq, to_seq]` for attestation.
    pub fn segment(&self, from_seq: u64, to_seq: u64) -> Result<&[AuditEntry]> {
        if from_seq > to_seq || to_seq >= self.entries.len() as u64 {
            return Err(Error::EmptySegment(format!(
                "seq range {from_seq}..={to_seq} outside ledger of {} entries",
                self.entries.len()
            )));
        }
        Ok(&self.entries[from_seq as usize..=to_seq as usize])
    }

    /// Discard all entries and restart seq at zero. Test/reset path only;
    /// a production ledger is never truncated.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Test support: replace an entry wholesale, bypassing append-only
    /// enforcement, to simulate storage corruption.
    #[doc(hidden)]
    pub fn corrupt_entry_for_test(&mut self, seq: u64, entry: AuditEntry) {
        self.entries[seq as usize] = entry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::policy::{Decision, Outcome};

    fn t0() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    fn record(capability_id: &str, action: &str) -> AuditRecord {
        AuditRecord {
            capability_id: capability_id.into(),
            action: action.into(),
            decision: Decision {
                outcome: Outcome::Allow,
                reason_chain: vec!["allowed".into()],
                policy_key: format!("{capability_id}:{action}"),
                error_code: None,
                correlation_id: "cor_test".into(),
            },
        }
    }

    #[test]
    fn test_append_links_hashes() {
        let mut ledger = AuditLedger::new();
        ledger.append_at(&record("a", "write"), t0()).unwrap();
        ledger.append_at(&record("a", "read"), t0()).unwrap();

        let entries = ledger.entries();
        assert_eq!(entries[0].seq, 0);
        assert_eq!(entries[0].prev_hash, genesis_hash());
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert_eq!(ledger.head_hash(), entries[1].hash);
        ledger.verify_chain().unwrap();
    }

    #[test]
    fn test_identical_records_hash_differently_by_seq() {
        let mut ledger = AuditLedger::new();
        let r = record("a", "write");
        ledger.append_at(&r, t0()).unwrap();
        ledger.append_at(&r, t0()).unwrap();
        let entries = ledger.entries();
        assert_eq!(entries[0].payload_hash, entries[1].payload_hash);
        assert_ne!(entries[0].hash, entries[1].hash);
    }

    #[test]
    fn test_corruption_detected_at_correct_seq() {
        let mut ledger = AuditLedger::new();
        for i in 0..5 {
            ledger.append_at(&record("a", &format!("op{i}")), t0()).unwrap();
        }
        ledger.verify_chain().unwrap();

        let mut tampered = ledger.entries()[2].clone();
        tampered.payload[0] ^= 0xff;
        ledger.corrupt_entry_for_test(2, tampered);

        let err = ledger.verify_chain().unwrap_err();
        match err {
            Error::ChainVerificationFailed { seq, .. } => assert_eq!(seq, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.code(), ErrorCode::ChainVerificationFailed);
    }

    #[test]
    fn test_legacy_entries_skip_content_check_but_keep_linkage() {
        let mut ledger = AuditLedger::new();
        ledger.append_imported(b"v1-opaque-bytes".to_vec(), 1, t0());
        ledger.append_at(&record("a", "write"), t0()).unwrap();

        // Tamper with the legacy payload hash field only: exempt from the
        // content check, so verification still passes.
        let mut legacy = ledger.entries()[0].clone();
        legacy.payload_hash = "0".repeat(64);
        ledger.corrupt_entry_for_test(0, legacy);
        ledger.verify_chain().unwrap();

        // Tampering with the legacy payload itself still breaks the chain
        // hash, which legacy entries are not exempt from.
        let mut legacy = ledger.entries()[0].clone();
        legacy.payload[0] ^= 0xff;
        ledger.corrupt_entry_for_test(0, legacy);
        let err = ledger.verify_chain().unwrap_err();
        assert!(matches!(err, Error::ChainVerificationFailed { seq: 0, .. }));
    }

    #[test]
    fn test_rollback_appends_and_preserves_original() {
        let mut ledger = AuditLedger::new();
        ledger.append_at(&record("a", "write"), t0()).unwrap();
        let target_id = ledger.entries()[0].id.clone();
        let original_hash = ledger.entries()[0].hash.clone();

        let rb = ledger
            .rollback_at(&target_id, "user undo", "cor_undo", t0())
            .unwrap();
        assert_eq!(rb.kind, EntryKind::Rollback);
        assert_eq!(rb.references.as_deref(), Some(target_id.as_str()));
        assert_eq!(rb.seq, 1);

        assert_eq!(ledger.entries()[0].hash, original_hash);
        ledger.verify_chain().unwrap();

        let decoded = ledger.entries()[1].rollback_record().unwrap();
        assert_eq!(decoded.references, target_id);
    }

    #[test]
    fn test_second_rollback_rejected() {
        let mut ledger = AuditLedger::new();
        ledger.append_at(&record("a", "write"), t0()).unwrap();
        let target_id = ledger.entries()[0].id.clone();

        ledger
            .rollback_at(&target_id, "undo", "cor_1", t0())
            .unwrap();
        let err = ledger
            .rollback_at(&target_id, "undo again", "cor_2", t0())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRolledBack(_)));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_rollback_of_rollback_rejected() {
        let mut ledger = AuditLedger::new();
        ledger.append_at(&record("a", "write"), t0()).unwrap();
        let target_id = ledger.entries()[0].id.clone();
        ledger
            .rollback_at(&target_id, "undo", "cor_1", t0())
            .unwrap();
        let rollback_id = ledger.entries()[1].id.clone();

        let err = ledger
            .rollback_at(&rollback_id, "re-undo", "cor_2", t0())
            .unwrap_err();
        assert!(matches!(err, Error::RollbackTargetInvalid(_)));
    }

    #[test]
    fn test_rollback_unknown_target() {
        let mut ledger = AuditLedger::new();
        let err = ledger
            .rollback_at("aud_missing", "undo", "cor_1", t0())
            .unwrap_err();
        assert!(matches!(err, Error::RollbackTargetNotFound(_)));
    }

    #[test]
    fn test_segment_selection() {
        let mut ledger = AuditLedger::new();
        for i in 0..4 {
            ledger.append_at(&record("a", &format!("op{i}")), t0()).unwrap();
        }
        let segment = ledger.segment(1, 2).unwrap();
        assert_eq!(segment.len(), 2);
        assert_eq!(segment[0].seq, 1);

        assert!(ledger.segment(2, 1).is_err());
        assert!(ledger.segment(0, 9).is_err());
    }

    #[test]
    fn test_reset_restarts_seq() {
        let mut ledger = AuditLedger::new();
        ledger.append_at(&record("a", "write"), t0()).unwrap();
        ledger.reset();
        assert!(ledger.is_empty());
        let entry = ledger.append_at(&record("a", "write"), t0()).unwrap();
        assert_eq!(entry.seq, 0);
    }

    #[test]
    fn test_entry_roundtrips_through_host_encoding() {
        let mut ledger = AuditLedger::new();
        ledger.append_at(&record("a", "write"), t0()).unwrap();
        let entry = &ledger.entries()[0];
        let encoded = crate::wire::encode_base64(entry).unwrap();
        let back: AuditEntry = crate::wire::decode_base64(&encoded).unwrap();
        assert_eq!(&back, entry);
        assert_eq!(back.record().unwrap().capability_id, "a");
    }
}
