//! Error types for Citadel.
//!
//! Two layers, following the wire contract the shell exposes to callers:
//! [`ErrorCode`] is the closed set of canonical codes surfaced to the host
//! (stable numbers, kebab-case names), and [`Error`] carries the context a
//! Rust caller needs.
//!
//! Policy-evaluation failures are NOT errors: they come back as typed
//! `Decision` values so the shell can render a user-facing reason. `Error` is
//! reserved for lifecycle misuse (illegal transition, duplicate id) and for
//! integrity failures (broken chain, bad signature), which require operator
//! attention and are never silently repaired.

use crate::capability::{CapabilityState, LifecycleAction};
use thiserror::Error;

/// Result type alias for Citadel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical error codes surfaced across the host boundary.
///
/// Code ranges:
/// - 1000-1099: Capability lifecycle errors
/// - 1100-1199: Policy rule errors
/// - 1200-1299: Step-up errors
/// - 1300-1399: Ledger errors
/// - 1400-1499: Attestation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u16)]
pub enum ErrorCode {
    // Capability lifecycle errors (1000-1099)
    CapabilityNotFound = 1000,
    CapabilityInvalidState = 1001,
    CapabilityDenied = 1002,
    DuplicateCapability = 1003,

    // Policy rule errors (1100-1199)
    RateLimited = 1100,
    QuotaExceeded = 1101,
    SchemeViolation = 1102,

    // Step-up errors (1200-1299)
    StepUpRequired = 1200,

    // Ledger errors (1300-1399)
    AlreadyRolledBack = 1300,
    ChainVerificationFailed = 1301,
    RollbackTargetNotFound = 1302,
    RollbackTargetInvalid = 1303,

    // Attestation errors (1400-1499)
    SignatureInvalid = 1400,
    CryptoError = 1401,
    SerializationError = 1402,
    EmptySegment = 1403,
}

impl ErrorCode {
    /// Get the numeric code value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Get machine-readable name (kebab-case).
    ///
    /// This is the canonical string representation persisted in audit
    /// records and shown in host error surfaces.
    pub fn name(self) -> &'static str {
        match self {
            Self::CapabilityNotFound => "capability-not-found",
            Self::CapabilityInvalidState => "capability-invalid-state",
            Self::CapabilityDenied => "capability-denied",
            Self::DuplicateCapability => "duplicate-capability",
            Self::RateLimited => "rate-limited",
            Self::QuotaExceeded => "quota-exceeded",
            Self::SchemeViolation => "scheme-violation",
            Self::StepUpRequired => "step-up-required",
            Self::AlreadyRolledBack => "already-rolled-back",
            Self::ChainVerificationFailed => "chain-verification-failed",
            Self::RollbackTargetNotFound => "rollback-target-not-found",
            Self::RollbackTargetInvalid => "rollback-target-invalid",
            Self::SignatureInvalid => "signature-invalid",
            Self::CryptoError => "crypto-error",
            Self::SerializationError => "serialization-error",
            Self::EmptySegment => "empty-segment",
        }
    }

    /// Get human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::CapabilityNotFound => "Capability is not registered",
            Self::CapabilityInvalidState => "Capability state does not permit the action",
            Self::CapabilityDenied => "Capability does not hold the required permission",
            Self::DuplicateCapability => "Capability id is already registered",
            Self::RateLimited => "Sliding-window rate limit exceeded",
            Self::QuotaExceeded => "Payload exceeds the quota ceiling",
            Self::SchemeViolation => "A static scheme rule forbids the action",
            Self::StepUpRequired => "Sensitive action requires a verified step-up session",
            Self::AlreadyRolledBack => "A rollback entry already references this entry",
            Self::ChainVerificationFailed => "Audit chain hash verification failed",
            Self::RollbackTargetNotFound => "Rollback target entry does not exist",
            Self::RollbackTargetInvalid => "Rollback target is not an execution entry",
            Self::SignatureInvalid => "Signature verification failed",
            Self::CryptoError => "Cryptographic operation failed",
            Self::SerializationError => "Canonical serialization failed",
            Self::EmptySegment => "Ledger segment contains no entries",
        }
    }

    /// Whether a caller may retry the failed action without intervention.
    ///
    /// Rate-limit and step-up outcomes are recoverable by design; lifecycle
    /// and integrity failures are not.
    pub fn retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::StepUpRequired)
    }
}

/// Errors that can occur in Citadel operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Capability Lifecycle Errors
    // =========================================================================
    /// Capability id is not registered.
    #[error("capability not found: {0}")]
    CapabilityNotFound(String),

    /// Registration attempted with an id that already exists.
    #[error("capability already registered: {0}")]
    DuplicateCapability(String),

    /// Requested lifecycle action is not legal from the current state.
    /// The record is left unchanged.
    #[error("illegal transition for '{id}': {action} from {from}")]
    IllegalTransition {
        id: String,
        from: CapabilityState,
        action: LifecycleAction,
    },

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    /// A rollback entry already references the target entry.
    #[error("entry already rolled back: {0}")]
    AlreadyRolledBack(String),

    /// Rollback target entry does not exist.
    #[error("rollback target not found: {0}")]
    RollbackTargetNotFound(String),

    /// Rollback target is itself a rollback entry.
    #[error("rollback target is not an execution entry: {0}")]
    RollbackTargetInvalid(String),

    /// Chain verification failed. `seq` is the first mismatching entry.
    #[error("chain verification failed at seq {seq}: {reason}")]
    ChainVerificationFailed { seq: u64, reason: String },

    /// Requested segment bounds do not select any entries.
    #[error("empty ledger segment: {0}")]
    EmptySegment(String),

    // =========================================================================
    // Attestation Errors
    // =========================================================================
    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Cryptographic operation failed.
    #[error("cryptographic error: {0}")]
    CryptoError(String),

    /// Canonical serialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization of stored bytes failed.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Decoded record exceeds the size guard.
    #[error("record size {size} bytes exceeds maximum {max} bytes")]
    RecordTooLarge { size: usize, max: usize },
}

impl Error {
    /// Map to the canonical code surfaced across the host boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CapabilityNotFound(_) => ErrorCode::CapabilityNotFound,
            Self::DuplicateCapability(_) => ErrorCode::DuplicateCapability,
            Self::IllegalTransition { .. } => ErrorCode::CapabilityInvalidState,
            Self::AlreadyRolledBack(_) => ErrorCode::AlreadyRolledBack,
            Self::RollbackTargetNotFound(_) => ErrorCode::RollbackTargetNotFound,
            Self::RollbackTargetInvalid(_) => ErrorCode::RollbackTargetInvalid,
            Self::ChainVerificationFailed { .. } => ErrorCode::ChainVerificationFailed,
            Self::EmptySegment(_) => ErrorCode::EmptySegment,
            Self::SignatureInvalid(_) => ErrorCode::SignatureInvalid,
            Self::CryptoError(_) => ErrorCode::CryptoError,
            Self::SerializationError(_)
            | Self::DeserializationError(_)
            | Self::RecordTooLarge { .. } => ErrorCode::SerializationError,
        }
    }
}

impl<E: std::fmt::Debug> From<ciborium::ser::Error<E>> for Error {
    fn from(e: ciborium::ser::Error<E>) -> Self {
        Error::SerializationError(format!("{e:?}"))
    }
}

impl<E: std::fmt::Debug> From<ciborium::de::Error<E>> for Error {
    fn from(e: ciborium::de::Error<E>) -> Self {
        Error::DeserializationError(format!("{e:?}"))
    }
}
