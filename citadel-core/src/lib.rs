//! # Citadel Core
//!
//! Authorization and audit kernel for the Citadel shell — a browser-hosted,
//! multi-tenant "operating system". This crate decides whether a registered
//! capability (an installed app or plugin) may perform a requested action,
//! enforces sandbox boundaries and rate limits, keeps a tamper-evident
//! hash-chained record of every consequential decision, and gates sensitive
//! actions behind a time-boxed re-authentication challenge.
//!
//! The surrounding product — rendering, dashboards, persistence transport —
//! lives outside this crate: it supplies decision inputs and durably stores
//! this crate's outputs.
//!
//! ## Components
//!
//! - [`registry::CapabilityRegistry`]: lifecycle state machine and record
//!   store per capability
//! - [`rate::RateLimiter`]: sliding-window admission counter
//! - [`stepup::StepUpManager`]: single time-boxed re-authentication session
//! - [`policy::PolicyEngine`]: ordered rule chain producing a [`policy::Decision`]
//! - [`ledger::AuditLedger`]: append-only, hash-chained decision record
//! - [`attest::AttestationService`]: Ed25519 signing of ledger segments for
//!   offline third-party verification
//!
//! ## Example
//!
//! ```rust,ignore
//! use citadel_core::{
//!     ActionContext, ActionIntent, AuditLedger, AuditRecord, Capability,
//!     LifecycleAction, PolicyEngine, TrustLevel,
//! };
//!
//! let mut engine = PolicyEngine::new();
//! engine.registry_mut().register(
//!     Capability::new("app.files", TrustLevel::Verified).with_permission("fs.write"),
//! )?;
//! engine.registry_mut().transition("app.files", LifecycleAction::Enable)?;
//!
//! let decision = engine.evaluate(
//!     "app.files",
//!     &ActionIntent::fs_write("save"),
//!     &ActionContext::new("cor_42").with_scheme("user"),
//! );
//!
//! let mut ledger = AuditLedger::new();
//! ledger.append(&AuditRecord {
//!     capability_id: "app.files".into(),
//!     action: "save".into(),
//!     decision,
//! })?;
//! ```

pub mod attest;
pub mod capability;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod rate;
pub mod registry;
pub mod stepup;
pub mod wire;

// Re-exports for convenience
pub use attest::{
    segment_digest, verify_digest_signature, verify_manifest, verify_manifest_against_segment,
    AttestationManifest, AttestationService,
};
pub use capability::{apply, Capability, CapabilityState, LifecycleAction, TrustLevel};
pub use crypto::{PublicKey, Signature, SigningKey};
pub use error::{Error, ErrorCode, Result};
pub use ledger::{
    AuditEntry, AuditLedger, AuditRecord, EntryKind, RollbackRecord, AUDIT_VERSION,
    ENTRY_ID_PREFIX,
};
pub use policy::{
    AccessMode, ActionContext, ActionIntent, Decision, Outcome, PolicyConfig, PolicyEngine,
    SchemeRule, DEFAULT_MAX_PAYLOAD_BYTES,
};
pub use rate::{RateConfig, RateDecision, RateKind, RateLimiter};
pub use registry::{CapabilityRegistry, TransitionEvent};
pub use stepup::{
    PendingAction, StepUpManager, StepUpRequest, StepUpSnapshot, StepUpStatus,
    DEFAULT_STEP_UP_TTL_SECS,
};
pub use wire::MAX_RECORD_SIZE;

/// Context string for Ed25519 signatures (prevents cross-protocol attacks).
///
/// All attestation signatures are computed over `SIGNATURE_CONTEXT || message`,
/// so a signature produced here can never validate in another protocol.
pub const SIGNATURE_CONTEXT: &[u8] = b"citadel-attest-v1";
