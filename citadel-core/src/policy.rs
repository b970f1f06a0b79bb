//! Policy Decision Engine.
//!
//! `evaluate` runs an ordered, short-circuiting rule chain over one action
//! request and always returns a structured [`Decision`] — never a bare bool
//! and never an `Err`. Each rule appends to the reason chain, so a denial
//! explains every check that passed before the one that failed.
//!
//! Rule order:
//! 1. capability exists and is in an operational state
//! 2. capability holds the permission implied by the intent
//! 3. static scheme rules (matched rule id is recorded)
//! 4. payload quota
//! 5. rate limit (bumps `throttle_count`; retryable)
//! 6. sensitivity gate: verified step-up required, else escalate
//!
//! The engine owns its registry, limiter, and step-up session, so a single
//! lock around the engine serializes evaluation against record mutation and
//! evaluation never sees a half-updated record.

use crate::error::ErrorCode;
use crate::rate::{RateKind, RateLimiter};
use crate::registry::CapabilityRegistry;
use crate::stepup::StepUpManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default payload ceiling (256 KB), matching the shell's storage quota rule.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Read or write, as implied by the intent. Scheme rules only constrain
/// writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
}

/// One requested action: its name, the permission it implies, and which rate
/// window it draws from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionIntent {
    pub name: String,
    pub permission: String,
    pub mode: AccessMode,
    pub rate_kind: RateKind,
}

impl ActionIntent {
    pub fn new(
        name: impl Into<String>,
        permission: impl Into<String>,
        mode: AccessMode,
        rate_kind: RateKind,
    ) -> Self {
        Self {
            name: name.into(),
            permission: permission.into(),
            mode,
            rate_kind,
        }
    }

    /// A filesystem write drawing from the API-call window.
    pub fn fs_write(name: impl Into<String>) -> Self {
        Self::new(name, "fs.write", AccessMode::Write, RateKind::ApiCall)
    }

    /// A filesystem read drawing from the API-call window.
    pub fn fs_read(name: impl Into<String>) -> Self {
        Self::new(name, "fs.read", AccessMode::Read, RateKind::ApiCall)
    }

    /// A shell event emission drawing from the event window.
    pub fn emit_event(name: impl Into<String>) -> Self {
        Self::new(name, "events.emit", AccessMode::Write, RateKind::Event)
    }
}

/// Caller-supplied context for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionContext {
    /// Target namespace scheme, e.g. `sys`, `user`, `tmp`.
    pub scheme: Option<String>,
    pub payload_bytes: usize,
    /// Flags an action that must be covered by a verified step-up session.
    pub sensitive: bool,
    /// Caller-generated id threaded through the decision and audit entries.
    pub correlation_id: String,
}

impl ActionContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            scheme: None,
            payload_bytes: 0,
            sensitive: false,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_payload_bytes(mut self, payload_bytes: usize) -> Self {
        self.payload_bytes = payload_bytes;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// The three possible outcomes of evaluating one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Allow,
    Deny,
    Escalate,
}

/// The result of one evaluation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    /// Ordered trace of every rule consulted, ending with the deciding one.
    pub reason_chain: Vec<String>,
    /// `<capability_id>:<intent name>`, keying the decision for audit lookup.
    pub policy_key: String,
    pub error_code: Option<ErrorCode>,
    pub correlation_id: String,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }
}

/// A static scheme rule: within a protected namespace, writes are refused
/// regardless of granted permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeRule {
    pub id: String,
    pub scheme: String,
    pub read_only: bool,
}

impl SchemeRule {
    fn blocks(&self, intent: &ActionIntent, context: &ActionContext) -> bool {
        self.read_only
            && intent.mode == AccessMode::Write
            && context.scheme.as_deref() == Some(self.scheme.as_str())
    }
}

/// Static rule configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub max_payload_bytes: usize,
    pub scheme_rules: Vec<SchemeRule>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            // The system namespace is read-only for every capability.
            scheme_rules: vec![SchemeRule {
                id: "scheme-sys-read-only".into(),
                scheme: "sys".into(),
                read_only: true,
            }],
        }
    }
}

/// Stateless evaluator over the stateful services it owns.
#[derive(Debug)]
pub struct PolicyEngine {
    registry: CapabilityRegistry,
    limiter: RateLimiter,
    stepup: StepUpManager,
    config: PolicyConfig,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::with_config(PolicyConfig::default())
    }

    pub fn with_config(config: PolicyConfig) -> Self {
        Self {
            registry: CapabilityRegistry::new(),
            limiter: RateLimiter::new(),
            stepup: StepUpManager::new(),
            config,
        }
    }

    /// Assemble an engine from pre-configured services.
    pub fn with_services(
        registry: CapabilityRegistry,
        limiter: RateLimiter,
        stepup: StepUpManager,
        config: PolicyConfig,
    ) -> Self {
        Self {
            registry,
            limiter,
            stepup,
            config,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CapabilityRegistry {
        &mut self.registry
    }

    pub fn limiter_mut(&mut self) -> &mut RateLimiter {
        &mut self.limiter
    }

    pub fn stepup(&mut self) -> &mut StepUpManager {
        &mut self.stepup
    }

    /// Evaluate one action request.
    pub fn evaluate(
        &mut self,
        capability_id: &str,
        intent: &ActionIntent,
        context: &ActionContext,
    ) -> Decision {
        self.evaluate_at(capability_id, intent, context, Utc::now())
    }

    /// [`evaluate`](Self::evaluate) with an explicit clock.
    pub fn evaluate_at(
        &mut self,
        capability_id: &str,
        intent: &ActionIntent,
        context: &ActionContext,
        now: DateTime<Utc>,
    ) -> Decision {
        let policy_key = format!("{capability_id}:{}", intent.name);
        let mut reasons = Vec::new();

        // 1. Existence and lifecycle state.
        let Some(capability) = self.registry.snapshot(capability_id) else {
            reasons.push(format!("capability '{capability_id}' is not registered"));
            return self.deny(
                capability_id,
                policy_key,
                reasons,
                ErrorCode::CapabilityNotFound,
                context,
            );
        };
        if !capability.state.is_operational() {
            reasons.push(format!(
                "capability state '{}' does not permit actions",
                capability.state
            ));
            return self.deny(
                capability_id,
                policy_key,
                reasons,
                ErrorCode::CapabilityInvalidState,
                context,
            );
        }
        reasons.push(format!("capability enabled (trust {:?})", capability.trust));

        // 2. Permission implied by the intent.
        if !capability.has_permission(&intent.permission) {
            reasons.push(format!("permission '{}' not granted", intent.permission));
            return self.deny(
                capability_id,
                policy_key,
                reasons,
                ErrorCode::CapabilityDenied,
                context,
            );
        }
        reasons.push(format!("permission '{}' granted", intent.permission));

        // 3. Static scheme rules, first match wins.
        if let Some(rule) = self
            .config
            .scheme_rules
            .iter()
            .find(|rule| rule.blocks(intent, context))
        {
            reasons.push(format!(
                "scheme rule '{}' forbids writes to '{}'",
                rule.id, rule.scheme
            ));
            return self.deny(
                capability_id,
                policy_key,
                reasons,
                ErrorCode::SchemeViolation,
                context,
            );
        }
        reasons.push("scheme rules passed".into());

        // 4. Payload quota.
        if context.payload_bytes > self.config.max_payload_bytes {
            reasons.push(format!(
                "payload {} bytes exceeds ceiling {}",
                context.payload_bytes, self.config.max_payload_bytes
            ));
            return self.deny(
                capability_id,
                policy_key,
                reasons,
                ErrorCode::QuotaExceeded,
                context,
            );
        }
        reasons.push("payload within quota".into());

        // 5. Rate limit. Non-fatal and retryable; the capability record keeps
        // count so repeated abuse is visible to the lifecycle layer.
        let rate = self.limiter.check_at(capability_id, intent.rate_kind, now);
        if !rate.allowed {
            let _ = self.registry.record_throttle(capability_id);
            reasons.push(format!(
                "rate limit hit: {}/{} {} calls in {} ms",
                rate.current, rate.limit, intent.rate_kind, rate.window_ms
            ));
            return self.deny(
                capability_id,
                policy_key,
                reasons,
                ErrorCode::RateLimited,
                context,
            );
        }
        reasons.push(format!(
            "rate ok: {}/{} {} calls in window",
            rate.current, rate.limit, intent.rate_kind
        ));

        // 6. Sensitivity gate.
        if context.sensitive && !self.stepup.is_verified_at(now) {
            reasons.push("sensitive action: verified step-up session required".into());
            debug!(%policy_key, "escalating to step-up");
            return Decision {
                outcome: Outcome::Escalate,
                reason_chain: reasons,
                policy_key,
                error_code: Some(ErrorCode::StepUpRequired),
                correlation_id: context.correlation_id.clone(),
            };
        }

        reasons.push("allowed".into());
        Decision {
            outcome: Outcome::Allow,
            reason_chain: reasons,
            policy_key,
            error_code: None,
            correlation_id: context.correlation_id.clone(),
        }
    }

    fn deny(
        &mut self,
        capability_id: &str,
        policy_key: String,
        reason_chain: Vec<String>,
        code: ErrorCode,
        context: &ActionContext,
    ) -> Decision {
        // Unknown ids have no record to count against.
        let _ = self.registry.record_deny(capability_id);
        warn!(%policy_key, code = code.name(), "action denied");
        Decision {
            outcome: Outcome::Deny,
            reason_chain,
            policy_key,
            error_code: Some(code),
            correlation_id: context.correlation_id.clone(),
        }
    }
}
