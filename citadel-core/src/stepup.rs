//! Step-up re-authentication session.
//!
//! A single session per user context gates sensitive actions behind a
//! time-boxed re-authentication challenge. A successful verification covers
//! further sensitive actions until the TTL lapses (default 10 minutes), so a
//! burst of sensitive work prompts once, not per action.
//!
//! Expiry is evaluated lazily by wall-clock comparison at read time; there is
//! no timer. The session never holds credentials: the restart-survival
//! snapshot carries only the verification timestamp and correlation id.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default time a verification remains valid.
pub const DEFAULT_STEP_UP_TTL_SECS: i64 = 600;

/// Session states. `Expired` is observable only after a TTL lapse and acts
/// like `Idle` for every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepUpStatus {
    Idle,
    Requested,
    ChallengeShown,
    Verified,
    Expired,
}

/// The action waiting on verification. The completion closure is invoked
/// exactly once, on success only.
pub struct PendingAction {
    /// Rendered by the challenge UI.
    pub description: String,
    pub correlation_id: String,
    on_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl PendingAction {
    pub fn new(description: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            correlation_id: correlation_id.into(),
            on_complete: None,
        }
    }

    /// Attach a completion to run when verification succeeds.
    pub fn on_complete(mut self, complete: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(complete));
        self
    }
}

impl std::fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAction")
            .field("description", &self.description)
            .field("correlation_id", &self.correlation_id)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Result of [`StepUpManager::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepUpRequest {
    /// An unexpired verification already covers the action; no challenge.
    AlreadyVerified,
    /// The caller must show a challenge and report back via `verify`.
    ChallengeRequired,
}

/// Restart-survival state. Deliberately excludes the pending action and any
/// credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepUpSnapshot {
    pub verified_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub correlation_id: Option<String>,
}

/// The single step-up session state machine.
pub struct StepUpManager {
    status: StepUpStatus,
    ttl: Duration,
    verified_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    correlation_id: Option<String>,
    pending: Option<PendingAction>,
}

impl std::fmt::Debug for StepUpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepUpManager")
            .field("status", &self.status)
            .field("expires_at", &self.expires_at)
            .field("pending", &self.pending)
            .finish()
    }
}

impl Default for StepUpManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StepUpManager {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_STEP_UP_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            status: StepUpStatus::Idle,
            ttl,
            verified_at: None,
            expires_at: None,
            correlation_id: None,
            pending: None,
        }
    }

    /// Request step-up for a sensitive action.
    ///
    /// Fast path: a still-valid verification covers the action immediately
    /// and runs its completion. Otherwise the session moves to `Requested`
    /// and the caller must present a challenge. At most one action can be
    /// pending; a new request replaces a stale one.
    pub fn request(&mut self, action: PendingAction) -> StepUpRequest {
        self.request_at(action, Utc::now())
    }

    /// [`request`](Self::request) with an explicit clock.
    pub fn request_at(&mut self, action: PendingAction, now: DateTime<Utc>) -> StepUpRequest {
        if self.is_verified_at(now) {
            debug!(correlation_id = %action.correlation_id, "step-up fast path: already verified");
            let mut action = action;
            if let Some(complete) = action.on_complete.take() {
                complete();
            }
            return StepUpRequest::AlreadyVerified;
        }
        info!(correlation_id = %action.correlation_id, "step-up challenge required");
        self.status = StepUpStatus::Requested;
        self.correlation_id = Some(action.correlation_id.clone());
        self.pending = Some(action);
        StepUpRequest::ChallengeRequired
    }

    /// The challenge UI reports it is now on screen.
    pub fn mark_challenge_shown(&mut self) {
        if self.status == StepUpStatus::Requested {
            self.status = StepUpStatus::ChallengeShown;
        }
    }

    /// Report the challenge outcome.
    ///
    /// On success the session becomes `Verified` until `now + ttl` and the
    /// pending completion runs exactly once. On failure the session resets to
    /// `Idle` and the pending action is discarded with no automatic retry.
    pub fn verify(&mut self, success: bool) -> StepUpStatus {
        self.verify_at(success, Utc::now())
    }

    /// [`verify`](Self::verify) with an explicit clock.
    pub fn verify_at(&mut self, success: bool, now: DateTime<Utc>) -> StepUpStatus {
        if success {
            self.status = StepUpStatus::Verified;
            self.verified_at = Some(now);
            self.expires_at = Some(now + self.ttl);
            info!(expires_at = ?self.expires_at, "step-up verified");
            if let Some(mut action) = self.pending.take() {
                if let Some(complete) = action.on_complete.take() {
                    complete();
                }
            }
        } else {
            info!("step-up verification failed; pending action discarded");
            self.reset();
        }
        self.status
    }

    /// Discard the pending action without marking a failure.
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            debug!("step-up challenge cancelled");
        }
        // A past verification, if any, keeps covering until its TTL lapses.
        if !matches!(self.status, StepUpStatus::Verified) {
            self.status = StepUpStatus::Idle;
        }
    }

    /// Whether a verification currently covers sensitive actions.
    ///
    /// Re-checks the timestamp on every call; a lapsed session flips to
    /// `Expired` here rather than via a timer.
    pub fn is_verified(&mut self) -> bool {
        self.is_verified_at(Utc::now())
    }

    /// [`is_verified`](Self::is_verified) with an explicit clock.
    pub fn is_verified_at(&mut self, now: DateTime<Utc>) -> bool {
        match (self.status, self.expires_at) {
            (StepUpStatus::Verified, Some(expires_at)) if now < expires_at => true,
            (StepUpStatus::Verified, _) => {
                self.status = StepUpStatus::Expired;
                false
            }
            _ => false,
        }
    }

    /// Current status, after the lazy expiry check.
    pub fn status_at(&mut self, now: DateTime<Utc>) -> StepUpStatus {
        self.is_verified_at(now);
        self.status
    }

    /// Description of the action awaiting verification, for the challenge UI.
    pub fn pending_description(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.description.as_str())
    }

    /// Export restart-survival state. Never contains credentials.
    pub fn snapshot(&self) -> StepUpSnapshot {
        StepUpSnapshot {
            verified_at: self.verified_at,
            expires_at: self.expires_at,
            correlation_id: self.correlation_id.clone(),
        }
    }

    /// Restore from a snapshot, e.g. after a shell reload. The pending
    /// action does not survive a restart.
    pub fn restore(&mut self, snapshot: StepUpSnapshot) {
        self.verified_at = snapshot.verified_at;
        self.expires_at = snapshot.expires_at;
        self.correlation_id = snapshot.correlation_id;
        self.pending = None;
        self.status = if self.expires_at.is_some() {
            StepUpStatus::Verified
        } else {
            StepUpStatus::Idle
        };
    }

    fn reset(&mut self) {
        self.status = StepUpStatus::Idle;
        self.verified_at = None;
        self.expires_at = None;
        self.correlation_id = None;
        self.pending = None;
    }
}
