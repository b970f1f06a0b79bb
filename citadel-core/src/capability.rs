//! Capability records and the lifecycle state machine.
//!
//! A capability is an installed app or plugin running inside the shell,
//! analogous to a sandboxed process. Its lifecycle is a closed state machine:
//! every (state, action) pair is enumerated in [`apply`], so adding a state
//! or action without deciding its transitions is a compile error.
//!
//! Revocation is terminal: no action leaves [`CapabilityState::Revoked`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle states of a registered capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityState {
    /// Registered but not yet enabled; may not act.
    Installed,
    /// Fully operational.
    Enabled,
    /// Administratively paused; may be resumed.
    Suspended,
    /// Paused for abusive call volume; may be resumed.
    Throttled,
    /// Permanently disabled. Terminal.
    Revoked,
}

impl CapabilityState {
    /// Whether a capability in this state may have actions evaluated at all.
    pub fn is_operational(self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Whether the state admits any further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Revoked)
    }
}

impl std::fmt::Display for CapabilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Installed => "installed",
            Self::Enabled => "enabled",
            Self::Suspended => "suspended",
            Self::Throttled => "throttled",
            Self::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

/// Lifecycle actions accepted by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Enable,
    Suspend,
    Resume,
    Throttle,
    Revoke,
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Enable => "enable",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Throttle => "throttle",
            Self::Revoke => "revoke",
        };
        f.write_str(s)
    }
}

/// The transition table.
///
/// Returns the target state for a legal (state, action) pair, `None` for an
/// illegal one. Exhaustive over both enums.
pub fn apply(state: CapabilityState, action: LifecycleAction) -> Option<CapabilityState> {
    use CapabilityState::*;
    use LifecycleAction::*;
    match (state, action) {
        (Installed, Enable) => Some(Enabled),
        (Enabled, Suspend) => Some(Suspended),
        (Enabled, Throttle) => Some(Throttled),
        (Suspended, Resume) => Some(Enabled),
        (Throttled, Resume) => Some(Enabled),
        // Revocation is legal from any non-terminal state.
        (Installed | Enabled | Suspended | Throttled, Revoke) => Some(Revoked),
        (Revoked, Enable | Suspend | Resume | Throttle | Revoke) => None,
        (Installed, Suspend | Resume | Throttle) => None,
        (Enabled, Enable | Resume) => None,
        (Suspended, Enable | Suspend | Throttle) => None,
        (Throttled, Enable | Suspend | Throttle) => None,
    }
}

/// How far the shell trusts an installed capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Shipped with the shell itself.
    System,
    /// Reviewed and signed by the distribution channel.
    Verified,
    /// Community-published, unreviewed.
    Community,
    /// Side-loaded or of unknown origin.
    Unknown,
}

impl Default for TrustLevel {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A registered capability and its enforcement counters.
///
/// Mutated only through the registry; `throttle_count` and `deny_count` are
/// monotonic outside the administrative reset path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub state: CapabilityState,
    /// Granted permission strings, e.g. `fs.write`, `net.fetch`.
    pub permissions: BTreeSet<String>,
    pub trust: TrustLevel,
    /// Times an action was denied for exceeding a rate window.
    pub throttle_count: u64,
    /// Times any action was denied by policy.
    pub deny_count: u64,
    pub installed_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Capability {
    /// Create a freshly installed capability with no permissions.
    pub fn new(id: impl Into<String>, trust: TrustLevel) -> Self {
        Self::new_at(id, trust, Utc::now())
    }

    /// Create a capability with an explicit install timestamp.
    pub fn new_at(id: impl Into<String>, trust: TrustLevel, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state: CapabilityState::Installed,
            permissions: BTreeSet::new(),
            trust,
            throttle_count: 0,
            deny_count: 0,
            installed_at: now,
            last_activity: now,
        }
    }

    /// Grant a permission, returning self for chained setup.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
