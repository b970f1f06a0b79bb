//! Sliding-window rate limiter.
//!
//! One timestamp window per (capability, kind). Every check prunes entries
//! older than the window on the calling path; there is no background timer.
//! An admitted call records its timestamp; a denied call records nothing, so
//! denials never consume budget. Denial is immediate, never blocking.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The admission classes tracked per capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateKind {
    /// Shell event emissions (default 50 per second).
    Event,
    /// Host API calls (default 20 per second).
    ApiCall,
}

impl std::fmt::Display for RateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event => f.write_str("event"),
            Self::ApiCall => f.write_str("api_call"),
        }
    }
}

/// Per-kind limits. The window length is shared by both kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    pub event_limit: usize,
    pub api_call_limit: usize,
    pub window_ms: i64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            event_limit: 50,
            api_call_limit: 20,
            window_ms: 1_000,
        }
    }
}

impl RateConfig {
    fn limit(&self, kind: RateKind) -> usize {
        match kind {
            RateKind::Event => self.event_limit,
            RateKind::ApiCall => self.api_call_limit,
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateDecision {
    pub allowed: bool,
    /// Calls standing in the window, including this one when admitted.
    pub current: usize,
    pub limit: usize,
    pub window_ms: i64,
}

/// In-memory sliding-window admission counter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateConfig,
    windows: HashMap<(String, RateKind), Vec<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RateConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    /// Check and, if under the limit, admit one call now.
    pub fn check(&mut self, capability_id: &str, kind: RateKind) -> RateDecision {
        self.check_at(capability_id, kind, Utc::now())
    }

    /// [`check`](Self::check) with an explicit clock.
    pub fn check_at(
        &mut self,
        capability_id: &str,
        kind: RateKind,
        now: DateTime<Utc>,
    ) -> RateDecision {
        let limit = self.config.limit(kind);
        let window_ms = self.config.window_ms;
        let cutoff = now - Duration::milliseconds(window_ms);

        let window = self
            .windows
            .entry((capability_id.to_string(), kind))
            .or_default();
        window.retain(|ts| *ts > cutoff);

        if window.len() < limit {
            window.push(now);
            RateDecision {
                allowed: true,
                current: window.len(),
                limit,
                window_ms,
            }
        } else {
            RateDecision {
                allowed: false,
                current: window.len(),
                limit,
                window_ms,
            }
        }
    }

    /// Drop all recorded windows (test/administrative path).
    pub fn reset(&mut self) {
        self.windows.clear();
    }

    /// Drop the windows of one capability, e.g. on unregister.
    pub fn reset_capability(&mut self, capability_id: &str) {
        self.windows.retain(|(id, _), _| id != capability_id);
    }
}
