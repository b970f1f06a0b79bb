//! Capability Lifecycle Registry.
//!
//! Owns the record for every registered capability and applies lifecycle
//! actions through the closed transition table in [`crate::capability`].
//! Illegal actions are rejected with the reason and leave the record
//! untouched; legal ones apply atomically and stamp `last_activity`.
//!
//! The registry is single-writer: all mutators take `&mut self`, and a caller
//! sharing it across threads wraps it in its own lock. Interested collaborators
//! (e.g. the shell's process table view) register plain callbacks rather than
//! subscribing through any UI framework.

use crate::capability::{apply, Capability, CapabilityState, LifecycleAction};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// An applied lifecycle transition, delivered to registered observers.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    pub capability_id: String,
    pub from: CapabilityState,
    pub action: LifecycleAction,
    pub to: CapabilityState,
    pub at: DateTime<Utc>,
}

type TransitionObserver = Box<dyn Fn(&TransitionEvent) + Send>;

/// Record store and state machine for all registered capabilities.
#[derive(Default)]
pub struct CapabilityRegistry {
    records: HashMap<String, Capability>,
    observers: Vec<TransitionObserver>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("records", &self.records)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability record.
    ///
    /// Fails with `DuplicateCapability` if the id is already present.
    pub fn register(&mut self, capability: Capability) -> Result<()> {
        if self.records.contains_key(&capability.id) {
            return Err(Error::DuplicateCapability(capability.id));
        }
        info!(id = %capability.id, trust = ?capability.trust, "capability registered");
        self.records.insert(capability.id.clone(), capability);
        Ok(())
    }

    /// Remove a capability record. Returns whether a record existed.
    pub fn unregister(&mut self, id: &str) -> bool {
        let existed = self.records.remove(id).is_some();
        if existed {
            info!(id, "capability unregistered");
        }
        existed
    }

    pub fn get(&self, id: &str) -> Option<&Capability> {
        self.records.get(id)
    }

    /// Clone the record for evaluation against an immutable snapshot.
    pub fn snapshot(&self, id: &str) -> Option<Capability> {
        self.records.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of all registered capabilities.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(|s| s.as_str())
    }

    /// Apply a lifecycle action.
    ///
    /// Legal transitions return the new state; illegal ones fail with
    /// `IllegalTransition` and leave the record unchanged.
    pub fn transition(&mut self, id: &str, action: LifecycleAction) -> Result<CapabilityState> {
        self.transition_at(id, action, Utc::now())
    }

    /// [`transition`](Self::transition) with an explicit clock.
    pub fn transition_at(
        &mut self,
        id: &str,
        action: LifecycleAction,
        now: DateTime<Utc>,
    ) -> Result<CapabilityState> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::CapabilityNotFound(id.to_string()))?;

        let from = record.state;
        let Some(to) = apply(from, action) else {
            warn!(id, %from, %action, "illegal lifecycle transition rejected");
            return Err(Error::IllegalTransition {
                id: id.to_string(),
                from,
                action,
            });
        };

        record.state = to;
        record.last_activity = now;
        info!(id, %from, %action, %to, "capability transitioned");

        let event = TransitionEvent {
            capability_id: id.to_string(),
            from,
            action,
            to,
            at: now,
        };
        for observer in &self.observers {
            observer(&event);
        }
        Ok(to)
    }

    /// Register a callback invoked after every applied transition.
    pub fn subscribe(&mut self, observer: impl Fn(&TransitionEvent) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Grant a permission to a registered capability.
    pub fn grant_permission(&mut self, id: &str, permission: impl Into<String>) -> Result<()> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::CapabilityNotFound(id.to_string()))?;
        let permission = permission.into();
        debug!(id, %permission, "permission granted");
        record.permissions.insert(permission);
        Ok(())
    }

    /// Withdraw a permission. Returns whether it was held.
    pub fn revoke_permission(&mut self, id: &str, permission: &str) -> Result<bool> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::CapabilityNotFound(id.to_string()))?;
        Ok(record.permissions.remove(permission))
    }

    /// Increment the throttle counter. Returns the new value.
    pub fn record_throttle(&mut self, id: &str) -> Result<u64> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::CapabilityNotFound(id.to_string()))?;
        record.throttle_count += 1;
        Ok(record.throttle_count)
    }

    /// Increment the deny counter. Returns the new value.
    pub fn record_deny(&mut self, id: &str) -> Result<u64> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::CapabilityNotFound(id.to_string()))?;
        record.deny_count += 1;
        Ok(record.deny_count)
    }

    /// Administrative reset of both enforcement counters.
    pub fn reset_counters(&mut self, id: &str) -> Result<()> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::CapabilityNotFound(id.to_string()))?;
        record.throttle_count = 0;
        record.deny_count = 0;
        Ok(())
    }
}
