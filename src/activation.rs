//! Activation state machine
//!
//! One [`ActivationState`] exists per (metric, trigger). A [`MetricGate`]
//! owns all of a metric's activation states and answers the aggregate
//! "is this metric collecting right now" question.
//!
//! Expiry is lazy: windows are recomputed against the caller-supplied
//! elapsed timestamp on each query or event, never by a timer thread.

use std::collections::BTreeMap;

use crate::config::{ActivationKind, ActivationTrigger, ElapsedNs, MatcherId};

/// Current state of one activation trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    /// No open window
    #[default]
    NotActive,
    /// Window open, metric collecting until `start + ttl`
    Active,
    /// Trigger fired during this process lifetime but collection is
    /// deferred to the next boot; resolved to `Active` only by the
    /// snapshot load path after a restart
    ActiveOnBoot,
}

/// Mutable per-trigger activation record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationState {
    /// Window length from the last match
    pub ttl_ns: i64,
    /// Elapsed timestamp of the last match (0 = never fired)
    pub start_ns: ElapsedNs,
    /// Immediate or deferred-to-boot activation
    pub kind: ActivationKind,
    /// Current state
    pub state: TriggerState,
}

impl ActivationState {
    /// Create the initial (not active) state for a trigger
    pub fn from_trigger(trigger: &ActivationTrigger) -> Self {
        Self {
            ttl_ns: trigger.ttl_ns,
            start_ns: 0,
            kind: trigger.kind,
            state: TriggerState::NotActive,
        }
    }

    /// The trigger's matcher fired at `event_ns`
    ///
    /// Immediate triggers open (or extend) an `Active` window. On-boot
    /// triggers mark boot-pending intent instead, except when a snapshot
    /// load already resolved them to `Active` this process lifetime; then
    /// the live window is refreshed. An on-boot trigger never promotes
    /// itself from `ActiveOnBoot` to `Active` without a restart in between.
    pub fn on_matched(&mut self, event_ns: ElapsedNs) {
        self.expire_if_due(event_ns);
        self.start_ns = event_ns;
        match self.kind {
            ActivationKind::Immediate => self.state = TriggerState::Active,
            ActivationKind::OnBoot => {
                if self.state != TriggerState::Active {
                    self.state = TriggerState::ActiveOnBoot;
                }
            }
        }
    }

    /// Whether the window is open at `now_ns`
    ///
    /// `ActiveOnBoot` is not collecting: it is intent for the next boot.
    pub fn is_active(&self, now_ns: ElapsedNs) -> bool {
        // Saturating: a ttl near i64::MAX means "never expires"
        self.state == TriggerState::Active && now_ns < self.start_ns.saturating_add(self.ttl_ns)
    }

    /// Flip an expired `Active` window back to `NotActive`
    pub fn expire_if_due(&mut self, now_ns: ElapsedNs) {
        if self.state == TriggerState::Active && !self.is_active(now_ns) {
            self.state = TriggerState::NotActive;
        }
    }

    /// Remaining window time at `now_ns`, clamped to zero
    pub fn remaining_ns(&self, now_ns: ElapsedNs) -> i64 {
        match self.state {
            TriggerState::NotActive => 0,
            // Boot-pending windows have not started counting down
            TriggerState::ActiveOnBoot => self.ttl_ns,
            TriggerState::Active => self
                .start_ns
                .saturating_add(self.ttl_ns)
                .saturating_sub(now_ns)
                .max(0),
        }
    }

    /// Resolve a persisted record into a live `Active` window
    ///
    /// Reconstructs a start timestamp consistent with the new process'
    /// monotonic clock: the window closes at `base + remaining`. The
    /// reconstructed start may be negative when the saved remainder is
    /// shorter than the ttl and the new clock base is small; that is fine,
    /// elapsed timestamps are signed for exactly this case.
    pub fn restore(&mut self, restart_base_ns: ElapsedNs, remaining_ns: i64) {
        self.start_ns = restart_base_ns + remaining_ns - self.ttl_ns;
        self.state = TriggerState::Active;
    }
}

/// Activation gate of one metric
///
/// Ordered mapping from triggering matcher id to [`ActivationState`]. A
/// metric with no triggers at all is always active; otherwise the gate is
/// open while at least one trigger's window is (OR semantics).
#[derive(Debug, Clone, Default)]
pub struct MetricGate {
    triggers: BTreeMap<MatcherId, ActivationState>,
}

impl MetricGate {
    /// Build a gate from a metric's declared triggers
    pub fn from_triggers(triggers: &[ActivationTrigger]) -> Self {
        let mut map = BTreeMap::new();
        for trigger in triggers {
            map.insert(trigger.matcher_id, ActivationState::from_trigger(trigger));
        }
        Self { triggers: map }
    }

    /// Whether the metric is collecting at `now_ns`
    pub fn is_active(&self, now_ns: ElapsedNs) -> bool {
        self.triggers.is_empty() || self.triggers.values().any(|s| s.is_active(now_ns))
    }

    /// Whether this metric has any activation triggers
    pub fn has_triggers(&self) -> bool {
        !self.triggers.is_empty()
    }

    /// Route a fired matcher to its trigger, if tracked
    ///
    /// Returns true when the matcher belonged to this gate.
    pub fn on_event_matched(&mut self, matcher_id: MatcherId, event_ns: ElapsedNs) -> bool {
        match self.triggers.get_mut(&matcher_id) {
            Some(state) => {
                state.on_matched(event_ns);
                true
            }
            None => false,
        }
    }

    /// Access one trigger's state
    pub fn trigger_state(&self, matcher_id: MatcherId) -> Option<&ActivationState> {
        self.triggers.get(&matcher_id)
    }

    /// Mutable access to one trigger's state (snapshot load path)
    pub fn trigger_state_mut(&mut self, matcher_id: MatcherId) -> Option<&mut ActivationState> {
        self.triggers.get_mut(&matcher_id)
    }

    /// Iterate all (matcher id, state) pairs in matcher-id order
    pub fn triggers(&self) -> impl Iterator<Item = (&MatcherId, &ActivationState)> {
        self.triggers.iter()
    }
}
