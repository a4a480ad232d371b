//! Per-configuration activation tracking
//!
//! A [`MetricActivationTracker`] owns every [`MetricGate`] of one
//! configuration, routes fired matchers to their triggers, and detects when
//! the configuration-level activity flag flips so the coordinator can
//! broadcast the change.

use std::collections::BTreeMap;

use crate::activation::MetricGate;
use crate::config::{ConfigDefinition, ElapsedNs, MatcherId, MetricId};

/// Activation tracker for one configuration
#[derive(Debug, Clone)]
pub struct MetricActivationTracker {
    /// Gates keyed by metric id, in metric-id order
    gates: BTreeMap<MetricId, MetricGate>,
    /// Activity observed after the previous evaluation
    was_active: bool,
}

impl MetricActivationTracker {
    /// Build a tracker from a configuration definition
    ///
    /// All activation state starts fresh; restoring persisted windows is a
    /// separate, explicit step on the load path.
    pub fn from_definition(definition: &ConfigDefinition) -> Self {
        let mut gates = BTreeMap::new();
        for metric in &definition.metrics {
            gates.insert(metric.metric_id, MetricGate::from_triggers(&metric.triggers));
        }
        let was_active = gates.is_empty() || gates.values().any(|g| !g.has_triggers());
        Self { gates, was_active }
    }

    /// Whether the configuration is collecting anything at `now_ns`
    ///
    /// A configuration with no activating metrics is trivially active.
    pub fn is_active(&self, now_ns: ElapsedNs) -> bool {
        self.gates.is_empty() || self.gates.values().any(|g| g.is_active(now_ns))
    }

    /// Whether one metric's gate is open at `now_ns`
    ///
    /// Unknown metric ids report inactive.
    pub fn metric_is_active(&self, metric_id: MetricId, now_ns: ElapsedNs) -> bool {
        self.gates
            .get(&metric_id)
            .map(|g| g.is_active(now_ns))
            .unwrap_or(false)
    }

    /// Feed the satisfied matcher set of one event into the triggers
    ///
    /// Returns `Some(new_activity)` when the configuration-level activity
    /// flag flipped compared to the previous evaluation, `None` otherwise.
    /// No broadcasting happens here; the caller owns that side effect.
    pub fn evaluate_event(
        &mut self,
        matched_ids: &[MatcherId],
        event_ns: ElapsedNs,
    ) -> Option<bool> {
        for gate in self.gates.values_mut() {
            for &matcher_id in matched_ids {
                gate.on_event_matched(matcher_id, event_ns);
            }
        }

        let now_active = self.is_active(event_ns);
        if now_active != self.was_active {
            self.was_active = now_active;
            Some(now_active)
        } else {
            None
        }
    }

    /// Access a metric's gate
    pub fn gate(&self, metric_id: MetricId) -> Option<&MetricGate> {
        self.gates.get(&metric_id)
    }

    /// Mutable access to a metric's gate (snapshot load path)
    pub fn gate_mut(&mut self, metric_id: MetricId) -> Option<&mut MetricGate> {
        self.gates.get_mut(&metric_id)
    }

    /// Iterate all (metric id, gate) pairs in metric-id order
    pub fn gates(&self) -> impl Iterator<Item = (&MetricId, &MetricGate)> {
        self.gates.iter()
    }

    /// Re-derive the cached activity flag, e.g. after a snapshot load
    ///
    /// Returns the activity at `now_ns`. Keeps flip detection consistent so
    /// the next event only signals a genuine change.
    pub fn refresh_activity(&mut self, now_ns: ElapsedNs) -> bool {
        self.was_active = self.is_active(now_ns);
        self.was_active
    }

    /// Number of tracked metrics
    pub fn metric_count(&self) -> usize {
        self.gates.len()
    }
}
