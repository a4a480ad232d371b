//! Top-level pipeline coordinator
//!
//! [`ProcessorCoordinator`] owns one (tracker, guardrail, metrics manager)
//! triple per configuration, fans incoming events out to them, runs the
//! periodic guardrail checks, serves dump requests, and drives the
//! activation snapshot save/load paths.
//!
//! # Reentrancy
//!
//! The coordinator is a single logical owner: every operation takes
//! `&mut self` and completes synchronously, so event ingestion, dumps, and
//! disk save/load are mutually exclusive by construction. The injected
//! callbacks are invoked inline during those operations and must not call
//! back into the coordinator; in a host that wraps the coordinator in a
//! lock this would deadlock. Callback return values are observed in the
//! stats counters only, never retried or propagated.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::config::{ConfigDefinition, ConfigId, ConfigKey, ElapsedNs, OwnerId};
use crate::event::{LogEvent, MatcherEvaluator};
use crate::guardrail::{FlushDecision, GuardrailController};
use crate::manager::{MetricStore, MetricsManager};
use crate::persist::{ActivationRecord, ActivationSnapshot};
use crate::stats::PipelineStats;
use crate::tracker::MetricActivationTracker;
use crate::error::Result;

/// Report-fetch broadcast: "this configuration's report should be fetched
/// now". Fire-and-forget; `false` means not delivered.
pub type BroadcastFn = Box<dyn FnMut(&ConfigKey) -> bool>;

/// Active-configs broadcast: the full set of currently-active configuration
/// ids for one owner identity.
pub type ActiveConfigsFn = Box<dyn FnMut(OwnerId, &[ConfigId]) -> bool>;

/// Everything the coordinator tracks for one configuration
#[derive(Debug)]
struct ConfigState {
    tracker: MetricActivationTracker,
    guardrail: GuardrailController,
    manager: MetricsManager,
}

/// Owner of all per-configuration pipeline state
pub struct ProcessorCoordinator {
    /// Per-configuration state, in key order
    configs: BTreeMap<ConfigKey, ConfigState>,
    /// External matching engine
    matcher: Box<dyn MatcherEvaluator>,
    /// Report-fetch broadcast callback
    broadcast: BroadcastFn,
    /// Active-configs broadcast callback
    active_configs_broadcast: ActiveConfigsFn,
    /// Pipeline health counters
    stats: PipelineStats,
}

impl ProcessorCoordinator {
    /// Create a coordinator with its external collaborators
    pub fn new(
        matcher: Box<dyn MatcherEvaluator>,
        broadcast: BroadcastFn,
        active_configs_broadcast: ActiveConfigsFn,
    ) -> Self {
        Self {
            configs: BTreeMap::new(),
            matcher,
            broadcast,
            active_configs_broadcast,
            stats: PipelineStats::new(),
        }
    }

    /// Install or replace a configuration
    ///
    /// Replacement is wholesale: activation state and accumulated data of a
    /// prior definition under the same key are discarded, even for metric
    /// ids both definitions declare. Restoring windows from disk is the
    /// load path's job.
    pub fn on_config_updated(&mut self, key: ConfigKey, definition: &ConfigDefinition) -> Result<()> {
        definition.validate()?;
        let state = ConfigState {
            tracker: MetricActivationTracker::from_definition(definition),
            guardrail: GuardrailController::new(),
            manager: MetricsManager::from_definition(key, &definition.metrics),
        };
        if self.configs.insert(key, state).is_some() {
            log::info!("config {}: replaced", key);
        } else {
            log::info!("config {}: added", key);
        }
        Ok(())
    }

    /// Replace one configuration's guardrail
    ///
    /// Lets hosts tighten limits below the defaults, e.g. on low-memory
    /// devices. Returns `false` when the key is unknown.
    pub fn set_guardrail(&mut self, key: &ConfigKey, guardrail: GuardrailController) -> bool {
        match self.configs.get_mut(key) {
            Some(state) => {
                state.guardrail = guardrail;
                true
            }
            None => false,
        }
    }

    /// Remove a configuration and all its state
    pub fn on_config_removed(&mut self, key: &ConfigKey) {
        if self.configs.remove(key).is_some() {
            log::info!("config {}: removed", key);
        }
    }

    /// Ingest one log event
    ///
    /// Resolves the satisfied matcher set once, feeds it to every
    /// configuration's triggers and (gated) producers, and, when any
    /// configuration's activity flipped, broadcasts the active config ids
    /// of each affected owner exactly once. An event satisfying no matcher
    /// still reaches every tracker: lazy window expiry can flip a
    /// configuration inactive on any event.
    pub fn on_log_event(&mut self, event: &LogEvent) {
        self.stats.events_processed += 1;

        let matched = self.matcher.matched_ids(event);
        if !matched.is_empty() {
            self.stats.events_matched += 1;
        }

        let now_ns = event.elapsed_ns;
        let mut flipped_owners: BTreeSet<OwnerId> = BTreeSet::new();

        for (key, state) in self.configs.iter_mut() {
            if state.tracker.evaluate_event(&matched, now_ns).is_some() {
                flipped_owners.insert(key.owner);
            }
            if matched.is_empty() {
                continue;
            }

            let ConfigState {
                tracker, manager, ..
            } = state;
            let accumulated =
                manager.accumulate_event(&matched, event, |metric_id| {
                    tracker.metric_is_active(metric_id, now_ns)
                });
            self.stats.accumulations += accumulated as u64;
        }

        for owner in flipped_owners {
            let active_ids = self.active_config_ids(owner, now_ns);
            let delivered = (self.active_configs_broadcast)(owner, &active_ids);
            self.stats.record_activation_broadcast(delivered);
            if !delivered {
                log::debug!("owner {}: active-configs broadcast not delivered", owner);
            }
        }
    }

    /// Run the guardrail for one configuration
    ///
    /// Unknown keys are a no-op reporting `Skipped`.
    pub fn flush_if_necessary(&mut self, now_ns: ElapsedNs, key: &ConfigKey) -> FlushDecision {
        match self.configs.get_mut(key) {
            Some(state) => Self::flush_config(
                key,
                state,
                now_ns,
                &mut self.broadcast,
                &mut self.stats,
            ),
            None => FlushDecision::Skipped,
        }
    }

    /// Periodic tick: run the guardrail for every configuration
    pub fn flush_all(&mut self, now_ns: ElapsedNs) {
        let broadcast = &mut self.broadcast;
        let stats = &mut self.stats;
        for (key, state) in self.configs.iter_mut() {
            Self::flush_config(key, state, now_ns, broadcast, stats);
        }
    }

    fn flush_config(
        key: &ConfigKey,
        state: &mut ConfigState,
        now_ns: ElapsedNs,
        broadcast: &mut BroadcastFn,
        stats: &mut PipelineStats,
    ) -> FlushDecision {
        let decision = state
            .guardrail
            .flush_if_necessary(now_ns, key, &mut state.manager);
        match decision {
            FlushDecision::Skipped => {}
            FlushDecision::WithinBudget { .. } => stats.size_checks += 1,
            FlushDecision::Dropped { .. } => {
                stats.size_checks += 1;
                stats.data_drops += 1;
            }
            FlushDecision::BroadcastNeeded { .. } => {
                stats.size_checks += 1;
                let delivered = broadcast(key);
                stats.record_broadcast(delivered);
                if !delivered {
                    log::debug!("config {}: report broadcast not delivered", key);
                }
            }
        }
        decision
    }

    /// Serve a dump request for one configuration
    ///
    /// Runs the guardrail first, then encodes the report. With `erase` set,
    /// accumulated data is cleared so the next dump starts empty. Unknown
    /// keys yield an empty report.
    pub fn on_dump_report(&mut self, key: &ConfigKey, now_ns: ElapsedNs, erase: bool) -> Vec<u8> {
        if !self.configs.contains_key(key) {
            self.stats.dumps_unknown_config += 1;
            return Vec::new();
        }
        self.flush_if_necessary(now_ns, key);

        let state = match self.configs.get_mut(key) {
            Some(state) => state,
            None => return Vec::new(),
        };
        self.stats.dumps_served += 1;
        state.manager.dump_report(now_ns, erase)
    }

    /// Collect every open activation window into a snapshot
    ///
    /// `NotActive` triggers are omitted; their absence on reload means
    /// "inactive, full ttl available". `Active` windows persist their
    /// clamped remaining time, boot-pending windows their full ttl.
    pub fn snapshot_activations(&self, shutdown_ns: ElapsedNs) -> ActivationSnapshot {
        let mut snapshot = ActivationSnapshot::new(shutdown_ns);
        for (key, state) in &self.configs {
            for (&metric_id, gate) in state.tracker.gates() {
                for (&matcher_id, trigger) in gate.triggers() {
                    let remaining_ns = trigger.remaining_ns(shutdown_ns);
                    if remaining_ns == 0 {
                        continue;
                    }
                    snapshot.records.push(ActivationRecord {
                        owner: key.owner,
                        config_id: key.id,
                        metric_id,
                        matcher_id,
                        ttl_ns: trigger.ttl_ns,
                        remaining_ns,
                        kind: trigger.kind,
                    });
                }
            }
        }
        snapshot
    }

    /// Replay a snapshot against a fresh monotonic clock base
    ///
    /// Every record with a matching live trigger becomes a definite
    /// `Active` window closing at `restart_base_ns + remaining`; records
    /// referencing triggers no longer configured are ignored. Returns the
    /// number of records restored.
    pub fn restore_activations(
        &mut self,
        snapshot: &ActivationSnapshot,
        restart_base_ns: ElapsedNs,
    ) -> usize {
        let mut restored = 0u64;
        let mut ignored = 0u64;

        for record in &snapshot.records {
            let target = self
                .configs
                .get_mut(&record.config_key())
                .and_then(|state| state.tracker.gate_mut(record.metric_id))
                .and_then(|gate| gate.trigger_state_mut(record.matcher_id));
            match target {
                Some(trigger) => {
                    trigger.restore(restart_base_ns, record.remaining_ns);
                    restored += 1;
                }
                None => ignored += 1,
            }
        }

        for state in self.configs.values_mut() {
            state.tracker.refresh_activity(restart_base_ns);
        }

        self.stats.records_restored = restored;
        self.stats.records_ignored = ignored;
        if ignored > 0 {
            log::debug!("snapshot restore: {} records without a live trigger", ignored);
        }
        restored as usize
    }

    /// Persist all open activation windows to `path`, replacing any
    /// previous snapshot wholesale
    pub fn save_active_configs_to_disk(
        &mut self,
        path: &Path,
        shutdown_ns: ElapsedNs,
    ) -> Result<()> {
        let snapshot = self.snapshot_activations(shutdown_ns);
        self.stats.records_saved = snapshot.len() as u64;
        snapshot.save_to_file(path)?;
        log::info!(
            "saved {} activation records to {}",
            snapshot.len(),
            path.display()
        );
        Ok(())
    }

    /// Restore activation windows from `path`
    ///
    /// A missing, unreadable, or malformed snapshot is treated as "no
    /// persisted state": every activation stays `NotActive` with its full
    /// ttl, and the load path never fails. Returns the number of records
    /// restored.
    pub fn load_active_configs_from_disk(
        &mut self,
        path: &Path,
        restart_base_ns: ElapsedNs,
    ) -> usize {
        let snapshot = match ActivationSnapshot::load_from_file(path) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::warn!(
                    "ignoring activation snapshot at {}: {}",
                    path.display(),
                    err
                );
                return 0;
            }
        };
        self.restore_activations(&snapshot, restart_base_ns)
    }

    /// Number of tracked configurations
    pub fn config_count(&self) -> usize {
        self.configs.len()
    }

    /// Whether a configuration is tracked
    pub fn contains_config(&self, key: &ConfigKey) -> bool {
        self.configs.contains_key(key)
    }

    /// Whether a configuration is collecting anything at `now_ns`
    ///
    /// Unknown keys report inactive.
    pub fn is_config_active(&self, key: &ConfigKey, now_ns: ElapsedNs) -> bool {
        self.configs
            .get(key)
            .map(|state| state.tracker.is_active(now_ns))
            .unwrap_or(false)
    }

    /// Ids of one owner's currently-active configurations, ascending
    pub fn active_config_ids(&self, owner: OwnerId, now_ns: ElapsedNs) -> Vec<ConfigId> {
        self.configs
            .iter()
            .filter(|(key, state)| key.owner == owner && state.tracker.is_active(now_ns))
            .map(|(key, _)| key.id)
            .collect()
    }

    /// Approximate accumulated byte size of one configuration
    pub fn config_byte_size(&self, key: &ConfigKey) -> usize {
        self.configs
            .get(key)
            .map(|state| state.manager.byte_size())
            .unwrap_or(0)
    }

    /// Pipeline health counters
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}

impl std::fmt::Debug for ProcessorCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorCoordinator")
            .field("configs", &self.configs)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
