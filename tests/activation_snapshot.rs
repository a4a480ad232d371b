//! Integration tests for activation snapshot persistence
//!
//! These tests verify the save/load round trip across a simulated process
//! restart: remaining window time is reconstructed against the new
//! process' monotonic clock base, boot-pending triggers resolve to live
//! windows, and damaged snapshots degrade to "no persisted state".

use metpipe::{
    ActivationTrigger, ConfigDefinition, ConfigKey, LogEvent, MetricDefinition, MetricKind,
    ProcessorCoordinator, TagMatcherSet, TriggerState,
};
use tempfile::tempdir;

const SEC: i64 = 1_000_000_000;

/// Matcher 10 selects counted events (tag 1), matchers 20/21 are triggers
/// (tags 2/3)
fn matchers() -> Box<TagMatcherSet> {
    Box::new(
        TagMatcherSet::new()
            .with_matcher(10, 1)
            .with_matcher(20, 2)
            .with_matcher(21, 3),
    )
}

fn pipeline() -> ProcessorCoordinator {
    ProcessorCoordinator::new(matchers(), Box::new(|_| true), Box::new(|_, _| true))
}

fn immediate_definition(ttl_ns: i64) -> ConfigDefinition {
    ConfigDefinition::new().with_metric(
        MetricDefinition::new(1, 10, MetricKind::Count)
            .with_trigger(ActivationTrigger::immediate(20, ttl_ns)),
    )
}

fn on_boot_definition(ttl_ns: i64) -> ConfigDefinition {
    ConfigDefinition::new().with_metric(
        MetricDefinition::new(1, 10, MetricKind::Count)
            .with_trigger(ActivationTrigger::on_boot(20, ttl_ns)),
    )
}

#[test]
fn test_remaining_ttl_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("activations.mpas");
    let key = ConfigKey::new(1000, 1);

    // Trigger fires at t0 = 10s with ttl T = 100s; shutdown at t0 + 25s
    let mut before = pipeline();
    before.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();
    before.on_log_event(&LogEvent::new(2, 10 * SEC));
    before.save_active_configs_to_disk(&path, 35 * SEC).unwrap();
    assert_eq!(before.stats().records_saved, 1);

    // Restart with a fresh clock base t1 = 3s
    let mut after = pipeline();
    after.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();
    assert_eq!(after.load_active_configs_from_disk(&path, 3 * SEC), 1);

    // 75s remained, so the window closes at t1 + 75s = 78s
    assert!(after.is_config_active(&key, 3 * SEC));
    assert!(after.is_config_active(&key, 77 * SEC));
    assert!(!after.is_config_active(&key, 78 * SEC));
}

#[test]
fn test_on_boot_trigger_resolves_only_across_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("activations.mpas");
    let key = ConfigKey::new(1000, 1);

    let mut before = pipeline();
    before.on_config_updated(key, &on_boot_definition(100 * SEC)).unwrap();

    // The trigger fires during the live session: boot-pending, not active,
    // no matter how long the session runs
    before.on_log_event(&LogEvent::new(2, 10 * SEC));
    assert!(!before.is_config_active(&key, 10 * SEC));
    before.on_log_event(&LogEvent::new(2, 500 * SEC));
    assert!(!before.is_config_active(&key, 500 * SEC));

    before.save_active_configs_to_disk(&path, 600 * SEC).unwrap();

    // After restart the deferred window opens with its full ttl
    let mut after = pipeline();
    after.on_config_updated(key, &on_boot_definition(100 * SEC)).unwrap();
    assert_eq!(after.load_active_configs_from_disk(&path, 0), 1);

    assert!(after.is_config_active(&key, 0));
    assert!(after.is_config_active(&key, 99 * SEC));
    assert!(!after.is_config_active(&key, 100 * SEC));
}

#[test]
fn test_inactive_triggers_are_omitted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("activations.mpas");
    let key = ConfigKey::new(1000, 1);

    let mut before = pipeline();
    before.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();
    // Window [10s, 110s) has fully expired by shutdown at 200s
    before.on_log_event(&LogEvent::new(2, 10 * SEC));
    before.save_active_configs_to_disk(&path, 200 * SEC).unwrap();
    assert_eq!(before.stats().records_saved, 0);

    let mut after = pipeline();
    after.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();
    assert_eq!(after.load_active_configs_from_disk(&path, 0), 0);
    assert!(!after.is_config_active(&key, 0));
}

#[test]
fn test_records_for_changed_config_are_ignored() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("activations.mpas");
    let key = ConfigKey::new(1000, 1);

    let mut before = pipeline();
    before.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();
    before.on_log_event(&LogEvent::new(2, 10 * SEC));
    before.save_active_configs_to_disk(&path, 20 * SEC).unwrap();

    // The restarted process runs a definition triggered by matcher 21
    // instead; the persisted matcher-20 record has no live counterpart
    let changed = ConfigDefinition::new().with_metric(
        MetricDefinition::new(1, 10, MetricKind::Count)
            .with_trigger(ActivationTrigger::immediate(21, 100 * SEC)),
    );
    let mut after = pipeline();
    after.on_config_updated(key, &changed).unwrap();

    assert_eq!(after.load_active_configs_from_disk(&path, 0), 0);
    assert_eq!(after.stats().records_ignored, 1);
    assert!(!after.is_config_active(&key, 0));
}

#[test]
fn test_corrupted_snapshot_means_no_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("activations.mpas");
    let key = ConfigKey::new(1000, 1);

    let mut before = pipeline();
    before.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();
    before.on_log_event(&LogEvent::new(2, 10 * SEC));
    before.save_active_configs_to_disk(&path, 20 * SEC).unwrap();

    // Flip one byte in the record section
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let mut after = pipeline();
    after.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();

    // Load never fails; all activations fall back to NotActive
    assert_eq!(after.load_active_configs_from_disk(&path, 0), 0);
    assert!(!after.is_config_active(&key, 0));
}

#[test]
fn test_snapshot_is_replaced_wholesale() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("activations.mpas");
    let key = ConfigKey::new(1000, 1);

    let mut first = pipeline();
    first.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();
    first.on_log_event(&LogEvent::new(2, 10 * SEC));
    first.save_active_configs_to_disk(&path, 20 * SEC).unwrap();

    // A later save with nothing active overwrites the previous records
    let mut second = pipeline();
    second.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();
    second.save_active_configs_to_disk(&path, 0).unwrap();

    let mut after = pipeline();
    after.on_config_updated(key, &immediate_definition(100 * SEC)).unwrap();
    assert_eq!(after.load_active_configs_from_disk(&path, 0), 0);
}

#[test]
fn test_multi_trigger_windows_restore_independently() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("activations.mpas");
    let key = ConfigKey::new(1000, 1);

    // Two triggers on one metric: 100s and 200s ttl
    let definition = ConfigDefinition::new().with_metric(
        MetricDefinition::new(1, 10, MetricKind::Count)
            .with_trigger(ActivationTrigger::immediate(20, 100 * SEC))
            .with_trigger(ActivationTrigger::immediate(21, 200 * SEC)),
    );

    let mut before = pipeline();
    before.on_config_updated(key, &definition).unwrap();
    before.on_log_event(&LogEvent::new(2, 0)); // matcher 20, closes at 100s
    before.on_log_event(&LogEvent::new(3, 50 * SEC)); // matcher 21, closes at 250s
    before.save_active_configs_to_disk(&path, 80 * SEC).unwrap();
    assert_eq!(before.stats().records_saved, 2);

    let mut after = pipeline();
    after.on_config_updated(key, &definition).unwrap();
    assert_eq!(after.load_active_configs_from_disk(&path, 0), 2);

    // Trigger 20 has 20s left, trigger 21 has 170s left: OR semantics
    assert!(after.is_config_active(&key, 19 * SEC));
    assert!(after.is_config_active(&key, 100 * SEC));
    assert!(after.is_config_active(&key, 169 * SEC));
    assert!(!after.is_config_active(&key, 170 * SEC));
}

#[test]
fn test_on_boot_state_visible_before_restart() {
    // White-box check on the gate: a boot-pending trigger reports
    // ActiveOnBoot during the live session
    let definition = on_boot_definition(100 * SEC);
    let mut tracker = metpipe::MetricActivationTracker::from_definition(&definition);
    tracker.evaluate_event(&[20], 10 * SEC);

    let state = tracker.gate(1).and_then(|g| g.trigger_state(20)).unwrap();
    assert_eq!(state.state, TriggerState::ActiveOnBoot);
    assert!(!state.is_active(10 * SEC));
}
