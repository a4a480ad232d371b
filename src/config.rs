//! Configuration definition types
//!
//! A configuration is a named set of metrics owned by an identity. The
//! definitions here are immutable inputs: parsing and full semantic
//! validation happen upstream in the host daemon, metpipe only checks the
//! structural invariants it relies on (unique metric ids, unique triggers).

use std::fmt;

use crate::error::ConfigError;

/// Identity that owns a configuration
pub type OwnerId = u32;

/// Configuration id, unique per owner
pub type ConfigId = i64;

/// Metric id, unique within a configuration
pub type MetricId = i64;

/// Matcher id, resolved by the external matching engine
pub type MatcherId = i64;

/// Monotonic elapsed timestamp in nanoseconds
///
/// All internal time comparisons use this; the crate never reads a clock.
pub type ElapsedNs = i64;

/// Unique identity of a logging configuration: (owner, config id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    /// Owner identity
    pub owner: OwnerId,
    /// Configuration id within that owner
    pub id: ConfigId,
}

impl ConfigKey {
    /// Create a new configuration key
    pub fn new(owner: OwnerId, id: ConfigId) -> Self {
        Self { owner, id }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.owner, self.id)
    }
}

/// When a trigger turns its metric on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ActivationKind {
    /// Start collecting the moment the trigger's matcher fires
    #[default]
    Immediate = 0,
    /// Defer collection to the next boot: the window opens only after the
    /// persisted activation state is replayed at startup
    OnBoot = 1,
}

impl ActivationKind {
    /// Convert from the persisted byte representation
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Immediate),
            1 => Some(Self::OnBoot),
            _ => None,
        }
    }
}

/// An activation trigger attached to a metric
///
/// When the trigger's matcher fires, an activation window of `ttl_ns` opens
/// (or is deferred to the next boot, depending on `kind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationTrigger {
    /// Matcher whose firing starts or extends the window
    pub matcher_id: MatcherId,
    /// Window length in nanoseconds from the last match
    pub ttl_ns: i64,
    /// Immediate or deferred-to-boot activation
    pub kind: ActivationKind,
}

impl ActivationTrigger {
    /// Create an immediate-activation trigger
    pub fn immediate(matcher_id: MatcherId, ttl_ns: i64) -> Self {
        Self {
            matcher_id,
            ttl_ns,
            kind: ActivationKind::Immediate,
        }
    }

    /// Create an on-boot activation trigger
    pub fn on_boot(matcher_id: MatcherId, ttl_ns: i64) -> Self {
        Self {
            matcher_id,
            ttl_ns,
            kind: ActivationKind::OnBoot,
        }
    }
}

/// Aggregation family of a metric producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MetricKind {
    /// Count matching events
    Count = 0,
    /// Sum event-carried durations (nanoseconds)
    Duration = 1,
    /// Track event-carried values (last / sum / count)
    Value = 2,
}

/// Definition of one metric inside a configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    /// Metric id, unique within the configuration
    pub metric_id: MetricId,
    /// Matcher whose events this metric aggregates
    pub what_matcher: MatcherId,
    /// Aggregation family
    pub kind: MetricKind,
    /// Activation triggers; empty means the metric is always active
    pub triggers: Vec<ActivationTrigger>,
}

impl MetricDefinition {
    /// Create a metric definition with no activation triggers (always active)
    pub fn new(metric_id: MetricId, what_matcher: MatcherId, kind: MetricKind) -> Self {
        Self {
            metric_id,
            what_matcher,
            kind,
            triggers: Vec::new(),
        }
    }

    /// Attach an activation trigger
    pub fn with_trigger(mut self, trigger: ActivationTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// Full definition of one configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDefinition {
    /// Metrics declared by this configuration
    pub metrics: Vec<MetricDefinition>,
}

impl ConfigDefinition {
    /// Create an empty definition
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric
    pub fn with_metric(mut self, metric: MetricDefinition) -> Self {
        self.metrics.push(metric);
        self
    }

    /// Check the structural invariants metpipe relies on
    ///
    /// Rejects duplicate metric ids and duplicate (metric, matcher) triggers.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut metric_ids = std::collections::HashSet::new();
        for metric in &self.metrics {
            if !metric_ids.insert(metric.metric_id) {
                return Err(ConfigError::DuplicateMetricId(metric.metric_id));
            }
            let mut matcher_ids = std::collections::HashSet::new();
            for trigger in &metric.triggers {
                if !matcher_ids.insert(trigger.matcher_id) {
                    return Err(ConfigError::DuplicateTrigger {
                        metric_id: metric.metric_id,
                        matcher_id: trigger.matcher_id,
                    });
                }
            }
        }
        Ok(())
    }
}
