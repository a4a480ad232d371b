//! # metpipe - In-process Event-Metrics Pipeline
//!
//! The stateful core of a telemetry daemon: ingests typed log events,
//! gates metric collection behind time-bounded activation windows, enforces
//! per-configuration byte budgets, and persists activation state across
//! process restarts.
//!
//! ## Key Features
//!
//! - **Activation windows**: per-trigger ttl windows with lazy expiry, no
//!   timer threads
//! - **Boot-deferred activation**: triggers can defer collection to the
//!   next boot, resolved by the snapshot load path
//! - **Byte-budget guardrails**: rate-limited size sampling with
//!   broadcast-on-threshold and drop-on-overflow
//! - **Restart-durable state**: activation windows survive restarts and
//!   clock discontinuities via a checksummed snapshot blob
//! - **Deterministic time**: every operation takes the caller's elapsed
//!   monotonic timestamp; the crate never reads a clock
//!
//! ## Quick Start
//!
//! ```rust
//! use metpipe::{
//!     ActivationTrigger, ConfigDefinition, ConfigKey, LogEvent, MetricDefinition,
//!     MetricKind, ProcessorCoordinator, TagMatcherSet,
//! };
//!
//! // Matcher 10 selects the events to count, matcher 20 opens the window
//! let matchers = TagMatcherSet::new().with_matcher(10, 1).with_matcher(20, 2);
//!
//! let mut pipeline = ProcessorCoordinator::new(
//!     Box::new(matchers),
//!     Box::new(|_key| true),          // report-fetch broadcast
//!     Box::new(|_owner, _ids| true),  // active-configs broadcast
//! );
//!
//! // One count metric, collecting for 100s after matcher 20 fires
//! let key = ConfigKey::new(1000, 1);
//! let definition = ConfigDefinition::new().with_metric(
//!     MetricDefinition::new(1, 10, MetricKind::Count)
//!         .with_trigger(ActivationTrigger::immediate(20, 100_000_000_000)),
//! );
//! pipeline.on_config_updated(key, &definition).unwrap();
//!
//! // Inactive: the event is not counted
//! pipeline.on_log_event(&LogEvent::new(1, 1_000_000_000));
//! assert!(!pipeline.is_config_active(&key, 1_000_000_000));
//!
//! // The trigger fires, the window opens, counting starts
//! pipeline.on_log_event(&LogEvent::new(2, 2_000_000_000));
//! pipeline.on_log_event(&LogEvent::new(1, 3_000_000_000));
//! assert!(pipeline.is_config_active(&key, 3_000_000_000));
//! ```
//!
//! ## Modules
//!
//! - [`config`]: configuration, metric, and trigger definitions
//! - [`event`]: log events and the matcher-evaluation seam
//! - [`activation`]: per-trigger state machine and metric gates
//! - [`tracker`]: per-configuration activation tracking
//! - [`manager`]: per-configuration metric storage and dump encoding
//! - [`guardrail`]: rate-limited byte-budget enforcement
//! - [`persist`]: activation snapshot codec and file I/O
//! - [`processor`]: the top-level coordinator
//! - [`stats`]: pipeline health counters

// Modules
pub mod activation;
pub mod config;
pub mod error;
pub mod event;
pub mod guardrail;
pub mod manager;
pub mod persist;
pub mod processor;
pub mod stats;
pub mod tracker;

// Re-exports for convenient access
pub use activation::{ActivationState, MetricGate, TriggerState};
pub use config::{
    ActivationKind, ActivationTrigger, ConfigDefinition, ConfigId, ConfigKey, ElapsedNs,
    MatcherId, MetricDefinition, MetricId, MetricKind, OwnerId,
};
pub use error::{ConfigError, MetpipeError, PersistError, Result};
pub use event::{LogEvent, MatcherEvaluator, TagMatcherSet};
pub use guardrail::{
    FlushDecision, GuardrailController, BROADCAST_BYTES_PER_CONFIG,
    MAX_METRICS_BYTES_PER_CONFIG, MIN_BYTE_SIZE_CHECK_PERIOD_NS,
};
pub use manager::{MetricData, MetricProducer, MetricStore, MetricsManager};
pub use persist::{
    ActivationRecord, ActivationSnapshot, SNAPSHOT_FORMAT_VERSION, SNAPSHOT_MAGIC,
};
pub use processor::{ActiveConfigsFn, BroadcastFn, ProcessorCoordinator};
pub use stats::PipelineStats;
pub use tracker::MetricActivationTracker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
