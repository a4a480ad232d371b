//! Byte-budget guardrails
//!
//! Each configuration gets a [`GuardrailController`] that samples the
//! configuration's in-memory byte size at a bounded rate and decides whether
//! to do nothing, request a report broadcast, or drop the data outright.
//! The controller only decides; the coordinator performs the broadcast and
//! bookkeeping side effects.

use crate::config::{ConfigKey, ElapsedNs};
use crate::manager::MetricStore;

/// Hard cap on accumulated metric bytes per configuration
pub const MAX_METRICS_BYTES_PER_CONFIG: usize = 2 * 1024 * 1024;

/// Byte size at which a report broadcast is requested (95% of the hard cap)
pub const BROADCAST_BYTES_PER_CONFIG: usize = MAX_METRICS_BYTES_PER_CONFIG / 100 * 95;

/// Minimum interval between byte-size samples of one configuration
///
/// The same window also suppresses repeat broadcasts: at most one size check
/// and one broadcast request can happen per window.
pub const MIN_BYTE_SIZE_CHECK_PERIOD_NS: i64 = 5 * 60 * 1_000_000_000;

/// Outcome of one guardrail evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Rate limit window still open, byte size not sampled
    Skipped,
    /// Sampled size is under every threshold
    WithinBudget {
        /// Sampled byte size
        bytes: usize,
    },
    /// Sampled size crossed the broadcast threshold; the report should be
    /// fetched now
    BroadcastNeeded {
        /// Sampled byte size
        bytes: usize,
    },
    /// Sampled size reached the hard cap; data was discarded, nothing is
    /// broadcast
    Dropped {
        /// Sampled byte size before the drop
        bytes: usize,
    },
}

/// Per-configuration rate-limited size sampler
#[derive(Debug, Clone)]
pub struct GuardrailController {
    /// Hard cap in bytes
    max_bytes: usize,
    /// Broadcast threshold in bytes
    broadcast_bytes: usize,
    /// Minimum interval between samples
    check_period_ns: i64,
    /// Elapsed timestamp of the last sample (None = never sampled)
    last_check_ns: Option<ElapsedNs>,
    /// Byte size observed at the last sample
    last_bytes: usize,
}

impl GuardrailController {
    /// Create a controller with the default thresholds
    pub fn new() -> Self {
        Self::with_limits(
            MAX_METRICS_BYTES_PER_CONFIG,
            BROADCAST_BYTES_PER_CONFIG,
            MIN_BYTE_SIZE_CHECK_PERIOD_NS,
        )
    }

    /// Create a controller with custom thresholds
    pub fn with_limits(max_bytes: usize, broadcast_bytes: usize, check_period_ns: i64) -> Self {
        Self {
            max_bytes,
            broadcast_bytes,
            check_period_ns,
            last_check_ns: None,
            last_bytes: 0,
        }
    }

    /// Byte size observed at the last sample
    pub fn last_bytes(&self) -> usize {
        self.last_bytes
    }

    /// Elapsed timestamp of the last sample, if any
    pub fn last_check_ns(&self) -> Option<ElapsedNs> {
        self.last_check_ns
    }

    /// Sample the store's byte size if the rate limit allows, and decide
    ///
    /// The first call always samples. Later calls sample once the window
    /// has fully elapsed, boundary inclusive: a call exactly at
    /// `last_check + period` fires. A size at or over the hard cap drops
    /// the data via [`MetricStore::drop_data`] and requests no broadcast.
    pub fn flush_if_necessary(
        &mut self,
        now_ns: ElapsedNs,
        key: &ConfigKey,
        store: &mut dyn MetricStore,
    ) -> FlushDecision {
        if let Some(last) = self.last_check_ns {
            if now_ns - last < self.check_period_ns {
                return FlushDecision::Skipped;
            }
        }

        let bytes = store.byte_size();
        self.last_check_ns = Some(now_ns);
        self.last_bytes = bytes;

        if bytes >= self.max_bytes {
            log::warn!(
                "config {}: metric data at {} bytes (cap {}), dropping",
                key,
                bytes,
                self.max_bytes
            );
            store.drop_data(now_ns);
            FlushDecision::Dropped { bytes }
        } else if bytes >= self.broadcast_bytes {
            log::debug!(
                "config {}: metric data at {} bytes, requesting report fetch",
                key,
                bytes
            );
            FlushDecision::BroadcastNeeded { bytes }
        } else {
            FlushDecision::WithinBudget { bytes }
        }
    }
}

impl Default for GuardrailController {
    fn default() -> Self {
        Self::new()
    }
}
