//! Per-configuration metric storage
//!
//! A [`MetricsManager`] owns one configuration's metric producers and their
//! accumulated data. Only the activation-gated accumulation, byte
//! accounting, drop valve, and dump encoding live here; real aggregation
//! math and report proto encoding belong to the host daemon.

use crate::config::{ConfigKey, ElapsedNs, MatcherId, MetricDefinition, MetricKind, MetricId};
use crate::event::LogEvent;

/// Byte-accounting seam consumed by the guardrail
///
/// Separated out so guardrail behavior is testable against a mock store.
pub trait MetricStore {
    /// Approximate in-memory size of accumulated metric data
    fn byte_size(&self) -> usize;

    /// Discard all accumulated data (backpressure valve)
    fn drop_data(&mut self, drop_ns: ElapsedNs);
}

/// Accumulated data of one producer, tagged by aggregation family
#[derive(Debug, Clone, PartialEq)]
pub enum MetricData {
    /// Number of matching events
    Count(u64),
    /// Summed event-carried durations
    Duration {
        /// Total nanoseconds accumulated
        total_ns: u64,
    },
    /// Event-carried values
    Value {
        /// Last observed value
        last: f64,
        /// Sum of observed values
        sum: f64,
        /// Number of observations
        count: u64,
    },
}

impl MetricData {
    fn empty(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Count => Self::Count(0),
            MetricKind::Duration => Self::Duration { total_ns: 0 },
            MetricKind::Value => Self::Value {
                last: 0.0,
                sum: 0.0,
                count: 0,
            },
        }
    }

    fn has_data(&self) -> bool {
        match self {
            Self::Count(n) => *n > 0,
            Self::Duration { total_ns } => *total_ns > 0,
            Self::Value { count, .. } => *count > 0,
        }
    }
}

/// One metric's producer: identity, gating matcher, and accumulated data
#[derive(Debug, Clone)]
pub struct MetricProducer {
    /// Metric id within the configuration
    metric_id: MetricId,
    /// Aggregation family
    kind: MetricKind,
    /// Matcher whose events this producer aggregates
    what_matcher: MatcherId,
    /// Accumulated data
    data: MetricData,
}

impl MetricProducer {
    /// Create an empty producer from a metric definition
    pub fn from_definition(definition: &MetricDefinition) -> Self {
        Self {
            metric_id: definition.metric_id,
            kind: definition.kind,
            what_matcher: definition.what_matcher,
            data: MetricData::empty(definition.kind),
        }
    }

    /// Metric id
    pub fn metric_id(&self) -> MetricId {
        self.metric_id
    }

    /// Aggregation family
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Accumulated data
    pub fn data(&self) -> &MetricData {
        &self.data
    }

    /// Fold one matching event into the accumulated data
    pub fn accumulate(&mut self, event: &LogEvent) {
        match &mut self.data {
            MetricData::Count(n) => *n += 1,
            MetricData::Duration { total_ns } => {
                *total_ns = total_ns.saturating_add(event.value.max(0.0) as u64);
            }
            MetricData::Value { last, sum, count } => {
                *last = event.value;
                *sum += event.value;
                *count += 1;
            }
        }
    }

    /// Discard accumulated data
    pub fn clear(&mut self) {
        self.data = MetricData::empty(self.kind);
    }

    /// Approximate in-memory footprint of this producer
    pub fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }

    /// Append this producer's report record to `out`
    ///
    /// Little-endian layout: metric id (8), kind (1), payload.
    fn write_report(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.metric_id.to_le_bytes());
        out.push(self.kind as u8);
        match &self.data {
            MetricData::Count(n) => out.extend_from_slice(&n.to_le_bytes()),
            MetricData::Duration { total_ns } => out.extend_from_slice(&total_ns.to_le_bytes()),
            MetricData::Value { last, sum, count } => {
                out.extend_from_slice(&last.to_le_bytes());
                out.extend_from_slice(&sum.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
            }
        }
    }
}

/// Metric storage for one configuration
#[derive(Debug, Clone)]
pub struct MetricsManager {
    /// Owning configuration
    key: ConfigKey,
    /// Producers in definition order
    producers: Vec<MetricProducer>,
    /// Elapsed timestamp of the last guardrail-forced drop (0 = never)
    last_drop_ns: ElapsedNs,
}

impl MetricsManager {
    /// Build empty producers for every metric of a configuration
    pub fn from_definition(key: ConfigKey, metrics: &[MetricDefinition]) -> Self {
        Self {
            key,
            producers: metrics.iter().map(MetricProducer::from_definition).collect(),
            last_drop_ns: 0,
        }
    }

    /// Owning configuration key
    pub fn key(&self) -> ConfigKey {
        self.key
    }

    /// Iterate producers in definition order
    pub fn producers(&self) -> impl Iterator<Item = &MetricProducer> {
        self.producers.iter()
    }

    /// Feed one event's satisfied matcher set into the producers
    ///
    /// `is_metric_active` is the activation gate: producers whose metric is
    /// not collecting right now ignore the event entirely.
    pub fn accumulate_event(
        &mut self,
        matched_ids: &[MatcherId],
        event: &LogEvent,
        mut is_metric_active: impl FnMut(MetricId) -> bool,
    ) -> usize {
        let mut accumulated = 0;
        for producer in &mut self.producers {
            if matched_ids.contains(&producer.what_matcher) && is_metric_active(producer.metric_id)
            {
                producer.accumulate(event);
                accumulated += 1;
            }
        }
        accumulated
    }

    /// Elapsed timestamp of the last forced drop, 0 if none happened
    pub fn last_drop_ns(&self) -> ElapsedNs {
        self.last_drop_ns
    }

    /// Whether any producer holds data
    pub fn has_data(&self) -> bool {
        self.producers.iter().any(|p| p.data.has_data())
    }

    /// Encode a report of all producers holding data
    ///
    /// Internal little-endian record format: config owner (4), config id
    /// (8), dump timestamp (8), record count (4), then one record per
    /// producer. With `erase` set, accumulated data is cleared after
    /// encoding so the next dump starts empty.
    pub fn dump_report(&mut self, dump_ns: ElapsedNs, erase: bool) -> Vec<u8> {
        let with_data: Vec<&MetricProducer> =
            self.producers.iter().filter(|p| p.data.has_data()).collect();

        let mut out = Vec::with_capacity(24 + with_data.len() * 32);
        out.extend_from_slice(&self.key.owner.to_le_bytes());
        out.extend_from_slice(&self.key.id.to_le_bytes());
        out.extend_from_slice(&dump_ns.to_le_bytes());
        out.extend_from_slice(&(with_data.len() as u32).to_le_bytes());
        for producer in with_data {
            producer.write_report(&mut out);
        }

        if erase {
            for producer in &mut self.producers {
                producer.clear();
            }
        }
        out
    }
}

impl MetricStore for MetricsManager {
    fn byte_size(&self) -> usize {
        self.producers.iter().map(|p| p.byte_size()).sum()
    }

    fn drop_data(&mut self, drop_ns: ElapsedNs) {
        // The guardrail already warns with the measured size; this is detail
        log::debug!(
            "config {}: dropping metric data for {} producers",
            self.key,
            self.producers.len()
        );
        for producer in &mut self.producers {
            producer.clear();
        }
        self.last_drop_ns = drop_ns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn manager() -> MetricsManager {
        MetricsManager::from_definition(
            ConfigKey::new(1000, 1),
            &[
                MetricDefinition::new(1, 10, MetricKind::Count),
                MetricDefinition::new(2, 11, MetricKind::Value),
                MetricDefinition::new(3, 12, MetricKind::Duration),
            ],
        )
    }

    #[test]
    fn test_gated_accumulation() {
        let mut mgr = manager();
        let event = LogEvent::new(1, 100);

        // Gate closed: nothing accumulates
        assert_eq!(mgr.accumulate_event(&[10], &event, |_| false), 0);
        assert!(!mgr.has_data());

        // Gate open: only the matching producer accumulates
        assert_eq!(mgr.accumulate_event(&[10], &event, |_| true), 1);
        let counts: Vec<_> = mgr.producers().map(|p| p.data().clone()).collect();
        assert_eq!(counts[0], MetricData::Count(1));
        assert_eq!(counts[1], MetricData::Value { last: 0.0, sum: 0.0, count: 0 });
    }

    #[test]
    fn test_value_and_duration_accumulation() {
        let mut mgr = manager();
        mgr.accumulate_event(&[11], &LogEvent::with_value(2, 0, 1.5), |_| true);
        mgr.accumulate_event(&[11], &LogEvent::with_value(2, 1, 2.5), |_| true);
        mgr.accumulate_event(&[12], &LogEvent::with_value(3, 2, 500.0), |_| true);

        match mgr.producers().nth(1).unwrap().data() {
            MetricData::Value { last, sum, count } => {
                assert_relative_eq!(*last, 2.5);
                assert_relative_eq!(*sum, 4.0);
                assert_eq!(*count, 2);
            }
            other => panic!("unexpected data {:?}", other),
        }
        assert_eq!(
            mgr.producers().nth(2).unwrap().data(),
            &MetricData::Duration { total_ns: 500 }
        );
    }

    #[test]
    fn test_dump_with_erase_clears_data() {
        let mut mgr = manager();
        mgr.accumulate_event(&[10], &LogEvent::new(1, 0), |_| true);
        assert!(mgr.has_data());

        let report = mgr.dump_report(50, true);
        assert!(!report.is_empty());
        assert!(!mgr.has_data());

        // Immediate subsequent dump reports no records
        let empty = mgr.dump_report(60, true);
        let record_count = u32::from_le_bytes(empty[20..24].try_into().unwrap());
        assert_eq!(record_count, 0);
    }

    #[test]
    fn test_dump_without_erase_keeps_data() {
        let mut mgr = manager();
        mgr.accumulate_event(&[10], &LogEvent::new(1, 0), |_| true);

        let first = mgr.dump_report(50, false);
        assert!(mgr.has_data());
        let second = mgr.dump_report(50, false);
        assert_eq!(first, second);
    }

    #[test]
    fn test_drop_data_records_time() {
        let mut mgr = manager();
        mgr.accumulate_event(&[10], &LogEvent::new(1, 0), |_| true);

        mgr.drop_data(777);
        assert!(!mgr.has_data());
        assert_eq!(mgr.last_drop_ns(), 777);
        assert!(mgr.byte_size() > 0);
    }
}
