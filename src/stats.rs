//! Pipeline health counters
//!
//! Internal bookkeeping about the pipeline itself: how many events flowed
//! through, how often guardrails fired, how broadcasts fared, what the
//! snapshot paths did. Read-only from the host's perspective.

/// Counters describing pipeline behavior since startup (or `reset`)
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Events fed into `on_log_event`
    pub events_processed: u64,
    /// Events that satisfied at least one matcher
    pub events_matched: u64,
    /// Producer accumulations performed
    pub accumulations: u64,
    /// Guardrail byte-size samples taken
    pub size_checks: u64,
    /// Guardrail-forced data drops
    pub data_drops: u64,
    /// Report-fetch broadcasts delivered
    pub broadcasts_sent: u64,
    /// Report-fetch broadcasts the callback rejected
    pub broadcasts_failed: u64,
    /// Active-configs broadcasts delivered
    pub activation_broadcasts_sent: u64,
    /// Active-configs broadcasts the callback rejected
    pub activation_broadcasts_failed: u64,
    /// Dump reports served
    pub dumps_served: u64,
    /// Dump requests for unknown configurations
    pub dumps_unknown_config: u64,
    /// Activation records written at the last save
    pub records_saved: u64,
    /// Activation records restored at the last load
    pub records_restored: u64,
    /// Persisted records ignored at the last load (no matching trigger)
    pub records_ignored: u64,
}

impl PipelineStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report-fetch broadcast outcome
    pub fn record_broadcast(&mut self, delivered: bool) {
        if delivered {
            self.broadcasts_sent += 1;
        } else {
            self.broadcasts_failed += 1;
        }
    }

    /// Record an active-configs broadcast outcome
    pub fn record_activation_broadcast(&mut self, delivered: bool) {
        if delivered {
            self.activation_broadcasts_sent += 1;
        } else {
            self.activation_broadcasts_failed += 1;
        }
    }

    /// Fraction of events that satisfied at least one matcher (0.0 - 1.0)
    pub fn match_rate(&self) -> f64 {
        if self.events_processed == 0 {
            return 0.0;
        }
        self.events_matched as f64 / self.events_processed as f64
    }

    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Pipeline Stats ===\n\n");
        report.push_str(&format!("Events processed: {}\n", self.events_processed));
        report.push_str(&format!(
            "Events matched: {} ({:.1}%)\n",
            self.events_matched,
            self.match_rate() * 100.0
        ));
        report.push_str(&format!("Accumulations: {}\n\n", self.accumulations));

        report.push_str(&format!("Size checks: {}\n", self.size_checks));
        report.push_str(&format!("Data drops: {}\n", self.data_drops));
        report.push_str(&format!(
            "Report broadcasts: {} sent, {} failed\n",
            self.broadcasts_sent, self.broadcasts_failed
        ));
        report.push_str(&format!(
            "Activation broadcasts: {} sent, {} failed\n",
            self.activation_broadcasts_sent, self.activation_broadcasts_failed
        ));
        report.push_str(&format!(
            "Dumps served: {} ({} for unknown configs)\n\n",
            self.dumps_served, self.dumps_unknown_config
        ));

        report.push_str(&format!(
            "Snapshot records: {} saved, {} restored, {} ignored\n",
            self.records_saved, self.records_restored, self.records_ignored
        ));

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_counters() {
        let mut stats = PipelineStats::new();
        stats.record_broadcast(true);
        stats.record_broadcast(true);
        stats.record_broadcast(false);
        stats.record_activation_broadcast(false);

        assert_eq!(stats.broadcasts_sent, 2);
        assert_eq!(stats.broadcasts_failed, 1);
        assert_eq!(stats.activation_broadcasts_failed, 1);
    }

    #[test]
    fn test_match_rate() {
        let mut stats = PipelineStats::new();
        assert_eq!(stats.match_rate(), 0.0);

        stats.events_processed = 4;
        stats.events_matched = 3;
        assert!((stats.match_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_report_and_reset() {
        let mut stats = PipelineStats::new();
        stats.events_processed = 10;
        stats.data_drops = 2;

        let report = stats.report();
        assert!(report.contains("Events processed: 10"));
        assert!(report.contains("Data drops: 2"));

        stats.reset();
        assert_eq!(stats.events_processed, 0);
        assert_eq!(stats.data_drops, 0);
    }
}
