//! Log events and the matcher-evaluation seam
//!
//! metpipe does not evaluate matchers itself. The host supplies a
//! [`MatcherEvaluator`] that turns each event into the set of matcher ids it
//! satisfies; the pipeline only consumes those boolean signals.

use crate::config::{ElapsedNs, MatcherId};
use std::collections::HashMap;

/// A typed log event entering the pipeline
///
/// `value` carries the payload a Duration or Value metric aggregates; Count
/// metrics ignore it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEvent {
    /// Monotonic elapsed timestamp of the event
    pub elapsed_ns: ElapsedNs,
    /// Event tag identifying the event type
    pub tag: u32,
    /// Event payload value
    pub value: f64,
}

impl LogEvent {
    /// Create an event with no payload value
    pub fn new(tag: u32, elapsed_ns: ElapsedNs) -> Self {
        Self {
            elapsed_ns,
            tag,
            value: 0.0,
        }
    }

    /// Create an event carrying a payload value
    pub fn with_value(tag: u32, elapsed_ns: ElapsedNs, value: f64) -> Self {
        Self {
            elapsed_ns,
            tag,
            value,
        }
    }
}

/// External matching engine seam
///
/// Given an event, returns every matcher id the event satisfies. The
/// returned set drives both metric aggregation (`what` matchers) and
/// activation triggers.
pub trait MatcherEvaluator {
    /// Matcher ids satisfied by `event`
    fn matched_ids(&self, event: &LogEvent) -> Vec<MatcherId>;
}

/// Simple tag-equality matcher set
///
/// Maps matcher ids to the single event tag each one accepts. Enough for
/// hosts whose matchers are plain tag filters, and for tests; richer
/// matching engines implement [`MatcherEvaluator`] themselves.
#[derive(Debug, Clone, Default)]
pub struct TagMatcherSet {
    matchers: HashMap<MatcherId, u32>,
}

impl TagMatcherSet {
    /// Create an empty matcher set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a matcher that fires on events with `tag`
    pub fn insert(&mut self, matcher_id: MatcherId, tag: u32) {
        self.matchers.insert(matcher_id, tag);
    }

    /// Builder-style registration
    pub fn with_matcher(mut self, matcher_id: MatcherId, tag: u32) -> Self {
        self.insert(matcher_id, tag);
        self
    }

    /// Number of registered matchers
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// Whether no matchers are registered
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl MatcherEvaluator for TagMatcherSet {
    fn matched_ids(&self, event: &LogEvent) -> Vec<MatcherId> {
        let mut ids: Vec<MatcherId> = self
            .matchers
            .iter()
            .filter(|(_, &tag)| tag == event.tag)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_matcher_set() {
        let matchers = TagMatcherSet::new()
            .with_matcher(100, 1)
            .with_matcher(101, 1)
            .with_matcher(102, 2);

        assert_eq!(matchers.len(), 3);
        assert_eq!(matchers.matched_ids(&LogEvent::new(1, 0)), vec![100, 101]);
        assert_eq!(matchers.matched_ids(&LogEvent::new(2, 0)), vec![102]);
        assert!(matchers.matched_ids(&LogEvent::new(3, 0)).is_empty());
    }

    #[test]
    fn test_empty_matcher_set() {
        let matchers = TagMatcherSet::new();
        assert!(matchers.is_empty());
        assert!(matchers.matched_ids(&LogEvent::new(1, 0)).is_empty());
    }
}
