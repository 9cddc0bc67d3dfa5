//! Connection frequency tracker
//!
//! Isolates the one piece of stateful logic in the rule set: counting
//! per-source connections inside a sliding 60-second window. State lives
//! only for the duration of a single batch evaluation.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Sliding window length. The window is half-open: a connection exactly
/// `WINDOW_SECONDS` after the window start falls outside it.
pub const WINDOW_SECONDS: i64 = 60;

/// A window counts as a burst when it holds more than this many connections.
pub const DEFAULT_BURST_THRESHOLD: usize = 10;

/// One qualifying window for a source IP.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Batch indexes of the member records, ordered by (timestamp, index).
    pub members: Vec<usize>,
}

/// Per-source connection timestamps for one batch.
///
/// The batch is not required to arrive time-sorted; each source's
/// observations are sorted before windowing, with timestamp ties broken by
/// original batch index so results are deterministic.
#[derive(Debug)]
pub struct FrequencyTracker {
    window: Duration,
    threshold: usize,
    observed: HashMap<String, Vec<(DateTime<Utc>, usize)>>,
}

impl FrequencyTracker {
    pub fn new(window_seconds: i64, threshold: usize) -> Self {
        Self {
            window: Duration::seconds(window_seconds),
            threshold,
            observed: HashMap::new(),
        }
    }

    /// Record one connection observation during the single batch pass.
    pub fn register(&mut self, source_ip: &str, timestamp: DateTime<Utc>, batch_index: usize) {
        self.observed
            .entry(source_ip.to_string())
            .or_default()
            .push((timestamp, batch_index));
    }

    /// Source IPs seen so far, in first-seen batch order.
    pub fn source_ips(&self) -> Vec<&str> {
        let mut ips: Vec<(&str, usize)> = self
            .observed
            .iter()
            .map(|(ip, obs)| (ip.as_str(), obs.iter().map(|(_, i)| *i).min().unwrap_or(0)))
            .collect();
        ips.sort_by_key(|(_, first)| *first);
        ips.into_iter().map(|(ip, _)| ip).collect()
    }

    /// All windows for `source_ip` holding more than `threshold` connections.
    ///
    /// A window starts at each observation; the end pointer advances while
    /// the observation is strictly inside `[start, start + window)`.
    pub fn burst_windows(&self, source_ip: &str) -> Vec<BurstWindow> {
        let Some(observations) = self.observed.get(source_ip) else {
            return Vec::new();
        };
        if observations.len() <= self.threshold {
            return Vec::new();
        }

        let mut sorted = observations.clone();
        sorted.sort_by_key(|&(ts, index)| (ts, index));

        let mut windows = Vec::new();
        let mut end = 0usize;

        for start in 0..sorted.len() {
            let window_end = sorted[start].0 + self.window;
            if end < start {
                end = start;
            }
            while end < sorted.len() && sorted[end].0 < window_end {
                end += 1;
            }
            // end is exclusive, so the member count is end - start
            if end - start > self.threshold {
                windows.push(BurstWindow {
                    start: sorted[start].0,
                    end: window_end,
                    members: sorted[start..end].iter().map(|&(_, i)| i).collect(),
                });
            }
        }

        windows
    }
}

impl Default for FrequencyTracker {
    fn default() -> Self {
        Self::new(WINDOW_SECONDS, DEFAULT_BURST_THRESHOLD)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    #[test]
    fn eleven_connections_in_ten_seconds_is_a_burst() {
        let mut tracker = FrequencyTracker::default();
        for i in 0..11 {
            tracker.register("10.0.0.5", ts(i as i64), i);
        }

        let windows = tracker.burst_windows("10.0.0.5");
        assert!(!windows.is_empty());
        assert_eq!(windows[0].members.len(), 11);
        assert_eq!(windows[0].start, ts(0));
        assert_eq!(windows[0].end, ts(60));
    }

    #[test]
    fn slow_drip_is_not_a_burst() {
        let mut tracker = FrequencyTracker::default();
        // One connection every ten minutes.
        for i in 0..11 {
            tracker.register("10.0.0.5", ts(i as i64 * 600), i);
        }

        assert!(tracker.burst_windows("10.0.0.5").is_empty());
    }

    #[test]
    fn window_is_half_open_at_sixty_seconds() {
        let mut tracker = FrequencyTracker::default();
        // Ten connections at the window start, one exactly 60 s later.
        for i in 0..10 {
            tracker.register("10.0.0.5", ts(0), i);
        }
        tracker.register("10.0.0.5", ts(60), 10);

        // The 60 s record is excluded, so the first window holds only ten.
        assert!(tracker.burst_windows("10.0.0.5").is_empty());

        // One second earlier and it is included.
        let mut tracker = FrequencyTracker::default();
        for i in 0..10 {
            tracker.register("10.0.0.5", ts(0), i);
        }
        tracker.register("10.0.0.5", ts(59), 10);
        assert_eq!(tracker.burst_windows("10.0.0.5").len(), 1);
    }

    #[test]
    fn unsorted_input_is_sorted_per_source() {
        let mut tracker = FrequencyTracker::default();
        for i in (0..11).rev() {
            tracker.register("10.0.0.5", ts(i as i64), 10 - i as usize);
        }

        let windows = tracker.burst_windows("10.0.0.5");
        assert!(!windows.is_empty());
        // Members come back ordered by timestamp despite reversed input.
        assert_eq!(windows[0].members.len(), 11);
    }

    #[test]
    fn timestamp_ties_break_by_batch_index() {
        let mut tracker = FrequencyTracker::default();
        for i in 0..12 {
            tracker.register("10.0.0.5", ts(0), i);
        }

        let windows = tracker.burst_windows("10.0.0.5");
        let members = &windows[0].members;
        let mut sorted = members.clone();
        sorted.sort_unstable();
        assert_eq!(*members, sorted);
    }

    #[test]
    fn sources_are_tracked_independently() {
        let mut tracker = FrequencyTracker::default();
        for i in 0..11 {
            tracker.register("10.0.0.5", ts(i as i64), i * 2);
            tracker.register("10.0.0.6", ts(i as i64 * 600), i * 2 + 1);
        }

        assert!(!tracker.burst_windows("10.0.0.5").is_empty());
        assert!(tracker.burst_windows("10.0.0.6").is_empty());
        assert_eq!(tracker.source_ips(), vec!["10.0.0.5", "10.0.0.6"]);
    }
}
