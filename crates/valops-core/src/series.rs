//! Sparse timestamp → cumulative counter series with bounded size.
//!
//! Used for transaction and block counters, where the rate over a window is
//! read from the latest entry and the entry nearest to `latest - window`.

use std::collections::BTreeMap;

use crate::averager::round2;

/// Size at which the series is pruned.
pub const HIGH_WATER: usize = 120;
/// Entries dropped below the high-water mark when pruning.
pub const SLACK: usize = 20;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    entries: BTreeMap<u64, u64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `value` at `timestamp`, replacing any entry from the same second.
    pub fn record(&mut self, timestamp: u64, value: u64) {
        self.entries.insert(timestamp, value);
        self.prune_if_oversized();
    }

    /// Keep only the `HIGH_WATER - SLACK` most recent entries once the
    /// series reaches `HIGH_WATER`.
    pub fn prune_if_oversized(&mut self) {
        if self.entries.len() < HIGH_WATER {
            return;
        }
        let keep = HIGH_WATER - SLACK;
        let drop = self.entries.len() - keep;
        if let Some(&cutoff) = self.entries.keys().nth(drop) {
            self.entries = self.entries.split_off(&cutoff);
        }
    }

    pub fn latest(&self) -> Option<(u64, u64)> {
        self.entries.last_key_value().map(|(&k, &v)| (k, v))
    }

    /// Entry whose timestamp is closest to `target`, never the latest one.
    ///
    /// An exact match wins; otherwise the smallest absolute distance, with the
    /// smaller timestamp winning a tie.
    fn nearest_before_latest(&self, target: u64) -> Option<u64> {
        let (latest, _) = self.latest()?;
        let candidates = self.entries.range(..latest);
        if let Some(&v) = self.entries.get(&target).filter(|_| target != latest) {
            return Some(v);
        }
        candidates
            .min_by_key(|&(&ts, _)| ts.abs_diff(target))
            .map(|(_, &v)| v)
    }

    /// Average increase per second over `window_secs`, rounded to 2 decimals.
    pub fn rate_over(&self, window_secs: u64) -> Option<f64> {
        if window_secs == 0 {
            return None;
        }
        let (latest_ts, latest) = self.latest()?;
        let prev = self.nearest_before_latest(latest_ts.saturating_sub(window_secs))?;
        let diff = latest as f64 - prev as f64;
        Some(round2(diff / window_secs as f64))
    }

    /// Average seconds per increment, treating the series as a block counter.
    pub fn block_time_avg(&self, window_secs: u64) -> Option<f64> {
        let bps = self.rate_over(window_secs)?;
        (bps != 0.0).then(|| round2(1.0 / bps))
    }
}
