//! Fixed-length, time-ordered ring of counter snapshots.
//!
//! The ring always holds exactly `capacity` slots. Slots that have not been
//! filled yet are `None`, so warm-up state is visible in the type instead of
//! being a magic value.

use std::collections::VecDeque;

/// Samples taken per one-minute window (one every 10 seconds).
pub const DEFAULT_SAMPLES_PER_WINDOW: usize = 6;
/// Number of one-minute windows retained (covers the 15-minute average).
pub const DEFAULT_WINDOW_COUNT: usize = 15;
/// Fewest samples per window that still leave the short window a
/// comparison sample older than the newest one.
pub const MIN_SAMPLES_PER_WINDOW: usize = 2;

/// Lookback windows reported for every rate metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Short,
    Medium,
    Long,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Short, Window::Medium, Window::Long];

    /// Window length in minutes.
    pub fn minutes(self) -> usize {
        match self {
            Self::Short => 1,
            Self::Medium => 5,
            Self::Long => 15,
        }
    }

    /// Window length in seconds.
    pub fn seconds(self) -> u64 {
        self.minutes() as u64 * 60
    }

    /// Offset of this window's comparison sample, counted backward from the newest.
    pub fn offset(self, samples_per_window: usize) -> usize {
        (self.minutes() * samples_per_window).saturating_sub(1)
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.minutes())
    }
}

/// Circular history of snapshots for one metric domain.
#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    slots: VecDeque<Option<T>>,
    samples_per_window: usize,
}

impl<T> HistoryRing<T> {
    /// Create a ring of `window_count * samples_per_window` empty slots.
    ///
    /// `samples_per_window` is raised to [`MIN_SAMPLES_PER_WINDOW`].
    pub fn new(window_count: usize, samples_per_window: usize) -> Self {
        let samples_per_window = samples_per_window.max(MIN_SAMPLES_PER_WINDOW);
        let capacity = (window_count.max(1) * samples_per_window).max(1);
        let mut slots = VecDeque::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            samples_per_window,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn samples_per_window(&self) -> usize {
        self.samples_per_window
    }

    /// Evict the oldest slot and append `snapshot` as the newest.
    pub fn record(&mut self, snapshot: T) {
        self.slots.pop_front();
        self.slots.push_back(Some(snapshot));
    }

    /// Number of slots holding a real sample.
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Option<&T> {
        self.back(0)
    }

    /// Sample `offset` positions back from the newest (0 = newest).
    pub fn back(&self, offset: usize) -> Option<&T> {
        let len = self.slots.len();
        if offset >= len {
            return None;
        }
        self.slots[len - 1 - offset].as_ref()
    }

    /// Comparison samples for the short/medium/long windows.
    ///
    /// A missing medium sample falls back to the short one, and a missing
    /// long sample falls back to the (possibly substituted) medium one, so a
    /// freshly started ring reports its best short-term value everywhere.
    pub fn baselines(&self) -> [Option<&T>; 3] {
        let spw = self.samples_per_window;
        let short = self.back(Window::Short.offset(spw));
        let medium = self.back(Window::Medium.offset(spw)).or(short);
        let long = self.back(Window::Long.offset(spw)).or(medium);
        [short, medium, long]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_length_is_constant() {
        let mut ring = HistoryRing::new(15, 6);
        assert_eq!(ring.capacity(), 90);
        for i in 0..200 {
            ring.record(i);
            assert_eq!(ring.capacity(), 90);
        }
        assert_eq!(ring.filled(), 90);
        assert_eq!(ring.latest(), Some(&199));
        assert_eq!(ring.back(89), Some(&110));
        assert_eq!(ring.back(90), None);
    }

    #[test]
    fn window_offsets() {
        assert_eq!(Window::Short.offset(6), 5);
        assert_eq!(Window::Medium.offset(6), 29);
        assert_eq!(Window::Long.offset(6), 89);
    }

    #[test]
    fn cold_ring_has_no_baselines() {
        let mut ring = HistoryRing::new(15, 6);
        ring.record(1);
        assert_eq!(ring.baselines(), [None, None, None]);
    }

    #[test]
    fn warm_short_window_fills_medium_and_long() {
        let mut ring = HistoryRing::new(15, 6);
        for i in 0..6 {
            ring.record(i);
        }
        assert_eq!(ring.baselines(), [Some(&0), Some(&0), Some(&0)]);
    }

    #[test]
    fn long_falls_back_to_real_medium() {
        let mut ring = HistoryRing::new(15, 6);
        for i in 0..40 {
            ring.record(i);
        }
        // newest is 39: short = 34, medium = 10, long missing -> medium
        assert_eq!(ring.baselines(), [Some(&34), Some(&10), Some(&10)]);
    }

    #[test]
    fn one_sample_per_window_is_raised_to_two() {
        let mut ring = HistoryRing::new(15, 1);
        assert_eq!(ring.samples_per_window(), MIN_SAMPLES_PER_WINDOW);
        assert_eq!(ring.capacity(), 30);
        ring.record(0);
        ring.record(1);
        // short window compares against the previous sample, not the newest
        assert_eq!(ring.baselines(), [Some(&0), Some(&0), Some(&0)]);
    }
}
