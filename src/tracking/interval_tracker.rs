//! Watched-interval bookkeeping.
//!
//! Credit is only given for footage the playhead actually traversed: a span is
//! opened when playback starts, stretched by every tick, and folded into the
//! canonical [`WatchedSet`] when playback stops or the learner seeks.

/// Half-open span `[start, end)` of video seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    /// Returns `None` unless `start < end` and both are finite.
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if start.is_finite() && end.is_finite() && start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Sorted, non-overlapping, non-touching intervals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchedSet {
    intervals: Vec<Interval>,
}

impl WatchedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn insert(&mut self, interval: Interval) {
        let mut all = std::mem::take(&mut self.intervals);
        all.push(interval);
        *self = merge_intervals(all);
    }

    /// Total watched seconds, never more than `duration`.
    pub fn coverage(&self, duration: f64) -> f64 {
        coverage(self, duration)
    }
}

impl FromIterator<Interval> for WatchedSet {
    fn from_iter<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        merge_intervals(iter)
    }
}

/// Sort by start and sweep, merging anything that overlaps or touches the
/// running interval. Idempotent and independent of input order.
pub fn merge_intervals(intervals: impl IntoIterator<Item = Interval>) -> WatchedSet {
    let mut sorted: Vec<Interval> = intervals.into_iter().collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(current) if interval.start <= current.end => {
                current.end = current.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }

    WatchedSet { intervals: merged }
}

pub fn coverage(set: &WatchedSet, duration: f64) -> f64 {
    if duration.is_nan() || duration <= 0.0 {
        return 0.0;
    }
    let total: f64 = set.intervals.iter().map(Interval::length).sum();
    total.min(duration)
}

/// Maintains the watched set plus the interval currently being played.
#[derive(Debug, Clone, Default)]
pub struct IntervalTracker {
    watched: WatchedSet,
    open: Option<OpenInterval>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenInterval {
    start: f64,
    end: f64,
}

impl IntervalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_start(&self) -> Option<f64> {
        self.open.map(|open| open.start)
    }

    pub fn watched(&self) -> &WatchedSet {
        &self.watched
    }

    /// No-op while an interval is already open.
    pub fn open_interval(&mut self, at: f64) {
        if self.open.is_some() || !at.is_finite() {
            return;
        }
        self.open = Some(OpenInterval { start: at, end: at });
    }

    /// Moves the open end forward to `at`. Never moves it backwards, so
    /// duplicate or out-of-order ticks cannot shrink credit.
    pub fn extend_interval(&mut self, at: f64) {
        if let Some(open) = self.open.as_mut()
            && at.is_finite()
            && at > open.end
        {
            open.end = at;
        }
    }

    /// Closes the open interval at `at` and folds it into the watched set.
    /// Returns the interval that was credited, if any.
    pub fn close_interval(&mut self, at: f64) -> Option<Interval> {
        let open = self.open.take()?;
        let end = if at.is_finite() { open.end.max(at) } else { open.end };
        let interval = Interval::new(open.start, end)?;
        self.watched.insert(interval);
        Some(interval)
    }

    /// Coverage including the interval still being played.
    pub fn coverage(&self, duration: f64) -> f64 {
        match self.open.and_then(|open| Interval::new(open.start, open.end)) {
            Some(live) => {
                let snapshot: WatchedSet = self
                    .watched
                    .intervals()
                    .iter()
                    .copied()
                    .chain(std::iter::once(live))
                    .collect();
                snapshot.coverage(duration)
            }
            None => self.watched.coverage(duration),
        }
    }
}
