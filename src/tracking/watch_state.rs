use tokio::time::Instant;
use tracing::trace;

use super::eligibility::{Eligibility, EligibilityEvaluator};
use super::interval_tracker::{IntervalTracker, WatchedSet};
use super::time_spent::TimeSpentAccumulator;
use crate::config::TrackingConfig;
use crate::models::{LessonContext, ProgressRecord, ProgressStatus};

/// Everything known about one lesson-viewing session. Replaced wholesale when
/// the active content changes.
#[derive(Debug, Clone)]
pub struct WatchState {
    duration: Option<f64>,
    tracker: IntervalTracker,
    last_position: f64,
    time: TimeSpentAccumulator,
    last_saved_percent: u8,
    eligibility: EligibilityEvaluator,
    coverage_percent: u8,
    can_complete: bool,
    playing: bool,
    /// When `last_position` was last confirmed by continuous playback.
    last_tick: Option<Instant>,
    tick_tolerance: f64,
}

impl WatchState {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            duration: None,
            tracker: IntervalTracker::new(),
            last_position: 0.0,
            time: TimeSpentAccumulator::new(),
            last_saved_percent: 0,
            eligibility: EligibilityEvaluator::new(config),
            coverage_percent: 0,
            can_complete: false,
            playing: false,
            last_tick: None,
            tick_tolerance: config.tick_tolerance_seconds,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn last_position(&self) -> f64 {
        self.last_position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn coverage_percent(&self) -> u8 {
        self.coverage_percent
    }

    pub fn can_complete(&self) -> bool {
        self.can_complete
    }

    pub fn last_saved_percent(&self) -> u8 {
        self.last_saved_percent
    }

    pub fn watched(&self) -> &WatchedSet {
        self.tracker.watched()
    }

    pub fn playback_rate(&self) -> f64 {
        self.time.playback_rate()
    }

    pub fn time_spent_seconds(&self) -> u64 {
        self.time.accumulated_seconds()
    }

    pub fn seed_time_spent(&mut self, seconds: u64) {
        self.time.seed_seconds(seconds);
    }

    /// Watched seconds, including the span currently playing.
    pub fn covered_seconds(&self) -> f64 {
        self.duration
            .map(|duration| self.tracker.coverage(duration))
            .unwrap_or(0.0)
    }

    /// Playhead position as a rounded percentage. Display only; persistence
    /// and throttling use the floored coverage percent.
    pub fn position_percent(&self) -> u8 {
        match self.duration {
            Some(duration) => (100.0 * self.last_position / duration).round().clamp(0.0, 100.0) as u8,
            None => 0,
        }
    }

    pub fn status(&self) -> ProgressStatus {
        if self.can_complete {
            ProgressStatus::Completed
        } else {
            ProgressStatus::InProgress
        }
    }

    /// Records a duration reported by the player. Returns true the first time
    /// a duration becomes known.
    pub fn observe_duration(&mut self, duration: f64) -> bool {
        if !duration.is_finite() || duration <= 0.0 {
            return false;
        }
        let first = self.duration.is_none();
        if self.duration != Some(duration) {
            trace!("Duration now {}s", duration);
            self.duration = Some(duration);
        }
        first
    }

    pub fn on_play(&mut self, now: Instant) {
        self.playing = true;
        self.last_tick = Some(now);
        self.tracker.open_interval(self.last_position);
        self.time.start(now);
    }

    pub fn on_pause(&mut self, now: Instant) {
        self.tracker.close_interval(self.last_position);
        self.time.finalize(now);
        self.playing = false;
        self.last_tick = None;
    }

    /// Furthest the playhead can have travelled since the last confirmed tick
    /// at the current rate.
    fn playable_distance(&self, now: Instant) -> f64 {
        let elapsed = self
            .last_tick
            .map(|at| now.saturating_duration_since(at).as_secs_f64())
            .unwrap_or(0.0);
        elapsed * self.time.playback_rate() + self.tick_tolerance
    }

    pub fn on_time_update(&mut self, seconds: f64, now: Instant) {
        if !seconds.is_finite() {
            return;
        }
        if self.playing {
            let delta = seconds - self.last_position;
            if (-self.tick_tolerance..=self.playable_distance(now)).contains(&delta) {
                self.tracker.open_interval(self.last_position);
                self.tracker.extend_interval(seconds);
            } else {
                // Browsers report the seek target in a tick before `seeked`
                // arrives, and some seeks are never announced at all.
                trace!(
                    "Playhead moved {} -> {} faster than playback, treating as seek",
                    self.last_position, seconds
                );
                self.tracker.close_interval(self.last_position);
                self.tracker.open_interval(seconds);
            }
            self.time.tick(now);
            self.last_tick = Some(now);
        }
        self.last_position = seconds;
    }

    /// Closes the running span at the pre-seek position so the skipped region
    /// is never credited.
    pub fn on_seeked(&mut self, seconds: f64, now: Instant) {
        if !seconds.is_finite() {
            return;
        }
        self.tracker.close_interval(self.last_position);
        self.time.tick(now);
        self.last_position = seconds;
        if self.playing {
            self.tracker.open_interval(seconds);
            self.last_tick = Some(now);
        } else {
            self.last_tick = None;
        }
    }

    /// The span only runs to the end when the last tick was close enough to
    /// have played there.
    pub fn on_ended(&mut self, now: Instant) {
        let end = self.duration.unwrap_or(self.last_position).max(self.last_position);
        let credited = if self.playing && end - self.last_position <= self.playable_distance(now) {
            end
        } else {
            self.last_position
        };
        self.tracker.close_interval(credited);
        self.time.finalize(now);
        self.last_position = end;
        self.playing = false;
        self.last_tick = None;
    }

    pub fn on_rate_change(&mut self, rate: f64, now: Instant) {
        self.time.set_playback_rate(rate, now);
    }

    pub fn on_playback_error(&mut self, now: Instant) {
        self.tracker.close_interval(self.last_position);
        self.time.finalize(now);
        self.playing = false;
        self.last_tick = None;
    }

    /// Brings the watched set and time total up to date without stopping
    /// playback: the open span is closed and reopened at the same position.
    pub fn checkpoint(&mut self, now: Instant) {
        self.tracker.close_interval(self.last_position);
        self.time.finalize(now);
        if self.playing {
            self.tracker.open_interval(self.last_position);
            self.time.start(now);
        }
    }

    pub fn evaluate(&mut self) -> Eligibility {
        let covered = self.covered_seconds();
        let duration = self.duration.unwrap_or(0.0);
        let result = self.eligibility.evaluate(covered, duration);
        self.coverage_percent = result.coverage_percent;
        self.can_complete = result.can_complete;
        result
    }

    /// Moves the save watermark if the coverage percent strictly increased.
    pub fn advance_saved_percent(&mut self) -> bool {
        if self.coverage_percent > self.last_saved_percent {
            self.last_saved_percent = self.coverage_percent;
            true
        } else {
            false
        }
    }

    /// Full snapshot for persistence. `None` until the duration is known.
    pub fn record(&self, context: &LessonContext) -> Option<ProgressRecord> {
        let duration = self.duration?;
        Some(ProgressRecord {
            enrollment_id: context.enrollment_id.clone(),
            lesson_id: context.lesson_id.clone(),
            progress_percentage: self.coverage_percent,
            last_position: self.last_position,
            duration_seconds: duration,
            time_spent: self.time_spent_seconds(),
            status: self.status(),
        })
    }
}
