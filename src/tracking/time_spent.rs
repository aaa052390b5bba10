use tokio::time::Instant;

/// Wall-clock time on task, scaled by playback rate.
#[derive(Debug, Clone)]
pub struct TimeSpentAccumulator {
    accumulated_ms: f64,
    last_tick: Option<Instant>,
    playback_rate: f64,
}

impl Default for TimeSpentAccumulator {
    fn default() -> Self {
        Self {
            accumulated_ms: 0.0,
            last_tick: None,
            playback_rate: 1.0,
        }
    }
}

impl TimeSpentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds time carried over from earlier sessions of the same lesson.
    pub fn seed_seconds(&mut self, seconds: u64) {
        self.accumulated_ms += seconds as f64 * 1000.0;
    }

    pub fn is_running(&self) -> bool {
        self.last_tick.is_some()
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn start(&mut self, now: Instant) {
        if self.last_tick.is_none() {
            self.last_tick = Some(now);
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(last) = self.last_tick {
            let elapsed = now.saturating_duration_since(last);
            self.accumulated_ms += elapsed.as_secs_f64() * 1000.0 * self.playback_rate;
            self.last_tick = Some(now);
        }
    }

    /// Credits the pending delta and stops the clock.
    pub fn finalize(&mut self, now: Instant) {
        self.tick(now);
        self.last_tick = None;
    }

    /// The pending delta is credited at the old rate; the new rate only
    /// applies from `now` on.
    pub fn set_playback_rate(&mut self, rate: f64, now: Instant) {
        if !rate.is_finite() || rate <= 0.0 {
            return;
        }
        self.tick(now);
        self.playback_rate = rate;
    }

    pub fn accumulated_ms(&self) -> f64 {
        self.accumulated_ms
    }

    pub fn accumulated_seconds(&self) -> u64 {
        (self.accumulated_ms / 1000.0).floor() as u64
    }
}
