use crate::config::TrackingConfig;

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub coverage_percent: u8,
    pub can_complete: bool,
    /// `can_complete` differs from the previously notified value
    pub changed: bool,
}

/// Turns watched coverage into a floored percentage and the manual-completion
/// gate. The only state kept is the last notified gate value, for edge
/// detection.
#[derive(Debug, Clone)]
pub struct EligibilityEvaluator {
    threshold: f64,
    epsilon: f64,
    last_notified: bool,
}

impl Default for EligibilityEvaluator {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}

impl EligibilityEvaluator {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            threshold: config.completion_threshold,
            epsilon: config.coverage_epsilon_seconds,
            last_notified: false,
        }
    }

    /// Floor, so 89.6% never displays as 90%.
    pub fn coverage_percent(covered: f64, duration: f64) -> u8 {
        if duration.is_nan() || duration <= 0.0 || covered.is_nan() || covered <= 0.0 {
            return 0;
        }
        (100.0 * covered / duration).floor().clamp(0.0, 100.0) as u8
    }

    pub fn can_complete(&self, covered: f64, duration: f64) -> bool {
        if duration.is_nan() || duration <= 0.0 {
            return false;
        }
        covered >= self.threshold * duration - self.epsilon
    }

    pub fn evaluate(&mut self, covered: f64, duration: f64) -> Eligibility {
        let can_complete = self.can_complete(covered, duration);
        let changed = can_complete != self.last_notified;
        self.last_notified = can_complete;
        Eligibility {
            coverage_percent: Self::coverage_percent(covered, duration),
            can_complete,
            changed,
        }
    }

    pub fn last_notified(&self) -> bool {
        self.last_notified
    }
}
